//! Element node payload

use crate::NodeKey;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type-specific fields of a node (e.g. a link's `url`), kept as JSON values
/// so third-party node types need no core changes.
pub type Props = Map<String, Value>;

bitflags! {
    /// Capability predicates of an element type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ElementCapabilities: u32 {
        const CAN_BE_EMPTY = 1;
        const INLINE = 1 << 1;
        const TEXT_BEFORE = 1 << 2;
        const TEXT_AFTER = 1 << 3;
        const SHADOW_ROOT = 1 << 4;
        const CAN_INDENT = 1 << 5;
    }
}

impl ElementCapabilities {
    /// Block element defaults.
    pub const BLOCK: Self = Self::CAN_BE_EMPTY
        .union(Self::TEXT_BEFORE)
        .union(Self::TEXT_AFTER)
        .union(Self::CAN_INDENT);
}

impl Default for ElementCapabilities {
    fn default() -> Self {
        Self::BLOCK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ElementFormat {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "center")]
    Center,
    #[serde(rename = "right")]
    Right,
    #[serde(rename = "end")]
    End,
    #[serde(rename = "justify")]
    Justify,
}

impl ElementFormat {
    pub fn as_css(&self) -> Option<&'static str> {
        match self {
            ElementFormat::Unset => None,
            ElementFormat::Left => Some("left"),
            ElementFormat::Start => Some("start"),
            ElementFormat::Center => Some("center"),
            ElementFormat::Right => Some("right"),
            ElementFormat::End => Some("end"),
            ElementFormat::Justify => Some("justify"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ltr,
    Rtl,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementNode {
    pub children: Vec<NodeKey>,
    pub format: ElementFormat,
    pub indent: u32,
    /// `None` means "auto".
    pub direction: Option<Direction>,
    pub caps: ElementCapabilities,
    pub props: Props,
}

impl ElementNode {
    pub fn new(caps: ElementCapabilities) -> Self {
        Self {
            caps,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn can_be_empty(&self) -> bool {
        self.caps.contains(ElementCapabilities::CAN_BE_EMPTY)
    }

    pub fn is_inline(&self) -> bool {
        self.caps.contains(ElementCapabilities::INLINE)
    }

    pub fn can_insert_text_before(&self) -> bool {
        self.caps.contains(ElementCapabilities::TEXT_BEFORE)
    }

    pub fn can_insert_text_after(&self) -> bool {
        self.caps.contains(ElementCapabilities::TEXT_AFTER)
    }

    pub fn is_shadow_root(&self) -> bool {
        self.caps.contains(ElementCapabilities::SHADOW_ROOT)
    }

    pub fn can_indent(&self) -> bool {
        self.caps.contains(ElementCapabilities::CAN_INDENT)
    }

    pub fn index_of(&self, key: &NodeKey) -> Option<usize> {
        self.children.iter().position(|child| child == key)
    }
}

/// Leaf whose visible content is rendered by an external collaborator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecoratorNode {
    pub inline: bool,
    pub props: Props,
}
