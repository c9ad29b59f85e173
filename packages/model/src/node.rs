//! Document nodes
//!
//! A [`Node`] is one entry in a [`crate::NodeMap`]. Nodes refer to their
//! parent and children by [`NodeKey`]; the map is the only owner.

use crate::element::{DecoratorNode, ElementNode, Props};
use crate::text::TextNode;
use crate::NodeKey;
use std::sync::Arc;

/// Type tags of the built-in node types.
pub mod tags {
    pub const ROOT: &str = "root";
    pub const PARAGRAPH: &str = "paragraph";
    pub const TEXT: &str = "text";
    pub const LINE_BREAK: &str = "linebreak";
    pub const HEADING: &str = "heading";
    pub const QUOTE: &str = "quote";
    pub const LIST: &str = "list";
    pub const LIST_ITEM: &str = "listitem";
    pub const LINK: &str = "link";
    pub const TABLE: &str = "table";
    pub const TABLE_ROW: &str = "tablerow";
    pub const TABLE_CELL: &str = "tablecell";
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element(ElementNode),
    Text(TextNode),
    LineBreak,
    Decorator(DecoratorNode),
}

impl NodeKind {
    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub key: NodeKey,
    pub parent: Option<NodeKey>,
    pub node_type: Arc<str>,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(key: NodeKey, node_type: &str, kind: NodeKind) -> Self {
        Self {
            key,
            parent: None,
            node_type: Arc::from(node_type),
            kind,
        }
    }

    pub fn text(key: NodeKey, text: TextNode) -> Self {
        Self::new(key, tags::TEXT, NodeKind::Text(text))
    }

    pub fn line_break(key: NodeKey) -> Self {
        Self::new(key, tags::LINE_BREAK, NodeKind::LineBreak)
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn is_root(&self) -> bool {
        self.key.is_root()
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text(_))
    }

    pub fn is_line_break(&self) -> bool {
        matches!(self.kind, NodeKind::LineBreak)
    }

    pub fn is_decorator(&self) -> bool {
        matches!(self.kind, NodeKind::Decorator(_))
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_element()
    }

    /// Text, line breaks, inline elements and inline decorators flow inside a block.
    pub fn is_inline(&self) -> bool {
        match &self.kind {
            NodeKind::Element(element) => element.is_inline(),
            NodeKind::Text(_) | NodeKind::LineBreak => true,
            NodeKind::Decorator(decorator) => decorator.inline,
        }
    }

    /// An element that is not inline (paragraph, list item, table cell, ...).
    pub fn is_block(&self) -> bool {
        self.as_element().is_some_and(|element| !element.is_inline())
    }

    pub fn is_shadow_root(&self) -> bool {
        self.is_root() || self.as_element().is_some_and(ElementNode::is_shadow_root)
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match &self.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut ElementNode> {
        match &mut self.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match &self.kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextNode> {
        match &mut self.kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_decorator(&self) -> Option<&DecoratorNode> {
        match &self.kind {
            NodeKind::Decorator(decorator) => Some(decorator),
            _ => None,
        }
    }

    pub fn children(&self) -> &[NodeKey] {
        self.as_element()
            .map(|element| element.children.as_slice())
            .unwrap_or(&[])
    }

    /// Number of addressable offsets: characters for text, children for
    /// elements, zero for other leaves.
    pub fn size(&self) -> usize {
        match &self.kind {
            NodeKind::Element(element) => element.len(),
            NodeKind::Text(text) => text.len(),
            NodeKind::LineBreak | NodeKind::Decorator(_) => 0,
        }
    }

    pub fn props(&self) -> Option<&Props> {
        match &self.kind {
            NodeKind::Element(element) => Some(&element.props),
            NodeKind::Decorator(decorator) => Some(&decorator.props),
            _ => None,
        }
    }

    pub fn props_mut(&mut self) -> Option<&mut Props> {
        match &mut self.kind {
            NodeKind::Element(element) => Some(&mut element.props),
            NodeKind::Decorator(decorator) => Some(&mut decorator.props),
            _ => None,
        }
    }

    pub fn prop_str(&self, name: &str) -> Option<&str> {
        self.props()
            .and_then(|props| props.get(name))
            .and_then(|value| value.as_str())
    }

    /// Content contributed by this node alone (children excluded).
    pub fn own_text(&self) -> &str {
        match &self.kind {
            NodeKind::Text(text) => &text.text,
            NodeKind::LineBreak => "\n",
            _ => "",
        }
    }
}
