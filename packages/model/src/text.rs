//! Text node payload
//!
//! Offsets into a text node are counted in Unicode scalar values.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Inline formatting applied to a whole text node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextFormat: u32 {
        const BOLD = 1;
        const ITALIC = 1 << 1;
        const STRIKETHROUGH = 1 << 2;
        const UNDERLINE = 1 << 3;
        const CODE = 1 << 4;
        const SUBSCRIPT = 1 << 5;
        const SUPERSCRIPT = 1 << 6;
        const HIGHLIGHT = 1 << 7;
    }
}

impl TextFormat {
    /// Toggle `flag`; subscript and superscript exclude each other.
    pub fn toggled(self, flag: TextFormat) -> Self {
        let mut next = self ^ flag;
        if flag == Self::SUBSCRIPT && next.contains(Self::SUBSCRIPT) {
            next.remove(Self::SUPERSCRIPT);
        } else if flag == Self::SUPERSCRIPT && next.contains(Self::SUPERSCRIPT) {
            next.remove(Self::SUBSCRIPT);
        }
        next
    }
}

bitflags! {
    /// Behavioural detail flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextDetail: u32 {
        const DIRECTIONLESS = 1;
        const UNMERGEABLE = 1 << 1;
    }
}

/// How the editor treats the characters of a text node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextMode {
    /// Freely editable text.
    #[default]
    Normal,
    /// Atomic: never split, deleted as a whole.
    Token,
    /// Atomic, but deleting into it removes one segment at a time.
    Segmented,
    /// Not editable at all.
    Inert,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextNode {
    pub text: String,
    pub format: TextFormat,
    pub mode: TextMode,
    pub detail: TextDetail,
    pub style: String,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: TextFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_mode(mut self, mode: TextMode) -> Self {
        self.mode = mode;
        self
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_simple(&self) -> bool {
        self.mode == TextMode::Normal
    }

    pub fn is_token(&self) -> bool {
        self.mode == TextMode::Token
    }

    pub fn is_segmented(&self) -> bool {
        self.mode == TextMode::Segmented
    }

    pub fn is_inert(&self) -> bool {
        self.mode == TextMode::Inert
    }

    pub fn is_unmergeable(&self) -> bool {
        self.detail.contains(TextDetail::UNMERGEABLE)
    }

    pub fn is_directionless(&self) -> bool {
        self.detail.contains(TextDetail::DIRECTIONLESS)
    }

    /// Whether typing may extend this node in place.
    pub fn accepts_text(&self) -> bool {
        self.is_simple()
    }

    pub fn has_format(&self, flag: TextFormat) -> bool {
        self.format.contains(flag)
    }

    /// Two adjacent nodes may be merged into one without changing what the
    /// document looks like.
    pub fn can_merge_with(&self, other: &TextNode) -> bool {
        self.is_simple()
            && other.is_simple()
            && !self.is_unmergeable()
            && !other.is_unmergeable()
            && self.format == other.format
            && self.style == other.style
    }

    /// Characters in `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> String {
        self.text
            .chars()
            .skip(start)
            .take(end.saturating_sub(start))
            .collect()
    }

    /// Replace `delete_count` characters at `offset` with `insert`.
    pub fn splice(&mut self, offset: usize, delete_count: usize, insert: &str) {
        let start = byte_index(&self.text, offset);
        let end = byte_index(&self.text, offset + delete_count);
        self.text.replace_range(start..end, insert);
    }
}

/// Byte index of the `char_offset`th character, clamped to the string end.
pub fn byte_index(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}
