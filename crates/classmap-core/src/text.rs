//! Text buffer abstraction for tracked documents.
//!
//! The `TextBuffer` trait provides a common interface for document storage,
//! so the tracker can sit on a rope locally or on whatever buffer a host
//! already keeps for the open document.

use smol_str::{SmolStr, ToSmolStr};
use std::ops::Range;

/// A text buffer that supports byte-addressed slicing and replacement.
///
/// All offsets are UTF-8 byte offsets, matching the ranges recorded by the
/// annotator.
pub trait TextBuffer {
    /// Total length in bytes (UTF-8).
    fn len_bytes(&self) -> usize;

    /// Check if empty.
    fn is_empty(&self) -> bool {
        self.len_bytes() == 0
    }

    /// Get a byte slice as SmolStr.
    ///
    /// Returns None if the range is out of bounds or either end falls inside
    /// a multi-byte character.
    fn slice_bytes(&self, byte_range: Range<usize>) -> Option<SmolStr>;

    /// Replace a byte range with text.
    ///
    /// Callers must pass a range accepted by `slice_bytes`.
    fn replace_bytes(&mut self, byte_range: Range<usize>, text: &str);

    /// Replace the whole buffer.
    fn set_text(&mut self, text: &str) {
        let len = self.len_bytes();
        self.replace_bytes(0..len, text);
    }

    /// Convert entire buffer to String.
    fn to_string(&self) -> String;
}

/// Ropey-backed text buffer.
///
/// Provides O(log n) replacement.
#[derive(Clone, Default)]
pub struct EditorRope {
    rope: ropey::Rope,
}

impl EditorRope {
    /// Create from string.
    pub fn from_str(s: &str) -> Self {
        Self {
            rope: ropey::Rope::from_str(s),
        }
    }

    /// Char index for a byte offset, only if the offset sits on a char boundary.
    fn boundary_char(&self, byte_offset: usize) -> Option<usize> {
        let char_idx = self.rope.try_byte_to_char(byte_offset).ok()?;
        (self.rope.char_to_byte(char_idx) == byte_offset).then_some(char_idx)
    }
}

impl TextBuffer for EditorRope {
    fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }

    fn slice_bytes(&self, byte_range: Range<usize>) -> Option<SmolStr> {
        if byte_range.start > byte_range.end || byte_range.end > self.rope.len_bytes() {
            return None;
        }
        let start = self.boundary_char(byte_range.start)?;
        let end = self.boundary_char(byte_range.end)?;
        Some(self.rope.slice(start..end).to_smolstr())
    }

    fn replace_bytes(&mut self, byte_range: Range<usize>, text: &str) {
        let start = self.rope.byte_to_char(byte_range.start);
        let end = self.rope.byte_to_char(byte_range.end);
        self.rope.remove(start..end);
        self.rope.insert(start, text);
    }

    fn set_text(&mut self, text: &str) {
        self.rope = ropey::Rope::from_str(text);
    }

    fn to_string(&self) -> String {
        self.rope.to_string()
    }
}

impl From<&str> for EditorRope {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

impl From<String> for EditorRope {
    fn from(s: String) -> Self {
        Self::from_str(&s)
    }
}
