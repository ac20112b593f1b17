//! Attribute lexer for a single tag body.
//!
//! Works on byte offsets into the full document so spans can be recorded
//! directly. All delimiters are ASCII, so every span lands on a char boundary.

use std::ops::Range;

/// One attribute inside a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttrSpan {
    pub name: Range<usize>,
    /// Value without quotes. None for valueless attributes like `hidden`.
    pub value: Option<Range<usize>>,
    /// Leading whitespace through the closing quote; removing it drops the attribute cleanly.
    pub full: Range<usize>,
}

impl AttrSpan {
    pub fn is_named(&self, source: &str, name: &str) -> bool {
        source[self.name.clone()].eq_ignore_ascii_case(name)
    }
}

/// Lex the attributes in `source[region]`, the part of a tag body after its name.
///
/// Quoted values end at the next quote of the same kind, or at the end of the
/// region when that quote is missing. Unquoted values end at whitespace or `>`.
pub(crate) fn lex(source: &str, region: Range<usize>) -> Vec<AttrSpan> {
    let bytes = source.as_bytes();
    let end = region.end.min(bytes.len());
    let mut i = region.start;
    let mut attrs = Vec::new();

    while i < end {
        let lead = i;
        while i < end && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= end {
            break;
        }
        if bytes[i] == b'/' {
            i += 1;
            continue;
        }

        let name_start = i;
        while i < end
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'/' | b'>')
        {
            i += 1;
        }
        if i == name_start {
            // Stray '=' or '>' with no name in front of it.
            i += 1;
            continue;
        }
        let name = name_start..i;

        let mut j = i;
        while j < end && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        let mut value = None;
        if j < end && bytes[j] == b'=' {
            j += 1;
            while j < end && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j < end && matches!(bytes[j], b'"' | b'\'') {
                let quote = bytes[j];
                let value_start = j + 1;
                let value_end = bytes[value_start..end]
                    .iter()
                    .position(|&b| b == quote)
                    .map(|p| value_start + p)
                    .unwrap_or(end);
                value = Some(value_start..value_end);
                i = (value_end + 1).min(end);
            } else {
                let value_start = j;
                while j < end && !bytes[j].is_ascii_whitespace() && bytes[j] != b'>' {
                    j += 1;
                }
                value = Some(value_start..j);
                i = j;
            }
        }

        attrs.push(AttrSpan {
            name,
            value,
            full: lead..i,
        });
    }

    attrs
}
