//! Value types shared across the annotator, tracker and resolver.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Identifier assigned to a class-bearing element, unique within one mapping table.
pub type Uid = u32;

/// The tracked byte range and snapshot value for one class-bearing element.
///
/// `range_start..range_end` addresses the class value in the source text,
/// excluding any surrounding quote characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub uid: Uid,
    pub range_start: usize,
    pub range_end: usize,
    /// Bytes expected at the range until the next successful edit.
    pub last_known_value: String,
    /// Lowercased tag name of the element, for host display.
    pub tag_name: SmolStr,
}

impl ElementDescriptor {
    pub fn range(&self) -> Range<usize> {
        self.range_start..self.range_end
    }

    pub fn len(&self) -> usize {
        self.range_end - self.range_start
    }

    pub fn is_empty(&self) -> bool {
        self.range_start == self.range_end
    }
}

/// The descriptors for one open document instance, keyed by UID.
///
/// UIDs are handed out in document order, so iteration order is also
/// `range_start` order, and the shift rule never reorders entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingTable {
    entries: BTreeMap<Uid, ElementDescriptor>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, descriptor: ElementDescriptor) {
        self.entries.insert(descriptor.uid, descriptor);
    }

    pub fn get(&self, uid: Uid) -> Option<&ElementDescriptor> {
        self.entries.get(&uid)
    }

    pub fn get_mut(&mut self, uid: Uid) -> Option<&mut ElementDescriptor> {
        self.entries.get_mut(&uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ElementDescriptor> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ElementDescriptor> {
        self.entries.values_mut()
    }

    pub fn uids(&self) -> impl Iterator<Item = Uid> + '_ {
        self.entries.keys().copied()
    }
}

impl FromIterator<ElementDescriptor> for MappingTable {
    fn from_iter<I: IntoIterator<Item = ElementDescriptor>>(iter: I) -> Self {
        let mut table = Self::new();
        for descriptor in iter {
            table.insert(descriptor);
        }
        table
    }
}

/// Context the preview gathers about an element it cannot map directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DynamicHint {
    /// Rendered text content of the edited element.
    pub nearby_text: Option<String>,
    pub tag_name: Option<SmolStr>,
    pub element_id: Option<String>,
}

impl DynamicHint {
    /// The anchor text for proximity search, if long enough to be meaningful.
    pub fn anchor(&self, min_len: usize) -> Option<&str> {
        let text = self.nearby_text.as_deref()?.trim();
        (text.chars().count() >= min_len).then_some(text)
    }
}

/// A single class edit coming from the preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EditRequest {
    /// The element carries a UID; write straight back to its range.
    #[serde(rename_all = "camelCase")]
    Direct { uid: Uid, new_value: String },
    /// The element was synthesized at render time; search for provenance.
    #[serde(rename_all = "camelCase")]
    Dynamic {
        before_value: String,
        after_value: String,
        #[serde(default)]
        hint: Option<DynamicHint>,
    },
}

/// Which resolver pass produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassKind {
    ExactLiteral,
    TolerantMarkup,
    TolerantLiteral,
    BaseConstant,
    Proximity,
}

impl PassKind {
    /// 1-based position in the cascade.
    pub fn number(self) -> u8 {
        match self {
            PassKind::ExactLiteral => 1,
            PassKind::TolerantMarkup => 3,
            PassKind::TolerantLiteral => 4,
            PassKind::BaseConstant => 5,
            PassKind::Proximity => 6,
        }
    }
}

/// How good a candidate is: earlier passes beat later ones, then higher scores win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchQuality {
    pub pass: PassKind,
    pub score: i64,
}

impl MatchQuality {
    pub fn new(pass: PassKind, score: i64) -> Self {
        Self { pass, score }
    }
}

impl PartialOrd for MatchQuality {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MatchQuality {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .pass
            .cmp(&self.pass)
            .then_with(|| self.score.cmp(&other.score))
    }
}

/// A located literal or attribute value that a pass intends to rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateMatch {
    pub file: PathBuf,
    /// Byte range of the value inside the file, excluding quotes.
    pub range: Range<usize>,
    pub quality: MatchQuality,
}
