//! Class token sets.
//!
//! Tolerant passes compare class strings as sets of whitespace-separated
//! names, ignoring order and repeats.

use std::collections::BTreeSet;

use smol_str::SmolStr;

/// Order- and duplicate-insensitive set of class names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TokenSet(BTreeSet<SmolStr>);

impl TokenSet {
    pub fn parse(value: &str) -> Self {
        Self(value.split_whitespace().map(SmolStr::new).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SmolStr> {
        self.0.iter()
    }

    pub fn is_subset(&self, other: &TokenSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn is_superset(&self, other: &TokenSet) -> bool {
        self.0.is_superset(&other.0)
    }

    pub fn is_strict_subset_of(&self, other: &TokenSet) -> bool {
        self.0.len() < other.0.len() && self.0.is_subset(&other.0)
    }

    /// Tokens in `self` that are missing from `other`.
    pub fn difference(&self, other: &TokenSet) -> TokenSet {
        TokenSet(self.0.difference(&other.0).cloned().collect())
    }

    /// Sorted, space-joined form; equal sets have equal keys.
    pub fn canonical_key(&self) -> String {
        let mut key = String::new();
        for token in &self.0 {
            if !key.is_empty() {
                key.push(' ');
            }
            key.push_str(token);
        }
        key
    }
}

/// Drop every occurrence of `removed` from a class literal.
///
/// Remaining tokens keep their order and are joined by single spaces.
pub fn remove_tokens(literal: &str, removed: &TokenSet) -> String {
    literal
        .split_whitespace()
        .filter(|token| !removed.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// First token usable as a bare CSS class selector, if any.
pub fn css_safe_anchor(value: &str) -> Option<SmolStr> {
    value
        .split_whitespace()
        .find(|token| {
            let mut chars = token.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
        .map(SmolStr::new)
}
