//! Document annotation.
//!
//! Finds every element carrying a non-empty `class` attribute, records the
//! byte range of its value, and produces a renderable copy of the document
//! with a UID marker attribute on each of those elements. The source text is
//! never modified.

mod attrs;
mod scan;
mod structural;

use std::ops::Range;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::config::{AnnotateStrategy, EngineConfig};
use crate::types::{ElementDescriptor, MappingTable, Uid};

pub(crate) use structural::find_closing_tag;

/// Which strategy produced an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    Structural,
    TagScan,
}

/// Result of annotating a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Renderable copy with UID markers injected.
    pub html: String,
    pub table: MappingTable,
    pub strategy: Strategy,
}

/// A class attribute value located in some markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSpan {
    pub tag_name: SmolStr,
    /// Value range, excluding quotes.
    pub range: Range<usize>,
}

/// One opening tag as seen by either strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TagSite {
    pub tag_name: SmolStr,
    /// End of the tag body; the marker attribute is inserted here.
    pub insert_at: usize,
    pub class_value: Option<Range<usize>>,
    /// Full spans of marker attributes already present in the input.
    pub markers: Vec<Range<usize>>,
}

impl TagSite {
    fn from_attrs(
        source: &str,
        tag_name: SmolStr,
        insert_at: usize,
        attrs: &[attrs::AttrSpan],
        marker: &str,
    ) -> Self {
        // First class attribute wins, as in browsers.
        let class_value = attrs
            .iter()
            .find(|a| a.is_named(source, "class"))
            .and_then(|a| a.value.clone());
        let markers = attrs
            .iter()
            .filter(|a| a.is_named(source, marker))
            .map(|a| a.full.clone())
            .collect();
        Self {
            tag_name,
            insert_at,
            class_value,
            markers,
        }
    }
}

/// Assigns UIDs to class-bearing elements and records their value ranges.
#[derive(Debug, Clone)]
pub struct Annotator {
    marker: SmolStr,
    strategy: AnnotateStrategy,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl Annotator {
    pub fn new(marker: impl Into<SmolStr>, strategy: AnnotateStrategy) -> Self {
        Self {
            marker: marker.into(),
            strategy,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.marker_attribute.as_str(), config.strategy)
    }

    /// Name of the marker attribute carrying each element's UID.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn annotate(&self, source: &str) -> Annotation {
        let (sites, strategy) = self.sites(source);

        let mut table = MappingTable::new();
        let mut splices: Vec<(Range<usize>, String)> = Vec::new();
        let mut next_uid: Uid = 1;

        for site in sites {
            // Stale markers are always stripped, even on elements we don't map.
            splices.extend(site.markers.iter().map(|m| (m.clone(), String::new())));

            let Some(value) = site.class_value else {
                continue;
            };
            let text = &source[value.clone()];
            if text.trim().is_empty() {
                continue;
            }

            let uid = next_uid;
            next_uid += 1;
            table.insert(ElementDescriptor {
                uid,
                range_start: value.start,
                range_end: value.end,
                last_known_value: text.to_string(),
                tag_name: site.tag_name,
            });
            splices.push((
                site.insert_at..site.insert_at,
                format!(r#" {}="{}""#, self.marker, uid),
            ));
        }

        tracing::debug!(
            target: "classmap::annotate",
            ?strategy,
            elements = table.len(),
            "annotated document"
        );

        Annotation {
            html: splice(source, splices),
            table,
            strategy,
        }
    }

    /// Every non-empty class value in `source`, in document order.
    pub fn class_spans(&self, source: &str) -> Vec<ClassSpan> {
        let (sites, _) = self.sites(source);
        sites
            .into_iter()
            .filter_map(|site| {
                let range = site.class_value?;
                (!source[range.clone()].trim().is_empty()).then_some(ClassSpan {
                    tag_name: site.tag_name,
                    range,
                })
            })
            .collect()
    }

    fn sites(&self, source: &str) -> (Vec<TagSite>, Strategy) {
        match self.strategy {
            AnnotateStrategy::Auto => match structural::collect(source, &self.marker) {
                Ok(sites) => (sites, Strategy::Structural),
                Err(err) => {
                    tracing::debug!(
                        target: "classmap::annotate",
                        offset = err.offset(),
                        error = err.message(),
                        "structural parse failed, scanning tags instead"
                    );
                    (scan::collect(source, &self.marker), Strategy::TagScan)
                }
            },
            AnnotateStrategy::ScanOnly => (scan::collect(source, &self.marker), Strategy::TagScan),
        }
    }
}

/// Apply non-overlapping replacements to `source`.
fn splice(source: &str, mut splices: Vec<(Range<usize>, String)>) -> String {
    splices.sort_by_key(|(range, _)| (range.start, range.end));
    let mut out = String::with_capacity(source.len() + splices.len() * 24);
    let mut last = 0;
    for (range, replacement) in splices {
        if range.start < last {
            continue;
        }
        out.push_str(&source[last..range.start]);
        out.push_str(&replacement);
        last = range.end;
    }
    out.push_str(&source[last..]);
    out
}
