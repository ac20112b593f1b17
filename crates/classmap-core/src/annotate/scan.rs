//! Fallback strategy: a linear scan for opening tags.
//!
//! Used when the structural parse fails. Produces the same sites for
//! ordinary markup; pathological nesting (a `>` inside a quoted value) is
//! only approximated.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use smol_str::SmolStr;

use super::TagSite;
use super::structural::find_closing_tag;

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

fn tag_re() -> &'static Regex {
    static RE_TAG: OnceLock<Regex> = OnceLock::new();
    RE_TAG.get_or_init(|| {
        Regex::new(r"(?s)<!--.*?-->|<([A-Za-z][\w:-]*)([^>]*)>").expect("tag pattern is valid")
    })
}

fn class_re() -> &'static Regex {
    static RE_CLASS: OnceLock<Regex> = OnceLock::new();
    RE_CLASS.get_or_init(|| {
        Regex::new(r#"(?i)(?:^|\s)class\s*=\s*"#).expect("class pattern is valid")
    })
}

fn marker_re(marker: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)\s+{}\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]*)"#,
        regex::escape(marker)
    ))
    .expect("escaped marker pattern is valid")
}

pub(crate) fn collect(source: &str, marker: &str) -> Vec<TagSite> {
    let marker_re = marker_re(marker);
    let mut sites = Vec::new();
    let mut pos = 0;

    while let Some(caps) = tag_re().captures_at(source, pos) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(pos..pos + 1);
        pos = whole.end.max(pos + 1);
        let (Some(name), Some(attrs)) = (caps.get(1), caps.get(2)) else {
            // comment
            continue;
        };
        let tag_name = SmolStr::new(name.as_str().to_ascii_lowercase());
        let attrs = attrs.range();

        let class_value = class_value(source, attrs.clone());
        let markers = marker_re
            .find_iter(&source[attrs.clone()])
            .map(|m| attrs.start + m.start()..attrs.start + m.end())
            .collect();

        sites.push(TagSite {
            tag_name: tag_name.clone(),
            insert_at: insert_position(source, attrs),
            class_value,
            markers,
        });

        if RAW_TEXT_ELEMENTS.contains(&tag_name.as_str()) {
            match find_closing_tag(source, pos, &tag_name) {
                Some(close) => pos = close,
                None => break,
            }
        }
    }

    tracing::trace!(target: "classmap::annotate", tags = sites.len(), "tag scan complete");
    sites
}

/// Locate the class value inside a tag's attribute region.
fn class_value(source: &str, attrs: Range<usize>) -> Option<Range<usize>> {
    let region = &source[attrs.clone()];
    let m = class_re().find(region)?;
    let bytes = region.as_bytes();
    let mut start = m.end();
    match bytes.get(start) {
        Some(&quote) if quote == b'"' || quote == b'\'' => {
            start += 1;
            let end = bytes[start..]
                .iter()
                .position(|&b| b == quote)
                .map(|p| start + p)
                .unwrap_or(bytes.len());
            Some(attrs.start + start..attrs.start + end)
        }
        Some(_) => {
            let end = bytes[start..]
                .iter()
                .position(|b| b.is_ascii_whitespace())
                .map(|p| start + p)
                .unwrap_or(bytes.len());
            let end = if end == bytes.len() && region.ends_with('/') && end > start {
                end - 1
            } else {
                end
            };
            Some(attrs.start + start..attrs.start + end)
        }
        None => None,
    }
}

/// Insert before a self-closing slash, otherwise right before `>`.
fn insert_position(source: &str, attrs: Range<usize>) -> usize {
    if source[attrs.clone()].ends_with('/') {
        attrs.end - 1
    } else {
        attrs.end
    }
}
