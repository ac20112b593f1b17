//! Structural strategy: tag boundaries from quick-xml, attribute spans from the lexer.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use smol_str::SmolStr;

use super::TagSite;
use crate::error::MarkupError;

/// Elements whose content is raw text and must not be parsed as markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

pub(crate) fn collect(source: &str, marker: &str) -> Result<Vec<TagSite>, MarkupError> {
    let mut sites = Vec::new();
    let mut depth = 0usize;
    let mut max_depth = 0usize;
    // Raw-text elements are skipped by restarting the reader after their content.
    let mut base = 0usize;

    'restart: loop {
        let mut reader = Reader::from_str(&source[base..]);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        loop {
            let at = base + reader_offset(&reader);
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let site = site_from_start(source, at, &e, marker);
                    let name = site.tag_name.clone();
                    sites.push(site);
                    depth += 1;
                    max_depth = max_depth.max(depth);

                    if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                        let content_start = base + reader_offset(&reader);
                        base = find_closing_tag(source, content_start, &name).ok_or_else(|| {
                            MarkupError::new(format!("unterminated <{name}> element"), source, at)
                        })?;
                        continue 'restart;
                    }
                }
                Ok(Event::Empty(e)) => {
                    sites.push(site_from_start(source, at, &e, marker));
                }
                Ok(Event::End(_)) => depth = depth.saturating_sub(1),
                Ok(Event::Eof) => break 'restart,
                Ok(_) => {}
                Err(err) => {
                    let offset = usize::try_from(reader.error_position()).unwrap_or(0);
                    return Err(MarkupError::new(err.to_string(), source, base + offset));
                }
            }
        }
    }

    tracing::trace!(
        target: "classmap::annotate",
        tags = sites.len(),
        max_depth,
        unclosed = depth,
        "structural parse complete"
    );
    Ok(sites)
}

fn reader_offset(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

/// Build a site for the tag whose `<` sits at `at`.
///
/// The event's bytes are the tag body between `<` and `>` (or `/>`), so the
/// body ends exactly where the marker attribute gets inserted.
fn site_from_start(source: &str, at: usize, e: &BytesStart<'_>, marker: &str) -> TagSite {
    let raw_name = e.name();
    let name_len = raw_name.as_ref().len();
    let tag_name = SmolStr::new(String::from_utf8_lossy(raw_name.as_ref()).to_ascii_lowercase());

    let body_start = at + 1;
    let body_end = body_start + e.len();
    let attrs = super::attrs::lex(source, body_start + name_len..body_end);

    TagSite::from_attrs(source, tag_name, body_end, &attrs, marker)
}

/// Byte offset of the `</name` that closes a raw-text element, searching from `from`.
pub(crate) fn find_closing_tag(source: &str, from: usize, name: &str) -> Option<usize> {
    let rest = source.get(from..)?;
    rest.match_indices("</").find_map(|(idx, _)| {
        let after = &rest[idx + 2..];
        let candidate = after.get(..name.len())?;
        let terminated = after[name.len()..]
            .bytes()
            .next()
            .is_none_or(|b| b == b'>' || b.is_ascii_whitespace());
        (candidate.eq_ignore_ascii_case(name) && terminated).then_some(from + idx)
    })
}
