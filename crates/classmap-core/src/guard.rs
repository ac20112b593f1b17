//! Optimistic-concurrency check for mapped edits.
//!
//! A descriptor's range is only trusted while the document still holds the
//! descriptor's last known value there. Anything else means the text moved
//! under us (manual typing, an external save) and the edit must be refused.

use crate::error::EditError;
use crate::text::TextBuffer;
use crate::types::ElementDescriptor;

/// Confirm `buffer` still holds `descriptor.last_known_value` at its range.
pub fn check<T: TextBuffer>(buffer: &T, descriptor: &ElementDescriptor) -> Result<(), EditError> {
    let current = buffer.slice_bytes(descriptor.range());
    if current.as_deref() == Some(descriptor.last_known_value.as_str()) {
        return Ok(());
    }

    tracing::warn!(
        target: "classmap::tracker",
        uid = descriptor.uid,
        range = ?descriptor.range(),
        expected = %descriptor.last_known_value,
        found = ?current,
        "source diverged from mapping"
    );
    Err(EditError::SourceDiverged {
        uid: descriptor.uid,
        range: descriptor.range(),
        expected: descriptor.last_known_value.clone(),
        found: current.map(|s| s.to_string()),
    })
}
