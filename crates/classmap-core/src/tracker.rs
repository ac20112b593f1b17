//! Reconciliation tracker.
//!
//! Owns one open document's text and its mapping table, and keeps the two
//! consistent as class edits are written back. Ranges are plain indices into
//! the buffer; after each edit, every range downstream of the edited value is
//! shifted by the length delta instead of being re-derived.

use std::ops::Range;

use crate::annotate::{Annotation, Annotator, Strategy};
use crate::error::EditError;
use crate::guard;
use crate::text::{EditorRope, TextBuffer};
use crate::types::{MappingTable, Uid};

/// Apply a signed delta to a usize, saturating at 0 on underflow.
pub fn apply_delta(val: usize, delta: isize) -> usize {
    if delta >= 0 {
        val.saturating_add(delta as usize)
    } else {
        val.saturating_sub((-delta) as usize)
    }
}

/// An edit that passed the divergence guard but has not touched the document yet.
///
/// `text_after` is the whole document as it will read once committed, so a
/// host can persist it before any in-memory state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEdit {
    pub uid: Uid,
    pub range: Range<usize>,
    pub new_value: String,
    pub text_after: String,
    generation: u64,
}

/// Summary of a committed edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEdit {
    pub uid: Uid,
    pub previous: Range<usize>,
    pub range: Range<usize>,
    pub delta: isize,
    /// How many other descriptors were shifted.
    pub shifted: usize,
}

/// One open document, its renderable copy and its mapping table.
pub struct MappedDocument<T: TextBuffer = EditorRope> {
    buffer: T,
    table: MappingTable,
    html: String,
    strategy: Strategy,
    annotator: Annotator,
    /// Bumped whenever the buffer may have changed outside `commit`.
    generation: u64,
}

impl MappedDocument<EditorRope> {
    pub fn from_text(text: &str, annotator: Annotator) -> Self {
        Self::new(EditorRope::from_str(text), annotator)
    }
}

impl<T: TextBuffer> MappedDocument<T> {
    /// Annotate `buffer` and start tracking it.
    pub fn new(buffer: T, annotator: Annotator) -> Self {
        let Annotation {
            html,
            table,
            strategy,
        } = annotator.annotate(&buffer.to_string());
        Self {
            buffer,
            table,
            html,
            strategy,
            annotator,
            generation: 0,
        }
    }

    pub fn buffer(&self) -> &T {
        &self.buffer
    }

    /// Mutable access for out-of-band changes.
    ///
    /// The table is not adjusted; the divergence guard catches any descriptor
    /// whose bytes were disturbed.
    pub fn buffer_mut(&mut self) -> &mut T {
        self.generation += 1;
        &mut self.buffer
    }

    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    /// The renderable copy with UID markers.
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    /// Replace the document text and re-derive the whole table.
    ///
    /// Any previously issued UID becomes meaningless.
    pub fn reannotate(&mut self, text: &str) -> &MappingTable {
        self.buffer.set_text(text);
        let Annotation {
            html,
            table,
            strategy,
        } = self.annotator.annotate(text);
        self.html = html;
        self.table = table;
        self.strategy = strategy;
        self.generation += 1;
        tracing::debug!(
            target: "classmap::tracker",
            elements = self.table.len(),
            "mapping replaced"
        );
        &self.table
    }

    /// Check an edit against the guard and compute the resulting text.
    pub fn stage_edit(&self, uid: Uid, new_value: &str) -> Result<StagedEdit, EditError> {
        let descriptor = self.table.get(uid).ok_or(EditError::UnknownUid { uid })?;
        guard::check(&self.buffer, descriptor)?;

        let mut text_after = self.buffer.to_string();
        text_after.replace_range(descriptor.range(), new_value);

        Ok(StagedEdit {
            uid,
            range: descriptor.range(),
            new_value: new_value.to_string(),
            text_after,
            generation: self.generation,
        })
    }

    /// Write a staged edit into the buffer and shift downstream descriptors.
    ///
    /// The guard is re-run if the buffer may have changed since staging.
    pub fn commit(&mut self, staged: StagedEdit) -> Result<AppliedEdit, EditError> {
        let uid = staged.uid;
        let descriptor = self.table.get(uid).ok_or(EditError::UnknownUid { uid })?;
        if staged.generation != self.generation || descriptor.range() != staged.range {
            guard::check(&self.buffer, descriptor)?;
        }

        let previous = descriptor.range();
        let old_len = previous.len() as isize;
        let delta = staged.new_value.len() as isize - old_len;

        self.buffer.replace_bytes(previous.clone(), &staged.new_value);

        let mut shifted = 0;
        for other in self.table.iter_mut() {
            if other.uid == uid {
                other.range_end = other.range_start + staged.new_value.len();
                other.last_known_value = staged.new_value.clone();
            } else if other.range_start >= previous.end {
                other.range_start = apply_delta(other.range_start, delta);
                other.range_end = apply_delta(other.range_end, delta);
                shifted += 1;
            }
        }

        let range = previous.start..previous.start + staged.new_value.len();
        tracing::debug!(
            target: "classmap::tracker",
            uid,
            ?previous,
            ?range,
            delta,
            shifted,
            "edit applied"
        );
        Ok(AppliedEdit {
            uid,
            previous,
            range,
            delta,
            shifted,
        })
    }

    /// Stage and commit in one step.
    pub fn apply_edit(&mut self, uid: Uid, new_value: &str) -> Result<AppliedEdit, EditError> {
        let staged = self.stage_edit(uid, new_value)?;
        self.commit(staged)
    }

    /// Current bytes under a descriptor's range.
    pub fn value_at(&self, uid: Uid) -> Option<String> {
        let descriptor = self.table.get(uid)?;
        self.buffer
            .slice_bytes(descriptor.range())
            .map(|s| s.to_string())
    }
}
