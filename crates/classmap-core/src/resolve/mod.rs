//! Dynamic resolution.
//!
//! When an edited element has no UID, its class string was assembled by code
//! somewhere in the workspace. The resolver loads the candidate files once,
//! runs a cascade of increasingly tolerant passes over them, and writes the
//! first pass that plans any change.

mod ambiguity;
mod passes;

use std::io;
use std::path::{Path, PathBuf};

pub use ambiguity::{AmbiguityResolver, Choice, Chooser, Decision, FixedChoice, Prompt};
pub use passes::{FileEdit, SourceFile};

use crate::annotate::Annotator;
use crate::config::{EngineConfig, ProximityConfig, ScanConfig};
use crate::error::ResolveError;
use crate::types::{CandidateMatch, DynamicHint, PassKind};
use crate::workspace::{FileKind, FileStore, linked_scripts, order_candidates, same_file};

use passes::{Query, TOLERANT_PASSES};

/// One dynamic edit as seen by the resolver.
#[derive(Debug, Clone, Copy)]
pub struct DynamicRequest<'a> {
    pub before: &'a str,
    pub after: &'a str,
    pub hint: &'a DynamicHint,
    /// The document the preview is showing, if any.
    pub active: Option<&'a Path>,
}

/// What a resolution did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicOutcome {
    /// The pass whose rewrites were written.
    pub pass: Option<PassKind>,
    pub changed_files: Vec<PathBuf>,
    pub last_touched: Option<PathBuf>,
    /// Set when the user restricted the edit to one file.
    pub constrained_to: Option<PathBuf>,
    pub matches: Vec<CandidateMatch>,
    /// Planned writes that storage refused.
    pub failed_writes: Vec<PathBuf>,
    /// The user dismissed the disambiguation prompt.
    pub declined: bool,
    /// The request was empty or a no-op and no pass ran.
    pub ignored: bool,
}

impl DynamicOutcome {
    pub fn changed_file_count(&self) -> usize {
        self.changed_files.len()
    }

    /// Every pass ran and none planned a change.
    pub fn is_no_match(&self) -> bool {
        self.pass.is_none() && !self.declined && !self.ignored
    }

    pub fn touched(&self, path: &Path) -> bool {
        self.changed_files.iter().any(|p| same_file(p, path))
    }
}

/// Runs the pass cascade for dynamic edits.
#[derive(Debug, Clone)]
pub struct DynamicResolver {
    annotator: Annotator,
    scan: ScanConfig,
    proximity: ProximityConfig,
}

impl Default for DynamicResolver {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl DynamicResolver {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            annotator: Annotator::from_config(config),
            scan: config.scan.clone(),
            proximity: config.proximity.clone(),
        }
    }

    #[tracing::instrument(
        target = "classmap::resolve",
        skip_all,
        fields(before = request.before, after = request.after)
    )]
    pub async fn resolve<S: FileStore, C: Chooser>(
        &self,
        store: &S,
        chooser: &mut C,
        request: DynamicRequest<'_>,
    ) -> Result<DynamicOutcome, ResolveError> {
        let mut outcome = DynamicOutcome::default();
        if request.before.trim().is_empty()
            || request.after.trim().is_empty()
            || request.before == request.after
        {
            tracing::debug!(target: "classmap::resolve", "nothing to resolve");
            outcome.ignored = true;
            return Ok(outcome);
        }

        let files = self.load(store, request.active).await?;
        let query = Query::new(
            request.before,
            request.after,
            request.hint,
            &self.annotator,
            &self.proximity,
        );
        let all: Vec<&SourceFile> = files.iter().collect();

        // A decision always leaves at least one exact edit to write, so a
        // file the user narrowed the request to ends the cascade here.
        let mut edits = passes::exact_literal(&query, &all);
        if !edits.is_empty() {
            let candidates: Vec<PathBuf> = edits.iter().map(|e| e.path.clone()).collect();
            match AmbiguityResolver::new(request.active)
                .decide(chooser, &candidates)
                .await
            {
                Decision::Declined => {
                    tracing::info!(target: "classmap::resolve", "disambiguation declined");
                    outcome.declined = true;
                    return Ok(outcome);
                }
                Decision::Everywhere => {}
                Decision::Single(path) => {
                    edits.retain(|e| e.path == path);
                    if candidates.len() > 1 {
                        outcome.constrained_to = Some(path);
                    }
                }
            }
            self.write(store, PassKind::ExactLiteral, edits, &mut outcome)
                .await?;
            return Ok(outcome);
        }

        for (kind, pass) in TOLERANT_PASSES {
            let edits = pass(&query, &all);
            if edits.is_empty() {
                tracing::trace!(target: "classmap::resolve", pass = ?kind, "no candidates");
                continue;
            }
            self.write(store, *kind, edits, &mut outcome).await?;
            return Ok(outcome);
        }

        tracing::info!(
            target: "classmap::resolve",
            files = files.len(),
            "no source literal matched"
        );
        Ok(outcome)
    }

    /// Load every candidate's text, skipping files that cannot be read.
    async fn load<S: FileStore>(
        &self,
        store: &S,
        active: Option<&Path>,
    ) -> Result<Vec<SourceFile>, ResolveError> {
        let listed: Vec<PathBuf> = store
            .list_candidates(&self.scan)
            .await?
            .iter()
            .map(|path| store.locate(path))
            .collect();
        let active = active.map(|path| store.locate(path));
        let active = active.as_deref();

        let mut active_text = None;
        let mut linked = Vec::new();
        if let Some(active) = active {
            match store.read(active).await {
                Ok(text) => {
                    linked = linked_scripts(&text, active, store.root());
                    active_text = Some(text);
                }
                Err(err) => tracing::debug!(
                    target: "classmap::resolve",
                    path = %active.display(),
                    error = %err,
                    "active document unreadable"
                ),
            }
        }

        let mut files = Vec::new();
        for path in order_candidates(listed, active, &linked) {
            let Some(kind) = FileKind::of(&path) else {
                continue;
            };
            let is_active = active.is_some_and(|a| same_file(a, &path));
            let text = match active_text.take_if(|_| is_active) {
                Some(text) => text,
                None => match store.read(&path).await {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::debug!(
                            target: "classmap::resolve",
                            path = %path.display(),
                            error = %err,
                            "skipping unreadable candidate"
                        );
                        continue;
                    }
                },
            };
            files.push(SourceFile { path, kind, text });
        }

        tracing::debug!(target: "classmap::resolve", files = files.len(), "candidates loaded");
        Ok(files)
    }

    /// Write planned edits one file at a time.
    ///
    /// Fails only when every write fails; partial successes are reported in
    /// the outcome.
    async fn write<S: FileStore>(
        &self,
        store: &S,
        pass: PassKind,
        edits: Vec<FileEdit>,
        outcome: &mut DynamicOutcome,
    ) -> Result<(), ResolveError> {
        let mut first_failure: Option<(PathBuf, io::Error)> = None;
        for edit in edits {
            match store.write(&edit.path, &edit.text).await {
                Ok(()) => {
                    outcome.matches.extend(edit.matches);
                    outcome.last_touched = Some(edit.path.clone());
                    outcome.changed_files.push(edit.path);
                }
                Err(err) => {
                    tracing::warn!(
                        target: "classmap::resolve",
                        path = %edit.path.display(),
                        error = %err,
                        "write failed"
                    );
                    outcome.failed_writes.push(edit.path.clone());
                    first_failure.get_or_insert((edit.path, err));
                }
            }
        }

        if outcome.changed_files.is_empty() {
            if let Some((path, source)) = first_failure {
                return Err(ResolveError::WriteFailed { path, source });
            }
        }

        outcome.pass = Some(pass);
        tracing::info!(
            target: "classmap::resolve",
            pass = pass.number(),
            changed = outcome.changed_files.len(),
            failed = outcome.failed_writes.len(),
            "dynamic edit written"
        );
        Ok(())
    }
}
