//! The message protocol between a preview host and the reconciliation core.
//!
//! The host sends `HostMessage`s; each one yields a `Response` carrying a
//! reply plus any `HostCommand`s the host should carry out (notifications,
//! preview refreshes, runtime style rules). The engine never renders anything
//! itself.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::annotate::{Annotator, Strategy};
use crate::config::EngineConfig;
use crate::error::{EditError, ResolveError};
use crate::resolve::{Choice, Chooser, DynamicOutcome, DynamicRequest, DynamicResolver, FixedChoice};
use crate::text::TextBuffer;
use crate::tokens::{TokenSet, css_safe_anchor};
use crate::tracker::MappedDocument;
use crate::types::{DynamicHint, MappingTable, PassKind, Uid};
use crate::workspace::{FileStore, same_file};

/// Requests from the preview host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    /// Open (or replace) the tracked document and derive a fresh mapping.
    #[serde(rename_all = "camelCase")]
    Reannotate {
        document_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    #[serde(rename_all = "camelCase")]
    ApplyMappedEdit { uid: Uid, new_value: String },
    #[serde(rename_all = "camelCase")]
    ResolveDynamicEdit {
        before_value: String,
        after_value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<DynamicHint>,
        /// Answer to any disambiguation prompt, overriding the engine's chooser.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        choice: Option<Choice>,
    },
    /// The host's copy of the open document changed; the mapping is kept
    /// until the next `Reannotate`.
    #[serde(rename_all = "camelCase")]
    DocumentEdited { document_text: String },
    /// A file was saved outside the engine.
    #[serde(rename_all = "camelCase")]
    DocumentSaved { path: PathBuf },
}

impl HostMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            HostMessage::Reannotate { .. } => "reannotate",
            HostMessage::ApplyMappedEdit { .. } => "applyMappedEdit",
            HostMessage::ResolveDynamicEdit { .. } => "resolveDynamicEdit",
            HostMessage::DocumentEdited { .. } => "documentEdited",
            HostMessage::DocumentSaved { .. } => "documentSaved",
        }
    }
}

/// Why a request produced no change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    UnknownUid,
    SourceDiverged,
    WriteFailed,
    NoMatchFound,
    AmbiguousNoSelection,
    Workspace,
}

/// The engine's answer to one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineReply {
    #[serde(rename_all = "camelCase")]
    Applied {
        uid: Uid,
        range_start: usize,
        range_end: usize,
    },
    #[serde(rename_all = "camelCase")]
    Resolved {
        changed_file_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_touched_file: Option<PathBuf>,
        #[serde(skip_serializing_if = "Option::is_none")]
        constrained_to: Option<PathBuf>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pass: Option<PassKind>,
        /// Set when nothing changed.
        #[serde(skip_serializing_if = "Option::is_none")]
        unresolved: Option<FailureKind>,
    },
    #[serde(rename_all = "camelCase")]
    Mapping {
        table: MappingTable,
        html: String,
        strategy: Strategy,
    },
    /// The message did not concern the open document.
    Unchanged,
    #[serde(rename_all = "camelCase")]
    Error { kind: FailureKind, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

/// Side effects the host performs on the engine's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostCommand {
    Notify {
        level: NotifyLevel,
        message: String,
    },
    /// Replace the preview with a freshly annotated copy.
    RefreshPreview { html: String },
    /// Restyle synthesized elements whose canonical class key is `old_key`.
    #[serde(rename_all = "camelCase")]
    RegisterRuntimeRule {
        old_key: String,
        new_value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        anchor_class: Option<SmolStr>,
    },
}

impl HostCommand {
    fn notify(level: NotifyLevel, message: impl Into<String>) -> Self {
        HostCommand::Notify {
            level,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub reply: EngineReply,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<HostCommand>,
}

impl Response {
    fn new(reply: EngineReply) -> Self {
        Self {
            reply,
            commands: Vec::new(),
        }
    }

    fn with(mut self, command: HostCommand) -> Self {
        self.commands.push(command);
        self
    }

    fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::new(EngineReply::Error {
            kind,
            message: message.into(),
        })
    }
}

struct OpenDocument {
    path: Option<PathBuf>,
    mapped: MappedDocument,
    /// What the store held when the engine last read or wrote this path.
    stored: Option<String>,
}

/// Serializes edit requests against one open document and its workspace.
pub struct Engine<S: FileStore, C: Chooser = FixedChoice> {
    annotator: Annotator,
    resolver: DynamicResolver,
    store: S,
    chooser: C,
    document: Option<OpenDocument>,
}

impl<S: FileStore, C: Chooser> Engine<S, C> {
    pub fn new(config: &EngineConfig, store: S, chooser: C) -> Self {
        Self {
            annotator: Annotator::from_config(config),
            resolver: DynamicResolver::new(config),
            store,
            chooser,
            document: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn document(&self) -> Option<&MappedDocument> {
        self.document.as_ref().map(|d| &d.mapped)
    }

    pub fn document_path(&self) -> Option<&Path> {
        self.document.as_ref().and_then(|d| d.path.as_deref())
    }

    /// Load a document from the store and start tracking it.
    pub async fn open(&mut self, path: impl AsRef<Path>) -> Response {
        let path = self.store.locate(path.as_ref());
        let path = path.as_path();
        match self.store.read(path).await {
            Ok(text) => {
                let response = self.reannotate(text.clone(), Some(path.to_path_buf()));
                if let Some(open) = self.document.as_mut() {
                    open.stored = Some(text);
                }
                response
            }
            Err(err) => {
                tracing::error!(
                    target: "classmap::engine",
                    path = %path.display(),
                    error = %err,
                    "cannot open document"
                );
                Response::failure(FailureKind::Workspace, format!("cannot read {}: {err}", path.display()))
                    .with(HostCommand::notify(
                        NotifyLevel::Error,
                        format!("Could not open {}.", path.display()),
                    ))
            }
        }
    }

    #[tracing::instrument(target = "classmap::engine", skip_all, fields(kind = message.kind()))]
    pub async fn handle(&mut self, message: HostMessage) -> Response {
        match message {
            HostMessage::Reannotate {
                document_text,
                path,
            } => {
                let path = match path {
                    Some(path) => Some(self.store.locate(&path)),
                    None => self.document_path().map(Path::to_path_buf),
                };
                self.reannotate(document_text, path)
            }
            HostMessage::ApplyMappedEdit { uid, new_value } => {
                self.apply_mapped(uid, &new_value).await
            }
            HostMessage::ResolveDynamicEdit {
                before_value,
                after_value,
                hint,
                choice,
            } => {
                let hint = hint.unwrap_or_default();
                self.resolve_dynamic(&before_value, &after_value, &hint, choice)
                    .await
            }
            HostMessage::DocumentEdited { document_text } => {
                if let Some(open) = self.document.as_mut() {
                    open.mapped.buffer_mut().set_text(&document_text);
                }
                Response::new(EngineReply::Unchanged)
            }
            HostMessage::DocumentSaved { path } => {
                let path = self.store.locate(&path);
                self.document_saved(&path).await
            }
        }
    }

    fn reannotate(&mut self, text: String, path: Option<PathBuf>) -> Response {
        let (mapped, stored) = match self.document.take() {
            Some(mut open) => {
                open.mapped.reannotate(&text);
                // The stored baseline only carries over for the same file.
                let same_path = match (&open.path, &path) {
                    (Some(old), Some(new)) => same_file(old, new),
                    _ => false,
                };
                (open.mapped, open.stored.filter(|_| same_path))
            }
            None => (MappedDocument::from_text(&text, self.annotator.clone()), None),
        };
        tracing::info!(
            target: "classmap::engine",
            path = ?path,
            elements = mapped.table().len(),
            strategy = ?mapped.strategy(),
            "document annotated"
        );
        let reply = EngineReply::Mapping {
            table: mapped.table().clone(),
            html: mapped.html().to_string(),
            strategy: mapped.strategy(),
        };
        self.document = Some(OpenDocument {
            path,
            mapped,
            stored,
        });
        Response::new(reply)
    }

    async fn apply_mapped(&mut self, uid: Uid, new_value: &str) -> Response {
        let Some(open) = self.document.as_mut() else {
            return edit_failure(EditError::UnknownUid { uid });
        };

        let staged = match open.mapped.stage_edit(uid, new_value) {
            Ok(staged) => staged,
            Err(err) => return edit_failure(err),
        };

        // Persist first so a refused write leaves the mapping untouched.
        if let Some(path) = &open.path {
            if let Err(err) = check_stored(&self.store, path, open, uid).await {
                return edit_failure(err);
            }
            if let Err(source) = self.store.write(path, &staged.text_after).await {
                return edit_failure(EditError::WriteFailed {
                    path: path.clone(),
                    source,
                });
            }
            open.stored = Some(staged.text_after.clone());
        }

        match open.mapped.commit(staged) {
            Ok(applied) => Response::new(EngineReply::Applied {
                uid,
                range_start: applied.range.start,
                range_end: applied.range.end,
            }),
            Err(err) => edit_failure(err),
        }
    }

    async fn resolve_dynamic(
        &mut self,
        before: &str,
        after: &str,
        hint: &DynamicHint,
        choice: Option<Choice>,
    ) -> Response {
        let active = self.document_path().map(Path::to_path_buf);
        let request = DynamicRequest {
            before,
            after,
            hint,
            active: active.as_deref(),
        };
        let result = match choice {
            Some(choice) => {
                self.resolver
                    .resolve(&self.store, &mut FixedChoice(choice), request)
                    .await
            }
            None => {
                self.resolver
                    .resolve(&self.store, &mut self.chooser, request)
                    .await
            }
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => return resolve_failure(err),
        };

        if outcome.declined {
            return Response::new(resolved_reply(&outcome, Some(FailureKind::AmbiguousNoSelection)));
        }
        if outcome.changed_files.is_empty() {
            if outcome.is_no_match() {
                return Response::new(resolved_reply(&outcome, Some(FailureKind::NoMatchFound)))
                    .with(HostCommand::notify(
                        NotifyLevel::Warning,
                        "Failed to update dynamic class template in source.",
                    ));
            }
            return Response::new(resolved_reply(&outcome, None));
        }

        let mut response = Response::new(resolved_reply(&outcome, None)).with(
            HostCommand::RegisterRuntimeRule {
                old_key: TokenSet::parse(before).canonical_key(),
                new_value: after.to_string(),
                anchor_class: css_safe_anchor(before),
            },
        );
        if !outcome.failed_writes.is_empty() {
            response = response.with(HostCommand::notify(
                NotifyLevel::Warning,
                format!(
                    "Updated {} file(s); {} could not be written.",
                    outcome.changed_file_count(),
                    outcome.failed_writes.len()
                ),
            ));
        }
        if let Some(active) = &active {
            if outcome.touched(active) {
                if let Some(refresh) = self.reload(active).await {
                    response = response.with(refresh);
                }
            }
        }
        response
    }

    async fn document_saved(&mut self, path: &Path) -> Response {
        let is_open = self.document_path().is_some_and(|open| same_file(open, path));
        if !is_open {
            return Response::new(EngineReply::Unchanged);
        }
        match self.reload(path).await {
            Some(refresh) => {
                let reply = self.mapping_reply().unwrap_or(EngineReply::Unchanged);
                Response::new(reply).with(refresh)
            }
            None => Response::new(EngineReply::Unchanged),
        }
    }

    /// Re-read the open document and re-annotate it if its text changed.
    async fn reload(&mut self, path: &Path) -> Option<HostCommand> {
        let text = match self.store.read(path).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(
                    target: "classmap::engine",
                    path = %path.display(),
                    error = %err,
                    "cannot reload document"
                );
                return None;
            }
        };
        let open = self.document.as_mut()?;
        open.stored = Some(text.clone());
        if open.mapped.text() == text {
            return None;
        }
        open.mapped.reannotate(&text);
        tracing::debug!(target: "classmap::engine", path = %path.display(), "document reloaded");
        Some(HostCommand::RefreshPreview {
            html: open.mapped.html().to_string(),
        })
    }

    fn mapping_reply(&self) -> Option<EngineReply> {
        let mapped = self.document()?;
        Some(EngineReply::Mapping {
            table: mapped.table().clone(),
            html: mapped.html().to_string(),
            strategy: mapped.strategy(),
        })
    }
}

/// Refuse a mapped edit when the stored file changed behind the engine's back.
///
/// Writing the tracked text would otherwise overwrite that change. Without a
/// baseline the stored copy must equal the tracked text. An unreadable file
/// is left to the write to report.
async fn check_stored<S: FileStore>(
    store: &S,
    path: &Path,
    open: &OpenDocument,
    uid: Uid,
) -> Result<(), EditError> {
    let current = match store.read(path).await {
        Ok(text) => text,
        Err(err) => {
            tracing::debug!(
                target: "classmap::engine",
                path = %path.display(),
                error = %err,
                "stored copy unreadable before write"
            );
            return Ok(());
        }
    };
    let unchanged = match &open.stored {
        Some(stored) => current == *stored,
        None => current == open.mapped.text(),
    };
    if unchanged {
        return Ok(());
    }

    let descriptor = open
        .mapped
        .table()
        .get(uid)
        .ok_or(EditError::UnknownUid { uid })?;
    tracing::warn!(
        target: "classmap::engine",
        path = %path.display(),
        uid,
        "stored file changed since it was last read"
    );
    Err(EditError::SourceDiverged {
        uid,
        range: descriptor.range(),
        expected: descriptor.last_known_value.clone(),
        found: current.get(descriptor.range()).map(str::to_string),
    })
}

fn resolved_reply(outcome: &DynamicOutcome, unresolved: Option<FailureKind>) -> EngineReply {
    EngineReply::Resolved {
        changed_file_count: outcome.changed_file_count(),
        last_touched_file: outcome.last_touched.clone(),
        constrained_to: outcome.constrained_to.clone(),
        pass: outcome.pass,
        unresolved,
    }
}

fn edit_failure(err: EditError) -> Response {
    let (kind, notice) = match &err {
        EditError::UnknownUid { .. } => (
            FailureKind::UnknownUid,
            HostCommand::notify(
                NotifyLevel::Warning,
                "Could not map edited element back to source. Reopen preview.",
            ),
        ),
        EditError::SourceDiverged { .. } => (
            FailureKind::SourceDiverged,
            HostCommand::notify(
                NotifyLevel::Warning,
                "Source changed since preview was opened. Please reopen the preview.",
            ),
        ),
        EditError::WriteFailed { .. } => {
            tracing::error!(target: "classmap::engine", error = %err, "mapped edit not written");
            (
                FailureKind::WriteFailed,
                HostCommand::notify(NotifyLevel::Error, "Failed to apply class edit to source."),
            )
        }
    };
    Response::failure(kind, err.to_string()).with(notice)
}

fn resolve_failure(err: ResolveError) -> Response {
    tracing::error!(target: "classmap::engine", error = %err, "dynamic edit failed");
    let (kind, message) = match &err {
        ResolveError::Workspace(_) => (
            FailureKind::Workspace,
            "Error updating classes in source. Check the log for details.",
        ),
        ResolveError::WriteFailed { .. } => (
            FailureKind::WriteFailed,
            "Failed to update dynamic class template in source.",
        ),
    };
    Response::failure(kind, err.to_string()).with(HostCommand::notify(NotifyLevel::Error, message))
}
