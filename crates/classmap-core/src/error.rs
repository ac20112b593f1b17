//! Error types for classmap operations.

use std::ops::Range;
use std::path::PathBuf;

use miette::{Diagnostic, NamedSource, SourceSpan};

use crate::types::Uid;

/// Errors from applying an edit to a mapped element.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum EditError {
    /// The edit references a descriptor that is not in the current table.
    #[error("no element with uid {uid} in the current mapping")]
    #[diagnostic(
        code(classmap::unknown_uid),
        help("the preview is out of date; re-annotate the document")
    )]
    UnknownUid { uid: Uid },

    /// The document changed out-of-band since the mapping was captured.
    #[error("source changed at {range:?} since the mapping was captured")]
    #[diagnostic(
        code(classmap::source_diverged),
        help("the edit was discarded; re-annotate the document and retry")
    )]
    SourceDiverged {
        uid: Uid,
        range: Range<usize>,
        expected: String,
        /// What the range holds now; None when it no longer addresses valid text.
        found: Option<String>,
    },

    /// Storage rejected the write.
    #[error("failed to write {}", path.display())]
    #[diagnostic(code(classmap::write_failed))]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that abort a dynamic resolution as a whole.
///
/// Per-file read and parse failures never surface here; those files are skipped.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum ResolveError {
    #[error(transparent)]
    #[diagnostic_source]
    Workspace(#[from] WorkspaceError),

    /// Every planned write failed.
    #[error("failed to write {}", path.display())]
    #[diagnostic(code(classmap::write_failed))]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors enumerating the candidate file set.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum WorkspaceError {
    #[error("workspace root {} does not exist", root.display())]
    #[diagnostic(code(classmap::workspace::missing_root))]
    MissingRoot { root: PathBuf },

    #[error("workspace scan failed")]
    #[diagnostic(code(classmap::workspace::scan))]
    Scan(#[from] tokio::task::JoinError),
}

/// Errors loading or saving engine configuration.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("unsupported config format for {}", path.display())]
    #[diagnostic(
        code(classmap::config::format),
        help("use a .json or .toml file")
    )]
    UnsupportedFormat { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlRead(#[from] toml::de::Error),

    #[error(transparent)]
    TomlWrite(#[from] toml::ser::Error),
}

/// Structural parse failure with source code location information.
#[derive(thiserror::Error, Debug, Diagnostic)]
#[error("markup parse error: {message}")]
#[diagnostic(
    code(classmap::markup),
    help("annotation falls back to tag scanning for this document")
)]
pub struct MarkupError {
    message: String,
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    location: SourceSpan,
}

impl MarkupError {
    pub fn new(message: impl Into<String>, source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        Self {
            message: message.into(),
            src: NamedSource::new("document", source.to_string()),
            location: SourceSpan::new(offset.into(), 0),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn offset(&self) -> usize {
        self.location.offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_error_clamps_offset() {
        let err = MarkupError::new("unclosed tag", "<div", 99);
        assert_eq!(err.offset(), 4);
        assert_eq!(err.message(), "unclosed tag");
    }

    #[test]
    fn test_diagnostic_codes() {
        let err = EditError::UnknownUid { uid: 7 };
        assert_eq!(
            err.code().map(|c| c.to_string()).as_deref(),
            Some("classmap::unknown_uid")
        );
        assert_eq!(err.to_string(), "no element with uid 7 in the current mapping");
    }
}
