//! classmap-core: source-mapped class editing for live HTML previews.
//!
//! This crate provides:
//! - `Annotator` - assigns UIDs to class-bearing elements and records the byte
//!   range of every class value
//! - `MappedDocument<T>` - keeps that mapping consistent as edits land, guarded
//!   against out-of-band changes
//! - `DynamicResolver` - finds and rewrites the string literal that produced a
//!   class value when no mapping exists
//! - `Engine` - the message protocol a preview host talks to

pub mod annotate;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod guard;
pub mod literals;
pub mod resolve;
pub mod text;
pub mod tokens;
pub mod tracker;
pub mod types;
pub mod workspace;

pub use annotate::{Annotation, Annotator, Strategy};
pub use config::{AnnotateStrategy, ConfigFile, EngineConfig};
pub use detect::uses_tailwind;
pub use engine::{
    Engine, EngineReply, FailureKind, HostCommand, HostMessage, NotifyLevel, Response,
};
pub use error::{ConfigError, EditError, MarkupError, ResolveError, WorkspaceError};
pub use resolve::{
    AmbiguityResolver, Choice, Chooser, Decision, DynamicOutcome, DynamicRequest, DynamicResolver,
    FileEdit, FixedChoice, Prompt, SourceFile,
};
pub use smol_str::SmolStr;
pub use text::{EditorRope, TextBuffer};
pub use tokens::TokenSet;
pub use tracker::{AppliedEdit, MappedDocument, StagedEdit};
pub use types::{
    CandidateMatch, DynamicHint, EditRequest, ElementDescriptor, MappingTable, MatchQuality,
    PassKind, Uid,
};
pub use workspace::{DiskStore, FileKind, FileStore, MemoryStore};
