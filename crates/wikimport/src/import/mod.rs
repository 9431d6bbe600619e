//! Import orchestration: turns approved candidates into wiki pages.
//!
//! A run selects the importable candidates, fetches and rewrites their
//! content on a private clone of the source tree, then writes pages one
//! depth level at a time so that every parent exists before its children.
//! Cancellation is cooperative and checked before each step, each level
//! and each page.

pub mod context;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod request;
pub mod service;

pub use error::ImportError;
pub use orchestrator::{depth_batches, Collaborators, ImportOrchestrator};
pub use progress::{
    BroadcastProgress, ImportPhase, ImportProgressBroadcaster, ImportProgressEvent, NoopProgress,
    ProgressEvent, ProgressReporter,
};
pub use request::{ImportOutcome, ImportRequest, PageImportResult, Project};
pub use service::ImportService;
