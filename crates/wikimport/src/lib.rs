pub mod candidate;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod logging;
pub mod rewrite;
pub mod storage;
pub mod task;
pub mod validator;
pub mod wiki;

pub use candidate::{CandidateStatus, ImportCandidate};
pub use config::{load_config, ImportConfig, LogFormat};
pub use db::Database;
pub use error::{ConfigError, Result, StorageError, WikiError, WikimportError};
pub use import::{
    Collaborators, ImportError, ImportOrchestrator, ImportOutcome, ImportRequest, ImportService,
    PageImportResult, Project,
};
pub use rewrite::{FileIndex, PageIndex, Rewriter};
pub use storage::{FsStorage, Node, StorageClient};
pub use task::{TaskError, TaskPoll, TaskRegistry, TaskStatus, WikiImportTask};
pub use validator::{ValidationReport, Validator};
pub use wiki::{PageId, PageStore, SearchIndexer, WikiIndex};
