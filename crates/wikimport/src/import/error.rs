use thiserror::Error;

use crate::error::{StorageError, WikiError};
use crate::task::TaskError;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Wiki backend failed: {0}")]
    Wiki(#[from] WikiError),

    #[error("Failed to fetch content for '{path}': {source}")]
    Fetch {
        path: String,
        #[source]
        source: StorageError,
    },

    #[error("No free numbered name for '{0}'")]
    NoFreeName(String),

    #[error("Task bookkeeping failed: {0}")]
    Task(#[from] TaskError),
}
