use std::path::PathBuf;
use thiserror::Error;

use crate::import::ImportError;
use crate::task::TaskError;

#[derive(Error, Debug)]
pub enum WikimportError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Wiki error: {0}")]
    Wiki(#[from] WikiError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Faults reported by a [`StorageClient`](crate::storage::StorageClient).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage node not found: {0}")]
    NotFound(String),

    #[error("Invalid storage node id '{0}'")]
    InvalidId(String),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

/// Faults reported by the page store, the wiki index or the search indexer.
#[derive(Error, Debug)]
pub enum WikiError {
    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("Page '{name}' was rejected: {reason}")]
    Rejected { name: String, reason: String },

    #[error("Wiki backend failure: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, WikimportError>;
