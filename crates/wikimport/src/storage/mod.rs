//! File-storage provider boundary.
//!
//! The importer never touches storage directly; everything goes through the
//! [`StorageClient`] trait so that the same code runs against the project
//! storage service in production and against [`FsStorage`] locally.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub mod filesystem;

pub use filesystem::FsStorage;

/// One entry of a storage folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
}

impl Node {
    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_folder: true,
        }
    }

    pub fn file(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_folder: false,
        }
    }
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Lists the direct children of a folder in a stable order.
    async fn list_children(&self, folder_id: &str) -> Result<Vec<Node>, StorageError>;

    /// Downloads the raw bytes of a file.
    async fn get_content(&self, file_id: &str) -> Result<Vec<u8>, StorageError>;

    /// Returns the id of the child folder `name`, creating it when missing.
    async fn ensure_folder(&self, parent_id: &str, name: &str) -> Result<String, StorageError>;

    /// Copies the subtree rooted at `source_id` below `dest_parent_id` and
    /// returns the id of the copied root.
    async fn clone_subtree(
        &self,
        source_id: &str,
        dest_parent_id: &str,
    ) -> Result<String, StorageError>;
}
