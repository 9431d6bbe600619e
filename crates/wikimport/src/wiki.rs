//! Page storage, wiki index and search indexer boundaries.

use async_trait::async_trait;

use crate::error::WikiError;

/// Opaque page identifier issued by the page store.
pub type PageId = String;

/// Name lookups against the destination project's existing pages.
#[async_trait]
pub trait WikiIndex: Send + Sync {
    /// Finds a non-deleted page by name. Matching is case-insensitive.
    async fn find_by_name(&self, project_id: &str, name: &str)
        -> Result<Option<PageId>, WikiError>;

    /// Finds a page by its full slash path (e.g. `/parent/child`).
    async fn find_by_path(&self, project_id: &str, path: &str)
        -> Result<Option<PageId>, WikiError>;
}

/// Page and version storage.
#[async_trait]
pub trait PageStore: Send + Sync {
    async fn create_page(
        &self,
        project_id: &str,
        name: &str,
        content: &str,
        parent: Option<&PageId>,
    ) -> Result<PageId, WikiError>;

    /// Appends a new version and returns its number.
    async fn update_page(&self, page_id: &PageId, content: &str) -> Result<u32, WikiError>;

    /// Content of the current version, if the page has one.
    async fn latest_content(&self, page_id: &PageId) -> Result<Option<String>, WikiError>;
}

#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn reindex(&self, project_id: &str, page_ids: Vec<PageId>) -> Result<(), WikiError>;
}
