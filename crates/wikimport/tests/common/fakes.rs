//! In-memory stand-ins for the page store, wiki index, search indexer and a
//! storage client that can be told to fail.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use wikimport::{FsStorage, Node, PageId, PageStore, SearchIndexer, StorageClient, WikiIndex};
use wikimport::{StorageError, WikiError};

/// A page as held by [`InMemoryWiki`].
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub id: PageId,
    pub project_id: String,
    pub name: String,
    pub parent: Option<PageId>,
    pub versions: Vec<String>,
}

impl PageRecord {
    pub fn content(&self) -> &str {
        self.versions.last().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Default)]
struct WikiState {
    pages: Vec<PageRecord>,
    next_id: u32,
    fail_names: HashSet<String>,
    cancel_after: Option<(usize, CancellationToken)>,
    creations: usize,
}

/// Page store and wiki index over a vector of pages.
#[derive(Default)]
pub struct InMemoryWiki {
    state: Mutex<WikiState>,
}

impl InMemoryWiki {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an existing page, returning its id.
    pub fn seed_page(&self, project_id: &str, name: &str, parent: Option<&str>, content: &str) -> PageId {
        let mut state = self.state.lock().unwrap();
        let parent = parent.and_then(|p| {
            state
                .pages
                .iter()
                .find(|page| page.name.eq_ignore_ascii_case(p))
                .map(|page| page.id.clone())
        });
        insert_page(&mut state, project_id, name, parent, content)
    }

    /// Makes `create_page` fail for the given page name.
    pub fn fail_creating(&self, name: &str) {
        self.state.lock().unwrap().fail_names.insert(name.to_string());
    }

    /// Cancels `token` right after the `count`-th page is created.
    pub fn cancel_after_creations(&self, count: usize, token: CancellationToken) {
        self.state.lock().unwrap().cancel_after = Some((count, token));
    }

    pub fn pages(&self) -> Vec<PageRecord> {
        self.state.lock().unwrap().pages.clone()
    }

    pub fn page(&self, name: &str) -> Option<PageRecord> {
        self.state
            .lock()
            .unwrap()
            .pages
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    pub fn page_names(&self) -> Vec<String> {
        self.pages().into_iter().map(|p| p.name).collect()
    }

    fn path_of(pages: &[PageRecord], page: &PageRecord) -> String {
        let mut segments = vec![page.name.clone()];
        let mut parent = page.parent.clone();
        while let Some(id) = parent {
            match pages.iter().find(|p| p.id == id) {
                Some(p) => {
                    segments.push(p.name.clone());
                    parent = p.parent.clone();
                }
                None => break,
            }
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }
}

fn insert_page(
    state: &mut WikiState,
    project_id: &str,
    name: &str,
    parent: Option<PageId>,
    content: &str,
) -> PageId {
    state.next_id += 1;
    let id = format!("page-{}", state.next_id);
    state.pages.push(PageRecord {
        id: id.clone(),
        project_id: project_id.to_string(),
        name: name.to_string(),
        parent,
        versions: vec![content.to_string()],
    });
    id
}

#[async_trait]
impl WikiIndex for InMemoryWiki {
    async fn find_by_name(&self, project_id: &str, name: &str) -> Result<Option<PageId>, WikiError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pages
            .iter()
            .find(|p| p.project_id == project_id && p.name.to_lowercase() == name.to_lowercase())
            .map(|p| p.id.clone()))
    }

    async fn find_by_path(&self, project_id: &str, path: &str) -> Result<Option<PageId>, WikiError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pages
            .iter()
            .filter(|p| p.project_id == project_id)
            .find(|p| Self::path_of(&state.pages, p) == path)
            .map(|p| p.id.clone()))
    }
}

#[async_trait]
impl PageStore for InMemoryWiki {
    async fn create_page(
        &self,
        project_id: &str,
        name: &str,
        content: &str,
        parent: Option<&PageId>,
    ) -> Result<PageId, WikiError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_names.contains(name) {
            return Err(WikiError::Backend(format!("refusing to create '{}'", name)));
        }
        if state
            .pages
            .iter()
            .any(|p| p.project_id == project_id && p.name.eq_ignore_ascii_case(name))
        {
            return Err(WikiError::Rejected {
                name: name.to_string(),
                reason: "name already taken".to_string(),
            });
        }

        let id = insert_page(&mut state, project_id, name, parent.cloned(), content);
        state.creations += 1;
        if let Some((count, token)) = &state.cancel_after {
            if state.creations >= *count {
                token.cancel();
            }
        }
        Ok(id)
    }

    async fn update_page(&self, page_id: &PageId, content: &str) -> Result<u32, WikiError> {
        let mut state = self.state.lock().unwrap();
        let page = state
            .pages
            .iter_mut()
            .find(|p| &p.id == page_id)
            .ok_or_else(|| WikiError::PageNotFound(page_id.clone()))?;
        page.versions.push(content.to_string());
        Ok(page.versions.len() as u32)
    }

    async fn latest_content(&self, page_id: &PageId) -> Result<Option<String>, WikiError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pages
            .iter()
            .find(|p| &p.id == page_id)
            .and_then(|p| p.versions.last().cloned()))
    }
}

/// One observed reindex request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReindexCall {
    pub project_id: String,
    pub page_ids: Vec<PageId>,
}

/// Search indexer that forwards every request to a channel.
pub struct RecordingIndexer {
    sender: mpsc::UnboundedSender<ReindexCall>,
}

impl RecordingIndexer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ReindexCall>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl SearchIndexer for RecordingIndexer {
    async fn reindex(&self, project_id: &str, page_ids: Vec<PageId>) -> Result<(), WikiError> {
        let _ = self.sender.send(ReindexCall {
            project_id: project_id.to_string(),
            page_ids,
        });
        Ok(())
    }
}

/// [`FsStorage`] wrapper whose downloads fail for selected file ids.
pub struct FlakyStorage {
    inner: FsStorage,
    failing: HashSet<String>,
}

impl FlakyStorage {
    pub fn new(inner: FsStorage, failing: &[&str]) -> Self {
        Self {
            inner,
            failing: failing.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl StorageClient for FlakyStorage {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<Node>, StorageError> {
        self.inner.list_children(folder_id).await
    }

    async fn get_content(&self, file_id: &str) -> Result<Vec<u8>, StorageError> {
        if self.failing.contains(file_id) {
            return Err(StorageError::Backend(format!("download of '{}' timed out", file_id)));
        }
        self.inner.get_content(file_id).await
    }

    async fn ensure_folder(&self, parent_id: &str, name: &str) -> Result<String, StorageError> {
        self.inner.ensure_folder(parent_id, name).await
    }

    async fn clone_subtree(
        &self,
        source_id: &str,
        dest_parent_id: &str,
    ) -> Result<String, StorageError> {
        self.inner.clone_subtree(source_id, dest_parent_id).await
    }
}
