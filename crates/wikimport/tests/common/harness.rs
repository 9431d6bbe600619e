//! Test harness for isolated import runs.
//!
//! `TestHarness` owns a temporary storage root with a `source` folder to
//! import from, an in-memory wiki, a recording search indexer and an
//! in-memory task database.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use wikimport::{
    Collaborators, Database, FsStorage, ImportCandidate, ImportConfig, ImportOrchestrator,
    ImportRequest, ImportService, Project, StorageClient, TaskRegistry, ValidationReport,
};

use super::fakes::{InMemoryWiki, RecordingIndexer, ReindexCall};

pub const PROJECT_ID: &str = "p1";
pub const SOURCE_ROOT: &str = "source";

pub struct TestHarness {
    temp_dir: TempDir,
    pub storage: Arc<dyn StorageClient>,
    pub wiki: Arc<InMemoryWiki>,
    pub indexer: Arc<RecordingIndexer>,
    pub reindex_calls: mpsc::UnboundedReceiver<ReindexCall>,
    pub db: Database,
    pub config: ImportConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::create_dir_all(temp_dir.path().join(SOURCE_ROOT))
            .expect("Failed to create source dir");

        let storage: Arc<dyn StorageClient> = Arc::new(FsStorage::new(temp_dir.path()));
        let (indexer, reindex_calls) = RecordingIndexer::new();

        Self {
            temp_dir,
            storage,
            wiki: Arc::new(InMemoryWiki::new()),
            indexer: Arc::new(indexer),
            reindex_calls,
            db: Database::open_in_memory().expect("Failed to open test database"),
            config: ImportConfig::default(),
        }
    }

    /// Replaces the storage client, e.g. with a failing wrapper.
    pub fn with_storage(mut self, storage: Arc<dyn StorageClient>) -> Self {
        self.storage = storage;
        self
    }

    pub fn fs_storage(&self) -> FsStorage {
        FsStorage::new(self.temp_dir.path())
    }

    pub fn source_path(&self) -> PathBuf {
        self.temp_dir.path().join(SOURCE_ROOT)
    }

    /// Writes `<folder>/<name>.md` for a page folder such as `page2/page3`.
    pub fn write_page(&self, folder: &str, content: &str) -> PathBuf {
        let dir = self.source_path().join(folder);
        let name = folder.rsplit('/').next().unwrap_or(folder);
        std::fs::create_dir_all(&dir).expect("Failed to create page folder");
        let path = dir.join(format!("{}.md", name));
        std::fs::write(&path, content).expect("Failed to write page file");
        path
    }

    /// Writes an arbitrary file below the source root.
    pub fn write_file(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.source_path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create folder");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            storage: Arc::clone(&self.storage),
            pages: self.wiki.clone(),
            wiki: self.wiki.clone(),
            indexer: self.indexer.clone(),
        }
    }

    pub fn registry(&self) -> TaskRegistry {
        TaskRegistry::new(self.db.clone())
    }

    pub fn orchestrator(&self) -> ImportOrchestrator {
        ImportOrchestrator::new(
            self.collaborators(),
            self.registry(),
            Arc::new(self.config.clone()),
        )
    }

    pub fn service(&self) -> ImportService {
        ImportService::new(self.config.clone(), self.db.clone(), self.collaborators())
    }

    pub fn project(&self) -> Project {
        Project {
            id: PROJECT_ID.to_string(),
            storage_root_id: String::new(),
        }
    }

    pub fn request(&self, candidates: Vec<ImportCandidate>) -> ImportRequest {
        ImportRequest {
            project: self.project(),
            source_root_id: SOURCE_ROOT.to_string(),
            candidates,
            actor: "tester".to_string(),
        }
    }

    pub async fn validate(&self) -> ValidationReport {
        self.orchestrator()
            .validate(PROJECT_ID, SOURCE_ROOT)
            .await
            .expect("Validation failed")
    }

    /// Waits for the next reindex request, failing the test after a second.
    pub async fn next_reindex(&mut self) -> ReindexCall {
        tokio::time::timeout(Duration::from_secs(1), self.reindex_calls.recv())
            .await
            .expect("Timed out waiting for reindex")
            .expect("Indexer channel closed")
    }

    /// Gives spawned tasks a chance to run, then reports whether any reindex
    /// request arrived.
    pub async fn reindex_requested(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(100), self.reindex_calls.recv())
            .await
            .ok()
            .flatten()
            .is_some()
    }
}
