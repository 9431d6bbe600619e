use std::collections::HashMap;

use crate::candidate::ImportCandidate;
use crate::rewrite::FileIndex;
use crate::wiki::PageId;

use super::request::{ImportRequest, PageImportResult};

/// State of one import run, filled in step by step.
pub struct ImportContext {
    // Input
    pub request: ImportRequest,
    pub task_id: String,

    // Validating results: importable candidates in source order, and their
    // indices grouped by depth
    pub importable: Vec<ImportCandidate>,
    pub batches: Vec<Vec<usize>>,

    // Preparing results
    pub workspace_root_id: Option<String>,
    pub files: FileIndex,

    // Importing results
    pub results: Vec<PageImportResult>,
    /// Page id of every candidate written or found unchanged, by wiki name.
    pub page_ids: HashMap<String, PageId>,
    /// Pages created or updated, for reindexing.
    pub touched: Vec<PageId>,
}

impl ImportContext {
    pub fn new(request: ImportRequest, task_id: &str) -> Self {
        Self {
            request,
            task_id: task_id.to_string(),
            importable: Vec::new(),
            batches: Vec::new(),
            workspace_root_id: None,
            files: FileIndex::new(),
            results: Vec::new(),
            page_ids: HashMap::new(),
            touched: Vec::new(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.request.project.id
    }
}
