use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ImportConfig;
use crate::db::Database;
use crate::error::{ConfigError, WikimportError};
use crate::task::{TaskError, TaskPoll, TaskRegistry};
use crate::validator::ValidationReport;

use super::error::ImportError;
use super::orchestrator::{Collaborators, ImportOrchestrator};
use super::progress::{ImportProgressBroadcaster, ImportProgressEvent};
use super::request::{ImportOutcome, ImportRequest};

/// Entry point for callers: validate, submit, cancel and poll imports.
///
/// Cloning is cheap; clones share the in-flight task table.
#[derive(Clone)]
pub struct ImportService {
    orchestrator: Arc<ImportOrchestrator>,
    progress: ImportProgressBroadcaster,
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl ImportService {
    pub fn new(config: ImportConfig, db: Database, collaborators: Collaborators) -> Self {
        let progress = ImportProgressBroadcaster::new(config.progress_capacity);
        let orchestrator =
            ImportOrchestrator::new(collaborators, TaskRegistry::new(db), Arc::new(config));
        Self {
            orchestrator: Arc::new(orchestrator),
            progress,
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Opens the task database named by the config and builds the service.
    pub fn open(config: ImportConfig, collaborators: Collaborators) -> Result<Self, WikimportError> {
        let path = config.database_path().ok_or_else(|| ConfigError::Validation {
            message: "no database_path configured and no home directory found".to_string(),
        })?;
        let db = Database::open(&path)?;
        Ok(Self::new(config, db, collaborators))
    }

    pub fn registry(&self) -> &TaskRegistry {
        self.orchestrator.registry()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ImportProgressEvent> {
        self.progress.subscribe()
    }

    pub async fn validate(
        &self,
        project_id: &str,
        source_root_id: &str,
    ) -> Result<ValidationReport, ImportError> {
        self.orchestrator.validate(project_id, source_root_id).await
    }

    /// Registers a task for `request` and runs it in the background.
    ///
    /// Registration happens before returning, so a conflicting running
    /// import is reported here. Must be called from within a Tokio runtime.
    pub fn submit(&self, request: ImportRequest) -> Result<String, ImportError> {
        let task_id = uuid::Uuid::new_v4().to_string();
        self.registry()
            .register(&request.project.id, &task_id, &request.actor)?;

        let cancel = CancellationToken::new();
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(task_id.clone(), cancel.clone());
        }

        let reporter = self.progress.reporter(&task_id, &request.project.id);
        let orchestrator = Arc::clone(&self.orchestrator);
        let id = task_id.clone();
        let run = tokio::spawn(async move {
            // The outcome or failure is recorded on the task; pollers read it there.
            let _ = orchestrator.execute(request, &id, &cancel, &reporter).await;
        });

        let service = self.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            if let Err(e) = run.await {
                warn!(task_id = %id, error = %e, "Import task did not run to completion");
                if let Err(task_err) = service
                    .registry()
                    .fail(&id, &format!("import task aborted: {}", e))
                {
                    warn!(task_id = %id, error = %task_err, "Could not record aborted import");
                }
            }
            service.forget(&id);
        });

        info!(task_id = %task_id, "Import submitted");
        Ok(task_id)
    }

    /// Requests cancellation of an in-flight import.
    ///
    /// Returns false when the task is unknown or already finished.
    pub fn cancel(&self, task_id: &str) -> bool {
        let token = self
            .tokens
            .lock()
            .ok()
            .and_then(|tokens| tokens.get(task_id).cloned());
        match token {
            Some(token) => {
                info!(task_id = %task_id, "Import cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn poll(&self, task_id: &str) -> Result<TaskPoll<ImportOutcome>, TaskError> {
        self.registry().poll(task_id)
    }

    pub fn stamp_orphaned_stopped(&self) -> Result<usize, TaskError> {
        self.registry().stamp_orphaned_stopped()
    }

    /// Number of imports started by this service that have not finished.
    pub fn in_flight(&self) -> usize {
        self.tokens.lock().map(|t| t.len()).unwrap_or(0)
    }

    fn forget(&self, task_id: &str) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.remove(task_id);
        }
    }
}
