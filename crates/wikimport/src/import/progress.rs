//! Import progress events for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Phase of an import run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Started,
    Validating,
    Preparing,
    Importing,
    Finalizing,
    Completed,
    PartiallyFailed,
    Aborted,
    Failed,
}

impl ImportPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportPhase::Completed
                | ImportPhase::PartiallyFailed
                | ImportPhase::Aborted
                | ImportPhase::Failed
        )
    }
}

impl std::fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportPhase::Started => write!(f, "Started"),
            ImportPhase::Validating => write!(f, "Validating"),
            ImportPhase::Preparing => write!(f, "Preparing"),
            ImportPhase::Importing => write!(f, "Importing"),
            ImportPhase::Finalizing => write!(f, "Finalizing"),
            ImportPhase::Completed => write!(f, "Completed"),
            ImportPhase::PartiallyFailed => write!(f, "Partially failed"),
            ImportPhase::Aborted => write!(f, "Aborted"),
            ImportPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress event for an import task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgressEvent {
    pub task_id: String,
    pub project_id: String,
    pub phase: ImportPhase,
    /// Depth of the batch being imported (importing phase only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ImportProgressEvent {
    pub fn new(task_id: &str, project_id: &str, phase: ImportPhase, message: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            project_id: project_id.to_string(),
            phase,
            depth: None,
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Events emitted by the orchestrator while a run progresses.
pub enum ProgressEvent {
    Phase { phase: ImportPhase, message: String },
    Batch { depth: usize, pages: usize },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for tests and callers that do not stream progress.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Broadcasts import progress events to any number of subscribers.
#[derive(Clone)]
pub struct ImportProgressBroadcaster {
    sender: Arc<broadcast::Sender<ImportProgressEvent>>,
}

impl ImportProgressBroadcaster {
    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: ImportProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ImportProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a reporter bound to one task.
    pub fn reporter(&self, task_id: &str, project_id: &str) -> BroadcastProgress {
        BroadcastProgress {
            task_id: task_id.to_string(),
            project_id: project_id.to_string(),
            sender: Arc::clone(&self.sender),
        }
    }
}

impl Default for ImportProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Bridges orchestrator events of one task to the broadcast channel.
pub struct BroadcastProgress {
    task_id: String,
    project_id: String,
    sender: Arc<broadcast::Sender<ImportProgressEvent>>,
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        let event = match event {
            ProgressEvent::Phase { phase, message } => {
                ImportProgressEvent::new(&self.task_id, &self.project_id, phase, &message)
            }
            ProgressEvent::Batch { depth, pages } => {
                let mut event = ImportProgressEvent::new(
                    &self.task_id,
                    &self.project_id,
                    ImportPhase::Importing,
                    &format!("Importing {} pages at depth {}", pages, depth),
                );
                event.depth = Some(depth);
                event
            }
        };
        let _ = self.sender.send(event);
    }
}
