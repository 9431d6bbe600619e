//! Import task bookkeeping: one record per invocation, single-flight per
//! project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::task_repo::{self, TaskRow};
use crate::db::DatabaseError;

pub mod registry;

pub use registry::TaskRegistry;

/// Lifecycle of an import task. Every state other than `Running` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Stopped,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => task_repo::STATUS_RUNNING,
            TaskStatus::Completed => task_repo::STATUS_COMPLETED,
            TaskStatus::Stopped => task_repo::STATUS_STOPPED,
            TaskStatus::Error => task_repo::STATUS_ERROR,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }

    fn parse(s: &str, task_id: &str) -> Self {
        match s {
            task_repo::STATUS_RUNNING => TaskStatus::Running,
            task_repo::STATUS_COMPLETED => TaskStatus::Completed,
            task_repo::STATUS_STOPPED => TaskStatus::Stopped,
            task_repo::STATUS_ERROR => TaskStatus::Error,
            other => {
                log::warn!(
                    "Unknown task status '{}' for task {}, treating it as error",
                    other,
                    task_id
                );
                TaskStatus::Error
            }
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiImportTask {
    pub task_id: String,
    pub project_id: String,
    pub status: TaskStatus,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WikiImportTask {
    pub(crate) fn from_row(row: &TaskRow) -> Self {
        Self {
            task_id: row.task_id.clone(),
            project_id: row.project_id.clone(),
            status: TaskStatus::parse(&row.status, &row.task_id),
            creator: row.creator.clone(),
            created_at: parse_timestamp(&row.created_at),
            process_end: row.process_end.as_deref().map(parse_timestamp),
            error: row.error.clone(),
        }
    }
}

/// Result of polling a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPoll<T> {
    /// Still running.
    Pending,
    /// Finished (completed or stopped) with its stored result.
    Ready(T),
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("An import is already running for project '{project_id}' (task {stale_task_id} was marked as error)")]
    AlreadyRunning {
        project_id: String,
        stale_task_id: String,
    },

    #[error("Import task not found: {0}")]
    NotFound(String),

    #[error("Import task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Import task {task_id} failed: {message}")]
    Failed { task_id: String, message: String },

    #[error("Import task {0} finished without a stored result")]
    MissingResult(String),

    #[error("Task database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Task result serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}
