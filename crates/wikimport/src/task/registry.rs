use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{format_timestamp, TaskError, TaskPoll, TaskStatus, WikiImportTask};
use crate::db::task_repo::{self, Registration, TaskRow};
use crate::db::Database;

/// Error recorded on a running task that a newer request found in the way.
const STALE_TASK_ERROR: &str = "marked stale: another import was requested for this project";

/// Owner of all task state transitions.
///
/// Cloning is cheap; clones share the same database handle.
#[derive(Clone)]
pub struct TaskRegistry {
    db: Database,
}

impl TaskRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Records a new `Running` task for `project_id`.
    ///
    /// If the project already has a running task, that task is moved to
    /// `Error` and this request is rejected with [`TaskError::AlreadyRunning`].
    pub fn register(
        &self,
        project_id: &str,
        task_id: &str,
        creator: &str,
    ) -> Result<WikiImportTask, TaskError> {
        let now = Utc::now();
        let row = TaskRow {
            task_id: task_id.to_string(),
            project_id: project_id.to_string(),
            status: TaskStatus::Running.as_str().to_string(),
            creator: creator.to_string(),
            created_at: format_timestamp(now),
            process_end: None,
            error: None,
            result: None,
        };

        match task_repo::insert_running(&self.db, &row, STALE_TASK_ERROR)? {
            Registration::Registered => {
                log::info!("Registered import task {} for project {}", task_id, project_id);
                Ok(WikiImportTask::from_row(&row))
            }
            Registration::Rejected { stale_task_id } => {
                log::warn!(
                    "Rejected import task {} for project {}: task {} was still running and is now marked as error",
                    task_id,
                    project_id,
                    stale_task_id
                );
                Err(TaskError::AlreadyRunning {
                    project_id: project_id.to_string(),
                    stale_task_id,
                })
            }
        }
    }

    /// Marks a task as completed and stores its result for polling.
    pub fn complete<T: Serialize>(&self, task_id: &str, result: &T) -> Result<(), TaskError> {
        let json = serde_json::to_string(result)?;
        self.transition(task_id, TaskStatus::Completed, None, Some(&json))
    }

    /// Marks a task as stopped by cancellation.
    pub fn stop<T: Serialize>(&self, task_id: &str, result: &T) -> Result<(), TaskError> {
        let json = serde_json::to_string(result)?;
        self.transition(task_id, TaskStatus::Stopped, None, Some(&json))
    }

    /// Marks a task as failed with the given error message.
    pub fn fail(&self, task_id: &str, message: &str) -> Result<(), TaskError> {
        self.transition(task_id, TaskStatus::Error, Some(message), None)
    }

    fn transition(
        &self,
        task_id: &str,
        to: TaskStatus,
        error: Option<&str>,
        result: Option<&str>,
    ) -> Result<(), TaskError> {
        let process_end = format_timestamp(Utc::now());
        let changed =
            task_repo::finish(&self.db, task_id, to.as_str(), &process_end, error, result)?;
        if changed > 0 {
            log::info!("Import task {} is now {}", task_id, to);
            return Ok(());
        }

        match task_repo::find_by_id(&self.db, task_id)? {
            None => Err(TaskError::NotFound(task_id.to_string())),
            Some(row) => Err(TaskError::InvalidTransition {
                task_id: task_id.to_string(),
                from: WikiImportTask::from_row(&row).status,
                to,
            }),
        }
    }

    pub fn find(&self, task_id: &str) -> Result<Option<WikiImportTask>, TaskError> {
        Ok(task_repo::find_by_id(&self.db, task_id)?
            .as_ref()
            .map(WikiImportTask::from_row))
    }

    pub fn running_for_project(
        &self,
        project_id: &str,
    ) -> Result<Option<WikiImportTask>, TaskError> {
        Ok(task_repo::find_running(&self.db, project_id)?
            .as_ref()
            .map(WikiImportTask::from_row))
    }

    /// All tasks of a project, newest first.
    pub fn list_for_project(&self, project_id: &str) -> Result<Vec<WikiImportTask>, TaskError> {
        Ok(task_repo::list_by_project(&self.db, project_id)?
            .iter()
            .map(WikiImportTask::from_row)
            .collect())
    }

    /// Returns the stored result once the task has finished.
    ///
    /// A task that ended in `Error` re-raises its failure as
    /// [`TaskError::Failed`].
    pub fn poll<T: DeserializeOwned>(&self, task_id: &str) -> Result<TaskPoll<T>, TaskError> {
        let row = task_repo::find_by_id(&self.db, task_id)?
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        let task = WikiImportTask::from_row(&row);

        match task.status {
            TaskStatus::Running => Ok(TaskPoll::Pending),
            TaskStatus::Error => Err(TaskError::Failed {
                task_id: task.task_id,
                message: task.error.unwrap_or_else(|| "unknown error".to_string()),
            }),
            TaskStatus::Completed | TaskStatus::Stopped => {
                let json = row
                    .result
                    .ok_or_else(|| TaskError::MissingResult(task_id.to_string()))?;
                Ok(TaskPoll::Ready(serde_json::from_str(&json)?))
            }
        }
    }

    /// Stamps `process_end` on stopped tasks left without one.
    pub fn stamp_orphaned_stopped(&self) -> Result<usize, TaskError> {
        let now = format_timestamp(Utc::now());
        let stamped = task_repo::stamp_stopped_without_end(&self.db, &now)?;
        if stamped > 0 {
            log::info!("Stamped process_end on {} orphaned stopped tasks", stamped);
        }
        Ok(stamped)
    }
}
