//! Task repository: CRUD operations for the `wiki_import_tasks` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

pub const STATUS_RUNNING: &str = "running";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_STOPPED: &str = "stopped";
pub const STATUS_ERROR: &str = "error";

/// A raw task row from the database.
#[derive(Debug, Clone)]
pub struct TaskRow {
    pub task_id: String,
    pub project_id: String,
    pub status: String,
    pub creator: String,
    pub created_at: String,
    pub process_end: Option<String>,
    pub error: Option<String>,
    pub result: Option<String>,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            task_id: row.get("task_id")?,
            project_id: row.get("project_id")?,
            status: row.get("status")?,
            creator: row.get("creator")?,
            created_at: row.get("created_at")?,
            process_end: row.get("process_end")?,
            error: row.get("error")?,
            result: row.get("result")?,
        })
    }
}

/// Outcome of [`insert_running`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Registered,
    /// Another task was already running for the project; it has been
    /// moved to `error` and the new row was not inserted.
    Rejected { stale_task_id: String },
}

/// Inserts a `running` task unless the project already has one.
///
/// The insert, the conflict lookup and the stale-task transition run in one
/// transaction; the partial unique index on `(project_id) WHERE status =
/// 'running'` is what makes the check-and-set atomic.
pub fn insert_running(
    db: &Database,
    row: &TaskRow,
    stale_error: &str,
) -> Result<Registration, DatabaseError> {
    db.with_tx(|tx| {
        let inserted = tx.execute(
            "INSERT INTO wiki_import_tasks (task_id, project_id, status, creator, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.task_id,
                row.project_id,
                STATUS_RUNNING,
                row.creator,
                row.created_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(Registration::Registered),
            Err(e) => {
                let err = DatabaseError::from(e);
                if !err.is_constraint_violation() {
                    return Err(err);
                }

                let stale: Option<String> = tx
                    .query_row(
                        "SELECT task_id FROM wiki_import_tasks
                         WHERE project_id = ?1 AND status = ?2",
                        params![row.project_id, STATUS_RUNNING],
                        |r| r.get(0),
                    )
                    .optional()?;

                // No running row means the violation was a task id collision.
                let Some(stale_task_id) = stale else {
                    return Err(err);
                };

                tx.execute(
                    "UPDATE wiki_import_tasks SET status = ?2, process_end = ?3, error = ?4
                     WHERE task_id = ?1 AND status = ?5",
                    params![
                        stale_task_id,
                        STATUS_ERROR,
                        row.created_at,
                        stale_error,
                        STATUS_RUNNING,
                    ],
                )?;

                Ok(Registration::Rejected { stale_task_id })
            }
        }
    })
}

/// Moves a running task into a terminal status.
///
/// Returns the number of rows changed: 0 when the task is unknown or no
/// longer running.
pub fn finish(
    db: &Database,
    task_id: &str,
    status: &str,
    process_end: &str,
    error: Option<&str>,
    result: Option<&str>,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE wiki_import_tasks
             SET status = ?2, process_end = ?3, error = ?4, result = ?5
             WHERE task_id = ?1 AND status = ?6",
            params![task_id, status, process_end, error, result, STATUS_RUNNING],
        )?;
        Ok(changed)
    })
}

/// Finds a task by its ID.
pub fn find_by_id(db: &Database, task_id: &str) -> Result<Option<TaskRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM wiki_import_tasks WHERE task_id = ?1",
                params![task_id],
                TaskRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Finds the running task of a project, if any.
pub fn find_running(db: &Database, project_id: &str) -> Result<Option<TaskRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM wiki_import_tasks WHERE project_id = ?1 AND status = ?2",
                params![project_id, STATUS_RUNNING],
                TaskRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Lists all tasks of a project, newest first.
pub fn list_by_project(db: &Database, project_id: &str) -> Result<Vec<TaskRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM wiki_import_tasks WHERE project_id = ?1
             ORDER BY created_at DESC, task_id DESC",
        )?;
        let rows = stmt
            .query_map(params![project_id], TaskRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Stamps `process_end` on stopped tasks that never received one.
pub fn stamp_stopped_without_end(db: &Database, process_end: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE wiki_import_tasks SET process_end = ?1
             WHERE status = ?2 AND process_end IS NULL",
            params![process_end, STATUS_STOPPED],
        )?;
        Ok(changed)
    })
}
