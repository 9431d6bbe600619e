//! Schema versioning through SQLite's `user_version` pragma.
//!
//! Each step is applied in its own transaction together with the version
//! bump, so a failed step leaves the database at the previous version.

use rusqlite::Connection;

use super::error::DatabaseError;

/// Schema steps; `STEPS[n]` upgrades version `n` to `n + 1`.
const STEPS: &[(&str, &str)] = &[
    (
        "create wiki_import_tasks",
        include_str!("sql/001_create_wiki_import_tasks.sql"),
    ),
    (
        "index tasks by status",
        include_str!("sql/002_index_tasks_status.sql"),
    ),
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    STEPS.len() as u32
}

/// Current schema version of `conn`.
pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.query_row("PRAGMA user_version", [], |r| r.get(0))?)
}

/// Applies every step above the stored version.
///
/// Refuses databases written by a newer build.
pub fn migrate(conn: &mut Connection) -> Result<(), DatabaseError> {
    let found = schema_version(conn)?;
    let latest = latest_version();
    if found > latest {
        return Err(DatabaseError::UnsupportedVersion { found, latest });
    }

    for (version, (description, sql)) in (1..).zip(STEPS).skip(found as usize) {
        log::info!("Applying schema v{}: {}", version, description);

        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .and_then(|()| tx.pragma_update(None, "user_version", version))
            .map_err(|e| DatabaseError::Migration {
                version,
                reason: e.to_string(),
            })?;
        tx.commit()?;
    }

    Ok(())
}
