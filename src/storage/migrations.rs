//! Database migrations

use rusqlite::Connection;

use crate::error::{Result, SplitError};

const MIGRATIONS: [&str; 1] = [include_str!("../../migrations/001_initial_schema.sql")];

pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// Run all pending migrations, tracking progress in `PRAGMA user_version`.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    let current_version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(|err| SplitError::Storage(format!("failed to read user_version: {err}")))?;

    if current_version > SCHEMA_VERSION {
        return Err(SplitError::Storage(format!(
            "database schema v{current_version} is newer than supported v{SCHEMA_VERSION}"
        )));
    }

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let target_version = (idx + 1) as u32;
        if current_version >= target_version {
            continue;
        }

        conn.execute_batch(sql).map_err(|err| {
            SplitError::Storage(format!("migration {target_version} failed: {err}"))
        })?;
        conn.pragma_update(None, "user_version", target_version)
            .map_err(|err| {
                SplitError::Storage(format!(
                    "failed to set user_version {target_version}: {err}"
                ))
            })?;
    }

    Ok(SCHEMA_VERSION)
}
