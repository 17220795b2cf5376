//! SQLite repository

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;
use uuid::Uuid;

use super::{Repository, migrations, now};
use crate::core::{
    AudienceCriteria, Event, EventType, NewTest, Test, TestResults, TestStatus, Variant,
};
use crate::error::{Result, SplitError};

/// Default wait for a locked database before a call fails.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// SQLite-backed [`Repository`].
///
/// One connection per instance, serialized behind a mutex. Separate
/// instances on the same file coordinate through SQLite locking.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
    schema_version: u32,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository")
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

/// Raw `tests` row before decoding.
struct TestRow {
    id: String,
    name: String,
    description: Option<String>,
    status: String,
    audience_json: Option<String>,
    results_json: Option<String>,
    created_at: String,
    updated_at: String,
}

const TEST_COLUMNS: &str =
    "id, name, description, status, audience_json, results_json, created_at, updated_at";

impl SqliteRepository {
    /// Open database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::configure_pragmas(&conn)?;
        let schema_version = migrations::run_migrations(&conn)?;
        debug!(path = %path.display(), schema_version, "opened sqlite store");

        Ok(Self {
            conn: Mutex::new(conn),
            schema_version,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let schema_version = migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            schema_version,
        })
    }

    /// Current schema version after migrations.
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }

    fn load_test(conn: &Connection, row: TestRow) -> Result<Test> {
        let mut stmt = conn.prepare_cached(
            "SELECT variant_id, name, weight FROM test_variants
             WHERE test_id = ? ORDER BY position ASC",
        )?;
        let variants = stmt
            .query_map([&row.id], |r| {
                Ok(Variant {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    weight: r.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let status: TestStatus = row.status.parse().map_err(|_| {
            SplitError::Storage(format!("test {} has unknown status {}", row.id, row.status))
        })?;
        let audience_criteria = row
            .audience_json
            .as_deref()
            .map(serde_json::from_str::<AudienceCriteria>)
            .transpose()?;
        let results = row
            .results_json
            .as_deref()
            .map(serde_json::from_str::<TestResults>)
            .transpose()?;

        Ok(Test {
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            id: row.id,
            name: row.name,
            description: row.description,
            status,
            variants,
            audience_criteria,
            results,
        })
    }

    fn query_tests(
        conn: &Connection,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<Test>> {
        let rows = {
            let mut stmt = conn.prepare(sql)?;
            stmt.query_map(args, test_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        rows.into_iter()
            .map(|row| Self::load_test(conn, row))
            .collect()
    }

    fn find_test(conn: &Connection, column: &str, value: &str) -> Result<Option<Test>> {
        let sql = format!("SELECT {TEST_COLUMNS} FROM tests WHERE {column} = ?");
        let row = conn.query_row(&sql, [value], test_row).optional()?;
        row.map(|row| Self::load_test(conn, row)).transpose()
    }
}

impl Repository for SqliteRepository {
    fn get_test_by_name(&self, name: &str) -> Result<Option<Test>> {
        let conn = self.conn.lock();
        Self::find_test(&conn, "name", name)
    }

    fn get_active_tests(&self) -> Result<Vec<Test>> {
        let conn = self.conn.lock();
        Self::query_tests(
            &conn,
            &format!(
                "SELECT {TEST_COLUMNS} FROM tests WHERE status = ? ORDER BY created_at ASC, name ASC"
            ),
            [TestStatus::Active.as_str()],
        )
    }

    fn get_events(&self, test_id: &str) -> Result<Vec<Event>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, test_id, variant_id, subject_id, event_type, event_name,
                    event_value, event_data, session_id, timestamp
             FROM events WHERE test_id = ? ORDER BY seq ASC",
        )?;
        let raw = stmt
            .query_map([test_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<f64>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(
                |(id, test_id, variant_id, subject_id, ty, name, value, data, session, ts)| {
                    Ok(Event {
                        event_type: ty.parse::<EventType>()?,
                        event_data: data.as_deref().map(serde_json::from_str).transpose()?,
                        timestamp: parse_timestamp(&ts)?,
                        id,
                        test_id,
                        variant_id,
                        subject_id,
                        event_name: name,
                        event_value: value,
                        session_id: session,
                    })
                },
            )
            .collect()
    }

    fn create_event(&self, event: Event) -> Result<Event> {
        let data = event
            .event_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO events (
                id, test_id, variant_id, subject_id, event_type, event_name,
                event_value, event_data, session_id, timestamp
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                event.id,
                event.test_id,
                event.variant_id,
                event.subject_id,
                event.event_type.as_str(),
                event.event_name,
                event.event_value,
                data,
                event.session_id,
                format_timestamp(&event.timestamp),
            ],
        )?;
        Ok(event)
    }

    fn update_test_status(
        &self,
        test_id: &str,
        expected: TestStatus,
        new_status: TestStatus,
        results: Option<&TestResults>,
    ) -> Result<bool> {
        let results_json = results.map(serde_json::to_string).transpose()?;
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE tests
             SET status = ?1, results_json = COALESCE(?2, results_json), updated_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                new_status.as_str(),
                results_json,
                format_timestamp(&now()),
                test_id,
                expected.as_str(),
            ],
        )?;
        Ok(changed == 1)
    }

    fn create_test(&self, new_test: NewTest) -> Result<Test> {
        new_test.validate()?;
        let audience_json = new_test
            .audience_criteria
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let created_at = now();
        let test = Test {
            id: Uuid::new_v4().to_string(),
            name: new_test.name,
            description: new_test.description,
            status: TestStatus::Draft,
            variants: new_test.variants,
            audience_criteria: new_test.audience_criteria,
            results: None,
            created_at,
            updated_at: created_at,
        };

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM tests WHERE name = ?)",
            [&test.name],
            |row| row.get(0),
        )?;
        if exists {
            return Err(SplitError::TestAlreadyExists(test.name));
        }

        let created_at = format_timestamp(&test.created_at);
        tx.execute(
            "INSERT INTO tests (
                id, name, description, status, audience_json, results_json, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, NULL, ?, ?)",
            params![
                test.id,
                test.name,
                test.description,
                test.status.as_str(),
                audience_json,
                created_at,
                created_at,
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO test_variants (test_id, position, variant_id, name, weight)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for (position, variant) in test.variants.iter().enumerate() {
                stmt.execute(params![
                    test.id,
                    position as i64,
                    variant.id,
                    variant.name,
                    variant.weight
                ])?;
            }
        }
        tx.commit()?;

        debug!(test = %test.name, id = %test.id, "created test");
        Ok(test)
    }

    fn get_test(&self, test_id: &str) -> Result<Option<Test>> {
        let conn = self.conn.lock();
        Self::find_test(&conn, "id", test_id)
    }

    fn list_tests(
        &self,
        status: Option<TestStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Test>> {
        let conn = self.conn.lock();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        match status {
            Some(status) => Self::query_tests(
                &conn,
                &format!(
                    "SELECT {TEST_COLUMNS} FROM tests WHERE status = ?
                     ORDER BY created_at DESC, name ASC LIMIT ? OFFSET ?"
                ),
                params![status.as_str(), limit, offset],
            ),
            None => Self::query_tests(
                &conn,
                &format!(
                    "SELECT {TEST_COLUMNS} FROM tests
                     ORDER BY created_at DESC, name ASC LIMIT ? OFFSET ?"
                ),
                params![limit, offset],
            ),
        }
    }
}

fn test_row(row: &Row<'_>) -> rusqlite::Result<TestRow> {
    Ok(TestRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        audience_json: row.get(4)?,
        results_json: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| SplitError::Storage(format!("invalid timestamp {raw:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::storage::contract;

    fn repo() -> SqliteRepository {
        SqliteRepository::open_in_memory().unwrap()
    }

    #[test]
    fn contract_create_and_fetch() {
        contract::create_and_fetch(&repo());
    }

    #[test]
    fn contract_duplicate_names_rejected() {
        contract::duplicate_names_rejected(&repo());
    }

    #[test]
    fn contract_conditional_status_update() {
        contract::conditional_status_update(&repo());
    }

    #[test]
    fn contract_events_are_scoped_and_ordered() {
        contract::events_are_scoped_and_ordered(&repo());
    }

    #[test]
    fn contract_events_for_unknown_test_rejected() {
        contract::events_for_unknown_test_rejected(&repo());
    }

    #[test]
    fn contract_listing_filters_and_pages() {
        contract::listing_filters_and_pages(&repo());
    }

    #[test]
    fn file_database_uses_wal() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("splitlab.db");
        let repo = SqliteRepository::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(repo.schema_version(), migrations::SCHEMA_VERSION);

        let mode: String = repo
            .conn
            .lock()
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn events_cannot_be_rewritten() {
        let repo = repo();
        let test = repo
            .create_test(NewTest::new("append", vec![Variant::new("a", "A", 1.0)]))
            .unwrap();
        let event = Event::new(&test.id, "a", EventType::Impression, "view", "u1", "s1");
        repo.create_event(event).unwrap();

        let conn = repo.conn.lock();
        assert!(conn
            .execute("UPDATE events SET variant_id = 'b'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM events", []).is_err());
    }

    #[test]
    fn reopened_database_keeps_data() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("splitlab.db");
        let id = {
            let repo = SqliteRepository::open(&db_path).unwrap();
            repo.create_test(NewTest::new("persist", vec![Variant::new("a", "A", 1.0)]))
                .unwrap()
                .id
        };
        let repo = SqliteRepository::open(&db_path).unwrap();
        assert_eq!(repo.get_test(&id).unwrap().unwrap().name, "persist");
    }

    #[test]
    fn timestamps_have_fixed_width() {
        let ts = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(&ts), "2026-01-02T03:04:05.000000Z");
        assert_eq!(parse_timestamp(&format_timestamp(&ts)).unwrap(), ts);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
