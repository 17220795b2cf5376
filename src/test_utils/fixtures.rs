use std::path::PathBuf;

use chrono::Utc;
use tempfile::TempDir;

use crate::core::{Event, EventType, Test, TestStatus, Variant};
use crate::storage::SqliteRepository;

/// Test fixture providing an isolated data root with a SQLite store.
pub struct StoreFixture {
    pub temp_dir: TempDir,
    pub data_path: PathBuf,
    pub repo: SqliteRepository,
}

impl StoreFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let data_path = temp_dir.path().to_path_buf();
        let repo = SqliteRepository::open(data_path.join("splitlab.db"))
            .expect("Failed to open sqlite store");

        println!("[FIXTURE] Created store in: {:?}", data_path);

        Self {
            temp_dir,
            data_path,
            repo,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_path.join("splitlab.db")
    }

    /// Open a second, independent connection to the same database.
    pub fn second_connection(&self) -> SqliteRepository {
        SqliteRepository::open(self.db_path()).expect("Failed to reopen sqlite store")
    }
}

impl Default for StoreFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StoreFixture {
    fn drop(&mut self) {
        println!("[FIXTURE] Cleaning up store: {:?}", self.data_path);
    }
}

/// An active test with the given `(id, weight)` variants, named after the ids.
pub fn test_with_variants(name: &str, variants: &[(&str, f64)]) -> Test {
    let now = Utc::now();
    Test {
        id: format!("test-{name}"),
        name: name.to_string(),
        description: None,
        status: TestStatus::Active,
        variants: variants
            .iter()
            .map(|(id, weight)| Variant::new(*id, id.to_uppercase(), *weight))
            .collect(),
        audience_criteria: None,
        results: None,
        created_at: now,
        updated_at: now,
    }
}

/// `impressions` impression events and `conversions` conversion events for
/// one variant, each from a distinct subject.
pub fn events_for(
    test_id: &str,
    variant_id: &str,
    impressions: usize,
    conversions: usize,
) -> Vec<Event> {
    let impressions = (0..impressions).map(|i| {
        let subject = format!("{variant_id}-subject-{i}");
        Event::new(
            test_id,
            variant_id,
            EventType::Impression,
            "view",
            subject.clone(),
            subject,
        )
    });
    let conversions = (0..conversions).map(|i| {
        let subject = format!("{variant_id}-subject-{i}");
        Event::new(
            test_id,
            variant_id,
            EventType::Conversion,
            "convert",
            subject.clone(),
            subject,
        )
    });
    impressions.chain(conversions).collect()
}
