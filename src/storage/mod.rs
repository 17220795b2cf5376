//! Storage layer for splitlab
//!
//! The engine depends only on [`Repository`]. SQLite backs the CLI; the
//! in-memory store backs tests and simulations.

pub mod memory;
pub mod migrations;
pub mod sqlite;

use chrono::{DateTime, SubsecRound, Utc};

use crate::core::{Event, NewTest, Test, TestResults, TestStatus};
use crate::error::Result;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

/// Persistence boundary for tests and events.
///
/// `update_test_status` is a compare-and-set: it only applies when the
/// stored status equals `expected`, and reports whether it did.
pub trait Repository: Send + Sync {
    fn get_test_by_name(&self, name: &str) -> Result<Option<Test>>;

    fn get_active_tests(&self) -> Result<Vec<Test>>;

    /// Events of one test, in insertion order.
    fn get_events(&self, test_id: &str) -> Result<Vec<Event>>;

    /// Append an event. Events are never modified afterwards.
    fn create_event(&self, event: Event) -> Result<Event>;

    fn update_test_status(
        &self,
        test_id: &str,
        expected: TestStatus,
        new_status: TestStatus,
        results: Option<&TestResults>,
    ) -> Result<bool>;

    /// Register a test in `draft`.
    fn create_test(&self, new_test: NewTest) -> Result<Test>;

    fn get_test(&self, test_id: &str) -> Result<Option<Test>>;

    /// Newest first.
    fn list_tests(
        &self,
        status: Option<TestStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Test>>;
}

/// Current time at the precision both stores keep.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn sort_newest_first(tests: &mut [Test]) {
    tests.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.name.cmp(&b.name))
    });
}
