//! In-memory repository

use parking_lot::RwLock;
use uuid::Uuid;

use super::{Repository, now, sort_newest_first};
use crate::core::{Event, NewTest, Test, TestResults, TestStatus};
use crate::error::{Result, SplitError};

#[derive(Debug, Default)]
struct State {
    tests: Vec<Test>,
    events: Vec<Event>,
}

/// Process-local [`Repository`]; the status update runs under the write
/// lock, which makes it a compare-and-set.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total events stored across all tests.
    pub fn event_count(&self) -> usize {
        self.state.read().events.len()
    }
}

impl Repository for MemoryRepository {
    fn get_test_by_name(&self, name: &str) -> Result<Option<Test>> {
        Ok(self
            .state
            .read()
            .tests
            .iter()
            .find(|t| t.name == name)
            .cloned())
    }

    fn get_active_tests(&self) -> Result<Vec<Test>> {
        Ok(self
            .state
            .read()
            .tests
            .iter()
            .filter(|t| t.status == TestStatus::Active)
            .cloned()
            .collect())
    }

    fn get_events(&self, test_id: &str) -> Result<Vec<Event>> {
        Ok(self
            .state
            .read()
            .events
            .iter()
            .filter(|e| e.test_id == test_id)
            .cloned()
            .collect())
    }

    fn create_event(&self, event: Event) -> Result<Event> {
        let mut state = self.state.write();
        if !state.tests.iter().any(|t| t.id == event.test_id) {
            return Err(SplitError::TestNotFound(event.test_id));
        }
        if state.events.iter().any(|e| e.id == event.id) {
            return Err(SplitError::Storage(format!(
                "event {} already recorded",
                event.id
            )));
        }
        state.events.push(event.clone());
        Ok(event)
    }

    fn update_test_status(
        &self,
        test_id: &str,
        expected: TestStatus,
        new_status: TestStatus,
        results: Option<&TestResults>,
    ) -> Result<bool> {
        let mut state = self.state.write();
        let Some(test) = state.tests.iter_mut().find(|t| t.id == test_id) else {
            return Ok(false);
        };
        if test.status != expected {
            return Ok(false);
        }
        test.status = new_status;
        if let Some(results) = results {
            test.results = Some(results.clone());
        }
        test.updated_at = now();
        Ok(true)
    }

    fn create_test(&self, new_test: NewTest) -> Result<Test> {
        new_test.validate()?;
        let name = new_test.name;

        let mut state = self.state.write();
        if state.tests.iter().any(|t| t.name == name) {
            return Err(SplitError::TestAlreadyExists(name));
        }

        let created_at = now();
        let test = Test {
            id: Uuid::new_v4().to_string(),
            name,
            description: new_test.description,
            status: TestStatus::Draft,
            variants: new_test.variants,
            audience_criteria: new_test.audience_criteria,
            results: None,
            created_at,
            updated_at: created_at,
        };
        state.tests.push(test.clone());
        Ok(test)
    }

    fn get_test(&self, test_id: &str) -> Result<Option<Test>> {
        Ok(self
            .state
            .read()
            .tests
            .iter()
            .find(|t| t.id == test_id)
            .cloned())
    }

    fn list_tests(
        &self,
        status: Option<TestStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Test>> {
        let mut tests: Vec<Test> = self
            .state
            .read()
            .tests
            .iter()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        sort_newest_first(&mut tests);
        Ok(tests.into_iter().skip(offset).take(limit).collect())
    }
}
