use std::sync::{Arc, Barrier};
use std::thread;

use splitlab::config::LifecycleConfig;
use splitlab::core::{Event, NewTest, Test, TestResults, TestStatus, Variant};
use splitlab::error::{Result, SplitError};
use splitlab::lifecycle::{LifecycleController, RunStatus};
use splitlab::storage::{MemoryRepository, Repository, SqliteRepository};
use splitlab::test_utils::fixtures::{StoreFixture, events_for};
use splitlab::test_utils::logging::init_test_tracing;

fn two_arm_test(name: &str) -> NewTest {
    NewTest::new(
        name,
        vec![Variant::new("a", "A", 1.0), Variant::new("b", "B", 1.0)],
    )
}

/// Create, activate and fill a test whose `a` arm clearly wins.
fn seed_winner(repo: &dyn Repository, name: &str) -> Test {
    let test = repo.create_test(two_arm_test(name)).unwrap();
    assert!(repo
        .update_test_status(&test.id, TestStatus::Draft, TestStatus::Active, None)
        .unwrap());
    for event in events_for(&test.id, "a", 100, 40)
        .into_iter()
        .chain(events_for(&test.id, "b", 100, 10))
    {
        repo.create_event(event).unwrap();
    }
    repo.get_test(&test.id).unwrap().unwrap()
}

#[test]
fn second_run_is_a_no_op() {
    init_test_tracing();
    let fixture = StoreFixture::new();
    let repo: Arc<dyn Repository> = Arc::new(fixture.second_connection());
    seed_winner(repo.as_ref(), "checkout");

    let controller = LifecycleController::new(Arc::clone(&repo), &LifecycleConfig::default());
    let first = controller.run().unwrap();
    assert_eq!(first.processed_count, 1);
    assert_eq!(first.declared_count(), 1);

    let stored = repo.get_test_by_name("checkout").unwrap().unwrap();
    assert_eq!(stored.status, TestStatus::Completed);
    let results = stored.results.expect("results written on completion");
    assert_eq!(results.winner, "a");
    assert!(results.confidence >= 95);
    let decided_at = results.decided_at;

    let second = controller.run().unwrap();
    assert_eq!(second.processed_count, 0);
    assert_eq!(second.declared_count(), 0);

    let again = repo.get_test_by_name("checkout").unwrap().unwrap();
    assert_eq!(again.results.unwrap().decided_at, decided_at);
}

#[test]
fn concurrent_runs_complete_a_test_once() {
    init_test_tracing();
    let fixture = StoreFixture::new();
    let test = seed_winner(&fixture.repo, "race");

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let repo: Arc<dyn Repository> =
                Arc::new(SqliteRepository::open(fixture.db_path()).unwrap());
            let barrier = Arc::clone(&barrier);
            let snapshot = test.clone();
            thread::spawn(move || {
                let controller = LifecycleController::new(repo, &LifecycleConfig::default());
                barrier.wait();
                controller.evaluate_test(&snapshot)
            })
        })
        .collect();

    let statuses: Vec<RunStatus> = handles
        .into_iter()
        .map(|h| h.join().unwrap().status)
        .collect();
    println!("[TEST] concurrent statuses: {statuses:?}");

    let declared = statuses
        .iter()
        .filter(|s| **s == RunStatus::WinnerDeclared)
        .count();
    let lost = statuses
        .iter()
        .filter(|s| **s == RunStatus::AlreadyTransitioned)
        .count();
    assert_eq!(declared, 1);
    assert_eq!(lost, 1);

    let stored = fixture.repo.get_test(&test.id).unwrap().unwrap();
    assert_eq!(stored.status, TestStatus::Completed);
}

/// Delegates to a memory store but fails event reads for one test.
struct BrokenEvents {
    inner: MemoryRepository,
    broken_test_id: parking_lot::Mutex<Option<String>>,
}

impl Repository for BrokenEvents {
    fn get_test_by_name(&self, name: &str) -> Result<Option<Test>> {
        self.inner.get_test_by_name(name)
    }
    fn get_active_tests(&self) -> Result<Vec<Test>> {
        self.inner.get_active_tests()
    }
    fn get_events(&self, test_id: &str) -> Result<Vec<Event>> {
        if self.broken_test_id.lock().as_deref() == Some(test_id) {
            return Err(SplitError::Storage("event table unreadable".to_string()));
        }
        self.inner.get_events(test_id)
    }
    fn create_event(&self, event: Event) -> Result<Event> {
        self.inner.create_event(event)
    }
    fn update_test_status(
        &self,
        test_id: &str,
        expected: TestStatus,
        new_status: TestStatus,
        results: Option<&TestResults>,
    ) -> Result<bool> {
        self.inner
            .update_test_status(test_id, expected, new_status, results)
    }
    fn create_test(&self, new_test: NewTest) -> Result<Test> {
        self.inner.create_test(new_test)
    }
    fn get_test(&self, test_id: &str) -> Result<Option<Test>> {
        self.inner.get_test(test_id)
    }
    fn list_tests(
        &self,
        status: Option<TestStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Test>> {
        self.inner.list_tests(status, limit, offset)
    }
}

#[test]
fn one_failing_test_does_not_stop_the_run() {
    init_test_tracing();
    let repo = Arc::new(BrokenEvents {
        inner: MemoryRepository::new(),
        broken_test_id: parking_lot::Mutex::new(None),
    });
    let healthy = seed_winner(repo.as_ref(), "healthy");
    let broken = seed_winner(repo.as_ref(), "broken");
    *repo.broken_test_id.lock() = Some(broken.id.clone());

    let dyn_repo: Arc<dyn Repository> = repo.clone();
    let controller = LifecycleController::new(dyn_repo, &LifecycleConfig::default());
    let summary = controller.run().unwrap();

    assert_eq!(summary.processed_count, 2);
    assert_eq!(summary.declared_count(), 1);
    assert_eq!(summary.failed_count(), 1);

    let failed = summary
        .results
        .iter()
        .find(|r| r.test_id == broken.id)
        .unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("unreadable"));

    assert_eq!(
        repo.get_test(&healthy.id).unwrap().unwrap().status,
        TestStatus::Completed
    );
    assert_eq!(
        repo.get_test(&broken.id).unwrap().unwrap().status,
        TestStatus::Active
    );
}

#[test]
fn sequential_pool_handles_many_tests() {
    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    for idx in 0..12 {
        seed_winner(repo.as_ref(), &format!("bulk-{idx}"));
    }
    let config = LifecycleConfig {
        parallelism: 1,
        ..LifecycleConfig::default()
    };
    let summary = LifecycleController::new(Arc::clone(&repo), &config)
        .run()
        .unwrap();
    assert_eq!(summary.processed_count, 12);
    assert_eq!(summary.declared_count(), 12);
    assert!(repo.get_active_tests().unwrap().is_empty());
}
