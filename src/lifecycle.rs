//! Lifecycle controller: batch evaluation of active tests and operator
//! status transitions.
//!
//! A run never mutates a test unless a winner is declared, and then only
//! through the conditional `active -> completed` update, so overlapping
//! runs cannot both complete the same test.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LifecycleConfig;
use crate::core::{Test, TestResults, TestStatus};
use crate::error::{Result, SplitError};
use crate::stats::{EvaluationStatus, evaluate_with_min_sample};
use crate::storage::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InsufficientData,
    InProgress,
    /// This run completed the test
    WinnerDeclared,
    /// Significant, but another run completed the test first
    AlreadyTransitioned,
    /// Evaluation failed; see `error`
    Failed,
}

impl RunStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient_data",
            Self::InProgress => "in_progress",
            Self::WinnerDeclared => "winner_declared",
            Self::AlreadyTransitioned => "already_transitioned",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunResult {
    pub test_id: String,
    pub test_name: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestRunResult {
    fn new(test: &Test, status: RunStatus) -> Self {
        Self {
            test_id: test.id.clone(),
            test_name: test.name.clone(),
            status,
            winner: None,
            confidence: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub processed_count: usize,
    pub results: Vec<TestRunResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    fn count(&self, status: RunStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Tests this run moved to `completed`.
    pub fn declared_count(&self) -> usize {
        self.count(RunStatus::WinnerDeclared)
    }

    pub fn failed_count(&self) -> usize {
        self.count(RunStatus::Failed)
    }
}

pub struct LifecycleController {
    repo: Arc<dyn Repository>,
    parallelism: usize,
    min_sample: u64,
    /// `None` when the pool could not be built; tests then run sequentially
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("parallelism", &self.parallelism)
            .field("min_sample", &self.min_sample)
            .finish_non_exhaustive()
    }
}

impl LifecycleController {
    pub fn new(repo: Arc<dyn Repository>, config: &LifecycleConfig) -> Self {
        let parallelism = config.parallelism as usize;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism)
            .thread_name(|idx| format!("splitlab-lifecycle-{idx}"))
            .build()
            .map_err(|err| warn!(error = %err, "lifecycle pool unavailable; evaluating sequentially"))
            .ok();

        Self {
            repo,
            parallelism,
            min_sample: config.min_sample.max(1),
            pool,
        }
    }

    /// Evaluate every active test once.
    ///
    /// Only a failure to list active tests fails the run; anything that
    /// goes wrong with a single test is recorded in its result.
    pub fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let tests = self.repo.get_active_tests()?;
        debug!(active = tests.len(), "lifecycle run started");

        let results = self.evaluate_all(&tests);
        let summary = RunSummary {
            processed_count: results.len(),
            results,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            processed = summary.processed_count,
            declared = summary.declared_count(),
            failed = summary.failed_count(),
            "lifecycle run finished"
        );
        Ok(summary)
    }

    fn evaluate_all(&self, tests: &[Test]) -> Vec<TestRunResult> {
        match &self.pool {
            Some(pool) => pool.install(|| tests.par_iter().map(|t| self.evaluate_test(t)).collect()),
            None => tests.iter().map(|t| self.evaluate_test(t)).collect(),
        }
    }

    /// Evaluate a single test, completing it if a winner is declared.
    pub fn evaluate_test(&self, test: &Test) -> TestRunResult {
        match self.try_evaluate(test) {
            Ok(result) => result,
            Err(err) => {
                warn!(test = %test.name, error = %err, "test evaluation failed");
                TestRunResult {
                    error: Some(err.to_string()),
                    ..TestRunResult::new(test, RunStatus::Failed)
                }
            }
        }
    }

    fn try_evaluate(&self, test: &Test) -> Result<TestRunResult> {
        let events = self.repo.get_events(&test.id)?;
        let evaluation = evaluate_with_min_sample(test, &events, self.min_sample);

        let status = match (evaluation.status, evaluation.winner.clone()) {
            (EvaluationStatus::WinnerDeclared, Some(winner)) => {
                let results = TestResults {
                    per_variant_stats: evaluation.per_variant_stats.clone(),
                    winner: winner.clone(),
                    confidence: evaluation.confidence.unwrap_or_default(),
                    z_score: evaluation.z_score.unwrap_or_default(),
                    decided_at: Utc::now(),
                };
                let applied = self.repo.update_test_status(
                    &test.id,
                    TestStatus::Active,
                    TestStatus::Completed,
                    Some(&results),
                )?;
                if applied {
                    info!(
                        test = %test.name,
                        winner = %winner,
                        confidence = results.confidence,
                        "winner declared; test completed"
                    );
                    RunStatus::WinnerDeclared
                } else {
                    debug!(test = %test.name, "test already left active state");
                    RunStatus::AlreadyTransitioned
                }
            }
            (EvaluationStatus::InsufficientData, _) => RunStatus::InsufficientData,
            _ => RunStatus::InProgress,
        };

        Ok(TestRunResult {
            winner: evaluation.winner,
            confidence: evaluation.confidence,
            ..TestRunResult::new(test, status)
        })
    }

    /// `draft -> active`
    pub fn activate(&self, test_name: &str) -> Result<Test> {
        self.operate(test_name, TestStatus::Draft, TestStatus::Active)
    }

    /// `active -> paused`
    pub fn pause(&self, test_name: &str) -> Result<Test> {
        self.operate(test_name, TestStatus::Active, TestStatus::Paused)
    }

    /// `paused -> active`
    pub fn resume(&self, test_name: &str) -> Result<Test> {
        self.operate(test_name, TestStatus::Paused, TestStatus::Active)
    }

    fn operate(&self, test_name: &str, from: TestStatus, to: TestStatus) -> Result<Test> {
        let test = self
            .repo
            .get_test_by_name(test_name)?
            .ok_or_else(|| SplitError::TestNotFound(test_name.to_string()))?;

        let rejected = || SplitError::InvalidTransition {
            test: test.name.clone(),
            from: test.status.to_string(),
            to: to.to_string(),
        };

        if test.status != from || !from.can_transition_to(to) {
            return Err(rejected());
        }
        if to == TestStatus::Active && test.total_weight() <= 0.0 {
            warn!(test = %test.name, "activating test without variant weight; assignment will fail");
        }
        if !self.repo.update_test_status(&test.id, from, to, None)? {
            return Err(rejected());
        }

        info!(test = %test.name, from = %from, to = %to, "test status changed");
        self.repo
            .get_test(&test.id)?
            .ok_or_else(|| SplitError::TestNotFound(test_name.to_string()))
    }
}
