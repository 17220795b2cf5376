//! Caller-facing experiment API.
//!
//! Ties the assignment engine, event tracker, statistics and lifecycle
//! controller to one repository. Assignment and tracking never surface
//! store trouble to the end user; configuration errors do.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::assignment::{self, CachedAssignment, SessionAssignments};
use crate::config::Config;
use crate::core::{Event, EventType, NewTest, SubjectContext, Test, TestStatus, Variant};
use crate::error::{Result, SplitError};
use crate::lifecycle::{LifecycleController, RunSummary};
use crate::stats::{Evaluation, evaluate_with_min_sample};
use crate::storage::Repository;
use crate::tracking::{EventTracker, RetryPolicy, TrackRequest};

/// Why `track_event` did not record anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    UnknownTest,
    /// Subject has no variant: test inactive or audience excluded
    NotAssigned,
    AnonymousSubject,
    InvalidEvent,
    TelemetryLoss,
}

impl DropReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownTest => "unknown_test",
            Self::NotAssigned => "not_assigned",
            Self::AnonymousSubject => "anonymous_subject",
            Self::InvalidEvent => "invalid_event",
            Self::TelemetryLoss => "telemetry_loss",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    Recorded(Event),
    Dropped { reason: DropReason, detail: String },
}

impl TrackOutcome {
    fn dropped(reason: DropReason, detail: impl Into<String>) -> Self {
        Self::Dropped {
            reason,
            detail: detail.into(),
        }
    }

    pub const fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }
}

/// Event payload for [`ExperimentService::track_event`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEvent {
    pub event_type: EventType,
    pub event_name: String,
    pub value: Option<f64>,
    pub data: Option<serde_json::Value>,
}

impl TrackedEvent {
    pub fn new(event_type: EventType, event_name: impl Into<String>) -> Self {
        Self {
            event_type,
            event_name: event_name.into(),
            value: None,
            data: None,
        }
    }

    pub fn conversion(event_name: impl Into<String>) -> Self {
        Self::new(EventType::Conversion, event_name)
    }

    #[must_use]
    pub const fn with_value(mut self, value: Option<f64>) -> Self {
        self.value = value;
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Option<serde_json::Value>) -> Self {
        self.data = data;
        self
    }
}

pub struct ExperimentService {
    repo: Arc<dyn Repository>,
    tracker: EventTracker,
    controller: LifecycleController,
    min_sample: u64,
}

impl std::fmt::Debug for ExperimentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentService")
            .field("tracker", &self.tracker)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

impl ExperimentService {
    pub fn new(repo: Arc<dyn Repository>, config: &Config) -> Self {
        Self {
            tracker: EventTracker::new(Arc::clone(&repo), RetryPolicy::from(&config.tracking)),
            controller: LifecycleController::new(Arc::clone(&repo), &config.lifecycle),
            min_sample: config.lifecycle.min_sample.max(1),
            repo,
        }
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    pub const fn tracker(&self) -> &EventTracker {
        &self.tracker
    }

    pub const fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    /// Variant to show this subject, or `None` for the default experience.
    ///
    /// The test is looked up on every call, so a paused or completed test
    /// stops serving variants at once. The first assignment of a subject in
    /// a session records an impression; later calls in the same session
    /// record nothing.
    pub fn assign_variant(
        &self,
        session: &mut SessionAssignments,
        test_name: &str,
        context: &SubjectContext,
    ) -> Result<Option<Variant>> {
        let Some(subject) = context.resolve() else {
            debug!(test = test_name, "no subject identity; serving default");
            return Ok(None);
        };

        let assignment = assignment::assign(
            self.repo.as_ref(),
            test_name,
            &subject.id,
            &context.attributes,
        )?;
        let Some(test) = assignment.test else {
            // Missing or no longer active.
            session.invalidate(test_name);
            return Ok(None);
        };

        let first = session.insert(
            test_name,
            CachedAssignment {
                test_id: test.id.clone(),
                subject_id: subject.id.clone(),
                variant: assignment.variant.clone(),
            },
        );

        if let (true, Some(variant)) = (first, assignment.variant.as_ref()) {
            let impression = TrackRequest::new(&test.id, &variant.id, EventType::Impression, "impression")
                .subject(&subject.id)
                .session(&subject.session_id);
            // Failures are logged by the tracker; the caller still gets its variant.
            let _ = self.tracker.record(impression);
        }

        Ok(assignment.variant)
    }

    /// Record a behavior for the subject's assigned variant.
    pub fn track_event(
        &self,
        session: &SessionAssignments,
        test_name: &str,
        event: TrackedEvent,
        context: &SubjectContext,
    ) -> TrackOutcome {
        let test = match self.repo.get_test_by_name(test_name) {
            Ok(Some(test)) => test,
            Ok(None) => return TrackOutcome::dropped(DropReason::UnknownTest, test_name),
            Err(err) => {
                warn!(test = test_name, error = %err, "test lookup failed; event dropped");
                return TrackOutcome::dropped(DropReason::TelemetryLoss, err.to_string());
            }
        };

        if test.status != TestStatus::Active {
            debug!(test = test_name, status = %test.status, "test not active; event dropped");
            return TrackOutcome::dropped(
                DropReason::NotAssigned,
                format!("{test_name} is {}", test.status),
            );
        }

        let Some(subject) = context.resolve() else {
            let err = EventTracker::reject_anonymous(&test.id, &event.event_name);
            return TrackOutcome::dropped(DropReason::AnonymousSubject, err.to_string());
        };

        let variant = match session.get(test_name, &subject.id) {
            Some(cached) => cached.variant.clone(),
            None => match assignment::assign_loaded(test.clone(), &subject.id, &context.attributes)
            {
                Ok(assignment) => assignment.variant,
                Err(err) => {
                    warn!(test = test_name, error = %err, "cannot resolve variant; event dropped");
                    return TrackOutcome::dropped(DropReason::NotAssigned, err.to_string());
                }
            },
        };
        let Some(variant) = variant else {
            return TrackOutcome::dropped(DropReason::NotAssigned, test_name);
        };

        let request = TrackRequest::new(&test.id, &variant.id, event.event_type, event.event_name)
            .subject(&subject.id)
            .session(&subject.session_id)
            .value(event.value)
            .data(event.data);

        match self.tracker.record(request) {
            Ok(recorded) => TrackOutcome::Recorded(recorded),
            Err(err @ SplitError::ValidationFailed(_)) => {
                TrackOutcome::dropped(DropReason::InvalidEvent, err.to_string())
            }
            Err(err @ SplitError::AnonymousSubject { .. }) => {
                TrackOutcome::dropped(DropReason::AnonymousSubject, err.to_string())
            }
            Err(err) => TrackOutcome::dropped(DropReason::TelemetryLoss, err.to_string()),
        }
    }

    /// Evaluate all active tests, completing any with a significant winner.
    pub fn run_lifecycle_evaluation(&self) -> Result<RunSummary> {
        self.controller.run()
    }

    /// Current statistics for a test, without changing it.
    pub fn evaluate_test(&self, test_name: &str) -> Result<(Test, Evaluation)> {
        let test = self.require_test(test_name)?;
        let events = self.repo.get_events(&test.id)?;
        let evaluation = evaluate_with_min_sample(&test, &events, self.min_sample);
        Ok((test, evaluation))
    }

    pub fn create_test(&self, new_test: NewTest) -> Result<Test> {
        self.repo.create_test(new_test)
    }

    pub fn require_test(&self, test_name: &str) -> Result<Test> {
        self.repo
            .get_test_by_name(test_name)?
            .ok_or_else(|| SplitError::TestNotFound(test_name.to_string()))
    }

    pub fn list_tests(
        &self,
        status: Option<TestStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Test>> {
        self.repo.list_tests(status, limit, offset)
    }

    pub fn activate(&self, test_name: &str) -> Result<Test> {
        self.controller.activate(test_name)
    }

    pub fn pause(&self, test_name: &str) -> Result<Test> {
        self.controller.pause(test_name)
    }

    pub fn resume(&self, test_name: &str) -> Result<Test> {
        self.controller.resume(test_name)
    }
}
