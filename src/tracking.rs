//! Event tracker: validated, append-only event writes with bounded retry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::TrackingConfig;
use crate::core::{Event, EventType};
use crate::error::{Result, SplitError};
use crate::storage::Repository;

/// How many times a write is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait before attempt `n + 1` is `backoff * n`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&TrackingConfig::default())
    }
}

impl From<&TrackingConfig> for RetryPolicy {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            max_attempts: config.max_write_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// One event to record. Identity fields are optional so that anonymous
/// callers can be detected here rather than papered over upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRequest {
    pub test_id: String,
    pub variant_id: String,
    pub event_type: EventType,
    pub event_name: String,
    pub event_value: Option<f64>,
    pub event_data: Option<serde_json::Value>,
    pub subject_id: Option<String>,
    pub session_id: Option<String>,
}

impl TrackRequest {
    pub fn new(
        test_id: impl Into<String>,
        variant_id: impl Into<String>,
        event_type: EventType,
        event_name: impl Into<String>,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            variant_id: variant_id.into(),
            event_type,
            event_name: event_name.into(),
            event_value: None,
            event_data: None,
            subject_id: None,
            session_id: None,
        }
    }

    #[must_use]
    pub fn subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    #[must_use]
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub const fn value(mut self, value: Option<f64>) -> Self {
        self.event_value = value;
        self
    }

    #[must_use]
    pub fn data(mut self, data: Option<serde_json::Value>) -> Self {
        self.event_data = data;
        self
    }

    /// Subject id falls back to the session id; session scope falls back to
    /// the subject id. `None` when neither is usable.
    fn identity(&self) -> Option<(String, String)> {
        let subject = non_blank(self.subject_id.as_deref());
        let session = non_blank(self.session_id.as_deref());
        let id = subject.or(session)?;
        Some((id.to_string(), session.unwrap_or(id).to_string()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub struct EventTracker {
    repo: Arc<dyn Repository>,
    policy: RetryPolicy,
    lost: AtomicU64,
}

impl std::fmt::Debug for EventTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTracker")
            .field("policy", &self.policy)
            .field("lost", &self.lost_events())
            .finish_non_exhaustive()
    }
}

impl EventTracker {
    pub fn new(repo: Arc<dyn Repository>, policy: RetryPolicy) -> Self {
        Self {
            repo,
            policy,
            lost: AtomicU64::new(0),
        }
    }

    /// Events given up on since this tracker was created.
    pub fn lost_events(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Apply the anonymous-event policy: log the drop and return the error
    /// describing it. Nothing is written.
    pub fn reject_anonymous(test_id: impl Into<String>, event_name: &str) -> SplitError {
        let test_id = test_id.into();
        warn!(
            test_id = %test_id,
            event = event_name,
            "dropping event without user or session identity"
        );
        SplitError::AnonymousSubject { test_id }
    }

    /// Record one event.
    ///
    /// Anonymous requests fail with `AnonymousSubject` and nothing is
    /// written. Transient store failures are retried; when retries run out,
    /// or the store rejects the event outright, the result is
    /// `TelemetryLoss`.
    pub fn record(&self, request: TrackRequest) -> Result<Event> {
        let Some((subject_id, session_id)) = request.identity() else {
            return Err(Self::reject_anonymous(request.test_id, &request.event_name));
        };

        if request.event_value.is_some_and(|v| !v.is_finite()) {
            return Err(SplitError::ValidationFailed(format!(
                "event value for {} must be finite",
                request.event_name
            )));
        }

        let event = Event::new(
            request.test_id,
            request.variant_id,
            request.event_type,
            request.event_name,
            subject_id,
            session_id,
        )
        .with_value(request.event_value)
        .with_data(request.event_data);

        self.write_with_retry(event)
    }

    fn write_with_retry(&self, event: Event) -> Result<Event> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.repo.create_event(event.clone()) {
                Ok(stored) => {
                    debug!(
                        test_id = %stored.test_id,
                        variant = %stored.variant_id,
                        event_type = %stored.event_type,
                        attempt,
                        "recorded event"
                    );
                    return Ok(stored);
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    debug!(test_id = %event.test_id, attempt, error = %err, "event write failed; retrying");
                    let wait = self.policy.backoff * attempt;
                    if !wait.is_zero() {
                        std::thread::sleep(wait);
                    }
                }
                Err(err) => {
                    self.lost.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        test_id = %event.test_id,
                        event_id = %event.id,
                        attempts = attempt,
                        error = %err,
                        "telemetry loss: event not recorded"
                    );
                    return Err(SplitError::TelemetryLoss {
                        test_id: event.test_id,
                        attempts: attempt,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }
}
