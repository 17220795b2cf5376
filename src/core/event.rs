//! Behavioral events recorded against a test variant.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SplitError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Subject was shown a variant
    Impression,
    /// Subject completed the target action
    Conversion,
    /// Any other tracked behavior
    Interaction,
}

impl EventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Impression => "impression",
            Self::Conversion => "conversion",
            Self::Interaction => "interaction",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = SplitError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "impression" => Ok(Self::Impression),
            "conversion" => Ok(Self::Conversion),
            "interaction" => Ok(Self::Interaction),
            other => Err(SplitError::ValidationFailed(format!(
                "unknown event type: {other} (expected impression|conversion|interaction)"
            ))),
        }
    }
}

/// An immutable event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub test_id: String,
    pub variant_id: String,
    pub subject_id: String,
    pub event_type: EventType,
    pub event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<serde_json::Value>,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Build a fresh event with a new id and the current time.
    pub fn new(
        test_id: impl Into<String>,
        variant_id: impl Into<String>,
        event_type: EventType,
        event_name: impl Into<String>,
        subject_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            test_id: test_id.into(),
            variant_id: variant_id.into(),
            subject_id: subject_id.into(),
            event_type,
            event_name: event_name.into(),
            event_value: None,
            event_data: None,
            session_id: session_id.into(),
            timestamp: crate::storage::now(),
        }
    }

    #[must_use]
    pub const fn with_value(mut self, value: Option<f64>) -> Self {
        self.event_value = value;
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Option<serde_json::Value>) -> Self {
        self.event_data = data;
        self
    }
}
