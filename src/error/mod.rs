//! Error handling for splitlab.
//!
//! This module provides:
//! - [`SplitError`]: The main error enum for all engine operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Rich error type with suggestion and context

mod codes;

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use codes::ErrorCode;

/// Main error type for splitlab operations.
#[derive(Error, Debug)]
pub enum SplitError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Test not found: {0}")]
    TestNotFound(String),

    #[error("Test already exists: {0}")]
    TestAlreadyExists(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Test '{test}' has variants whose weights sum to zero")]
    ZeroWeight { test: String },

    #[error("Cannot move test '{test}' from {from} to {to}")]
    InvalidTransition {
        test: String,
        from: String,
        to: String,
    },

    #[error("Event for test '{test_id}' has no user or session identity")]
    AnonymousSubject { test_id: String },

    #[error("Event for test '{test_id}' lost after {attempts} write attempts: {reason}")]
    TelemetryLoss {
        test_id: String,
        attempts: u32,
        reason: String,
    },

    #[error("Lifecycle evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl SplitError {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) | Self::Serialization(_) => ErrorCode::SerializationError,
            Self::TestNotFound(_) => ErrorCode::TestNotFound,
            Self::TestAlreadyExists(_) => ErrorCode::TestAlreadyExists,
            Self::ValidationFailed(_) => ErrorCode::ValidationFailed,
            Self::ZeroWeight { .. } => ErrorCode::ZeroWeight,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::AnonymousSubject { .. } => ErrorCode::AnonymousSubject,
            Self::TelemetryLoss { .. } => ErrorCode::TelemetryLoss,
            Self::EvaluationFailed(_) => ErrorCode::EvaluationFailed,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::MissingConfig(_) => ErrorCode::ConfigMissingRequired,
            Self::Storage(_) => ErrorCode::StorageCorrupted,
            Self::Timeout(_) => ErrorCode::Timeout,
        }
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::TestNotFound(name) | Self::TestAlreadyExists(name) => {
                Some(serde_json::json!({ "test": name }))
            }
            Self::ZeroWeight { test } => Some(serde_json::json!({ "test": test })),
            Self::InvalidTransition { test, from, to } => {
                Some(serde_json::json!({ "test": test, "from": from, "to": to }))
            }
            Self::AnonymousSubject { test_id } => Some(serde_json::json!({ "test_id": test_id })),
            Self::TelemetryLoss {
                test_id, attempts, ..
            } => Some(serde_json::json!({ "test_id": test_id, "attempts": attempts })),
            Self::MissingConfig(key) => Some(serde_json::json!({ "config_key": key })),
            _ => None,
        }
    }

    /// Whether a retry of the same store call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Self::Io(_) | Self::Timeout(_) => true,
            _ => false,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
///
/// Emitted in robot mode so scripts can branch on `code` instead of
/// parsing messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "TEST_NOT_FOUND")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 101)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable by the user
    pub recoverable: bool,

    /// Error category (e.g., "test", "config", "storage")
    pub category: String,
}

impl StructuredError {
    /// Create a new structured error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            numeric_code: code.numeric(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
            code,
            message: message.into(),
        }
    }

    /// Create a structured error from a [`SplitError`].
    #[must_use]
    pub fn from_error(err: &SplitError) -> Self {
        let mut structured = Self::new(err.code(), err.to_string());
        structured.context = err.context();
        structured
    }

    /// Add context to this error.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Set a custom suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<SplitError> for StructuredError {
    fn from(err: SplitError) -> Self {
        Self::from_error(&err)
    }
}

impl From<&SplitError> for StructuredError {
    fn from(err: &SplitError) -> Self {
        Self::from_error(err)
    }
}

/// Result type alias using [`SplitError`].
pub type Result<T> = std::result::Result<T, SplitError>;
