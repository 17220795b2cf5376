//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Test registry errors
//! - 2xx: Assignment errors
//! - 3xx: Config errors
//! - 4xx: Tracking errors
//! - 5xx: Lifecycle errors
//! - 6xx: Storage errors
//! - 8xx: Validation errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for robot mode output.
///
/// Each variant maps to a numeric code (e.g., `TestNotFound` -> E101).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Test registry errors (1xx)
    // ========================================
    /// E101: No test with the requested name or id
    TestNotFound,
    /// E102: A test with the same name already exists
    TestAlreadyExists,
    /// E103: Requested status change is not allowed from the current status
    InvalidTransition,

    // ========================================
    // Assignment errors (2xx)
    // ========================================
    /// E201: Active test has variants whose weights sum to zero
    ZeroWeight,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E302: Config file has invalid syntax or values
    ConfigInvalid,
    /// E304: Required config value is missing
    ConfigMissingRequired,

    // ========================================
    // Tracking errors (4xx)
    // ========================================
    /// E401: Event has no resolvable subject identity
    AnonymousSubject,
    /// E402: Event could not be persisted after bounded retries
    TelemetryLoss,

    // ========================================
    // Lifecycle errors (5xx)
    // ========================================
    /// E501: One or more tests could not be evaluated in a run
    EvaluationFailed,

    // ========================================
    // Storage errors (6xx)
    // ========================================
    /// E604: Database operation failed
    DatabaseError,
    /// E605: Serialization/deserialization failed
    SerializationError,
    /// E606: Stored data does not match the expected shape
    StorageCorrupted,

    // ========================================
    // Validation errors (8xx)
    // ========================================
    /// E801: Validation rules failed
    ValidationFailed,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    /// E903: Operation timed out
    Timeout,
    /// E906: IO operation failed
    IoError,
}

impl ErrorCode {
    /// Get the numeric error code (e.g., `TestNotFound` -> 101).
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::TestNotFound => 101,
            Self::TestAlreadyExists => 102,
            Self::InvalidTransition => 103,

            Self::ZeroWeight => 201,

            Self::ConfigInvalid => 302,
            Self::ConfigMissingRequired => 304,

            Self::AnonymousSubject => 401,
            Self::TelemetryLoss => 402,

            Self::EvaluationFailed => 501,

            Self::DatabaseError => 604,
            Self::SerializationError => 605,
            Self::StorageCorrupted => 606,

            Self::ValidationFailed => 801,

            Self::Timeout => 903,
            Self::IoError => 906,
        }
    }

    /// Category name used in structured output.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::TestNotFound | Self::TestAlreadyExists | Self::InvalidTransition => "test",
            Self::ZeroWeight => "assignment",
            Self::ConfigInvalid | Self::ConfigMissingRequired => "config",
            Self::AnonymousSubject | Self::TelemetryLoss => "tracking",
            Self::EvaluationFailed => "lifecycle",
            Self::DatabaseError | Self::SerializationError | Self::StorageCorrupted => "storage",
            Self::ValidationFailed => "validation",
            Self::Timeout | Self::IoError => "internal",
        }
    }

    /// Whether the caller can reasonably fix the condition and retry.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::StorageCorrupted | Self::SerializationError | Self::IoError
        )
    }

    /// Static recovery hint.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::TestNotFound => "Run `splitlab test list` to see registered tests",
            Self::TestAlreadyExists => "Pick a different test name; names are unique",
            Self::InvalidTransition => {
                "Check the test status with `splitlab test show`; completed tests are final"
            }
            Self::ZeroWeight => "Give at least one variant a positive weight",
            Self::ConfigInvalid => "Fix the value in config.toml or the SPLITLAB_* variable",
            Self::ConfigMissingRequired => "Set the missing value in config.toml",
            Self::AnonymousSubject => "Pass --user or --session so the event has an identity",
            Self::TelemetryLoss => "Check that the database is writable and not locked",
            Self::EvaluationFailed => "Rerun `splitlab evaluate -v` to see which tests failed",
            Self::DatabaseError => "Check the database path and permissions",
            Self::SerializationError => "The stored payload is malformed; inspect the record",
            Self::StorageCorrupted => "Inspect the database; stored rows failed validation",
            Self::ValidationFailed => "Fix the reported input and retry",
            Self::Timeout => "The store did not answer in time; retry later",
            Self::IoError => "Check file permissions and disk space",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}", self.numeric())
    }
}
