//! Test and variant definitions.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SplitError};
use crate::stats::VariantStats;

/// Lifecycle status of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Being configured; no assignment
    Draft,
    /// Assigning subjects and collecting events
    Active,
    /// Stopped by an operator; no assignment
    Paused,
    /// Winner declared; terminal
    Completed,
}

impl TestStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    /// `completed` is absorbing.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Allowed edges of the lifecycle state machine.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Active)
                | (Self::Active, Self::Paused)
                | (Self::Paused, Self::Active)
                | (Self::Active, Self::Completed)
        )
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = SplitError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            other => Err(SplitError::ValidationFailed(format!(
                "unknown test status: {other} (expected draft|active|paused|completed)"
            ))),
        }
    }
}

/// One arm of a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub name: String,
    /// Relative probability mass; never negative.
    pub weight: f64,
}

impl Variant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            weight,
        }
    }
}

/// Rules that exclude subjects before bucketing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudienceCriteria {
    /// Share of subjects admitted, in `[0, 100]`.
    #[serde(default = "full_rollout")]
    pub percentage: f64,
    /// Empty means every role is admitted.
    #[serde(default)]
    pub allowed_roles: Vec<String>,
}

const fn full_rollout() -> f64 {
    100.0
}

impl Default for AudienceCriteria {
    fn default() -> Self {
        Self {
            percentage: full_rollout(),
            allowed_roles: Vec::new(),
        }
    }
}

/// Decision written back when a test completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    pub per_variant_stats: Vec<VariantStats>,
    /// Winning variant id
    pub winner: String,
    pub confidence: u8,
    pub z_score: f64,
    pub decided_at: DateTime<Utc>,
}

/// A stored test definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TestStatus,
    /// Stored order is significant for bucketing.
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub audience_criteria: Option<AudienceCriteria>,
    #[serde(default)]
    pub results: Option<TestResults>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Test {
    pub fn total_weight(&self) -> f64 {
        self.variants.iter().map(|v| v.weight).sum()
    }

    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }
}

/// Input for registering a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub audience_criteria: Option<AudienceCriteria>,
}

impl NewTest {
    pub fn new(name: impl Into<String>, variants: Vec<Variant>) -> Self {
        Self {
            name: name.into(),
            description: None,
            variants,
            audience_criteria: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: AudienceCriteria) -> Self {
        self.audience_criteria = Some(audience);
        self
    }

    /// Reject definitions the engine could never serve.
    ///
    /// A zero weight sum is allowed here; it is refused at assignment time
    /// once the test is active.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SplitError::ValidationFailed(
                "test name cannot be empty".to_string(),
            ));
        }
        if self.name.trim() != self.name {
            return Err(SplitError::ValidationFailed(format!(
                "test name has leading or trailing whitespace: {:?}",
                self.name
            )));
        }
        if self.variants.is_empty() {
            return Err(SplitError::ValidationFailed(
                "at least one variant is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            if variant.id.trim().is_empty() {
                return Err(SplitError::ValidationFailed(
                    "variant id cannot be empty".to_string(),
                ));
            }
            if !seen.insert(variant.id.as_str()) {
                return Err(SplitError::ValidationFailed(format!(
                    "duplicate variant id: {}",
                    variant.id
                )));
            }
            if !variant.weight.is_finite() || variant.weight < 0.0 {
                return Err(SplitError::ValidationFailed(format!(
                    "weight must be a finite value >= 0 for {}",
                    variant.id
                )));
            }
        }

        if let Some(audience) = &self.audience_criteria {
            if !(0.0..=100.0).contains(&audience.percentage) {
                return Err(SplitError::ValidationFailed(format!(
                    "audience percentage must be within [0, 100], got {}",
                    audience.percentage
                )));
            }
        }

        Ok(())
    }
}
