//! Audience filtering and weighted deterministic variant selection.

use tracing::{debug, error};

use super::hash::{BUCKETS, bucket};
use crate::core::{AudienceCriteria, SubjectAttributes, Test, TestStatus, Variant};
use crate::error::{Result, SplitError};
use crate::storage::Repository;

/// Result of an assignment request.
///
/// `(None, None)`: no such test, or it is not active.
/// `(None, Some(test))`: the subject was filtered out by the audience.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Assignment {
    pub variant: Option<Variant>,
    pub test: Option<Test>,
}

impl Assignment {
    pub const fn none() -> Self {
        Self {
            variant: None,
            test: None,
        }
    }

    pub const fn is_excluded(&self) -> bool {
        self.variant.is_none() && self.test.is_some()
    }
}

/// Why a subject was kept out of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Bucket fell outside the rollout percentage
    Rollout,
    /// Role not on the allow-list
    Role,
}

/// Apply audience rules in order: rollout percentage, then role allow-list.
pub fn check_audience(
    criteria: Option<&AudienceCriteria>,
    subject_id: &str,
    attributes: &SubjectAttributes,
) -> Option<Exclusion> {
    let criteria = criteria?;

    if criteria.percentage < 100.0 && f64::from(bucket(subject_id)) >= criteria.percentage {
        return Some(Exclusion::Rollout);
    }

    if !criteria.allowed_roles.is_empty() {
        let admitted = attributes
            .role
            .as_deref()
            .is_some_and(|role| criteria.allowed_roles.iter().any(|r| r == role));
        if !admitted {
            return Some(Exclusion::Role);
        }
    }

    None
}

/// Pick the variant for a subject by walking cumulative weights.
///
/// Variants with zero weight are never returned. A zero weight sum is a
/// configuration error.
pub fn select_variant<'a>(test: &'a Test, subject_id: &str) -> Result<&'a Variant> {
    let total = test.total_weight();
    if !(total > 0.0 && total.is_finite()) {
        error!(test = %test.name, total, "active test has no variant weight");
        return Err(SplitError::ZeroWeight {
            test: test.name.clone(),
        });
    }

    let target = f64::from(bucket(subject_id)) / f64::from(BUCKETS) * total;
    let mut cumulative = 0.0;
    for variant in &test.variants {
        if variant.weight <= 0.0 {
            continue;
        }
        cumulative += variant.weight;
        if cumulative >= target {
            return Ok(variant);
        }
    }

    // Float drift near the top of the range lands on the last eligible arm.
    test.variants
        .iter()
        .rev()
        .find(|v| v.weight > 0.0)
        .ok_or_else(|| SplitError::ZeroWeight {
            test: test.name.clone(),
        })
}

/// Assign against an already loaded test definition.
pub fn assign_loaded(
    test: Test,
    subject_id: &str,
    attributes: &SubjectAttributes,
) -> Result<Assignment> {
    if test.status != TestStatus::Active {
        debug!(test = %test.name, status = %test.status, "test not active");
        return Ok(Assignment::none());
    }

    if let Some(reason) = check_audience(test.audience_criteria.as_ref(), subject_id, attributes) {
        debug!(test = %test.name, subject = subject_id, ?reason, "subject excluded");
        return Ok(Assignment {
            variant: None,
            test: Some(test),
        });
    }

    let variant = select_variant(&test, subject_id)?.clone();
    debug!(test = %test.name, subject = subject_id, variant = %variant.id, "assigned");
    Ok(Assignment {
        variant: Some(variant),
        test: Some(test),
    })
}

/// Look up `test_name` and assign `subject_id` to one of its variants.
///
/// Unknown or inactive tests are a soft no-op.
pub fn assign(
    repo: &dyn Repository,
    test_name: &str,
    subject_id: &str,
    attributes: &SubjectAttributes,
) -> Result<Assignment> {
    match repo.get_test_by_name(test_name)? {
        Some(test) => assign_loaded(test, subject_id, attributes),
        None => {
            debug!(test = test_name, "no such test");
            Ok(Assignment::none())
        }
    }
}
