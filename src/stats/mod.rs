//! Statistics engine: per-variant aggregation and the two-proportion Z-test
//! that decides whether a test has a winner.
//!
//! Only the best and runner-up variants (by conversion rate) are compared.
//! Variants below [`MIN_SAMPLE`] impressions do not take part.

pub mod normal;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Event, EventType, Test};

pub use normal::{erf, normal_cdf, two_tailed_confidence};

/// Minimum impressions before a variant is compared.
pub const MIN_SAMPLE: u64 = 30;

/// Two-tailed critical values (99%, 95%, 90%).
pub const Z_99: f64 = 2.576;
pub const Z_95: f64 = 1.96;
pub const Z_90: f64 = 1.645;

/// Confidence required, alongside `z > Z_95`, to declare a winner.
pub const DECISION_CONFIDENCE: u8 = 95;

/// Aggregated counts for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantStats {
    pub variant_id: String,
    pub variant_name: String,
    pub impressions: u64,
    pub conversions: u64,
    pub interactions: u64,
    /// Sum of `event_value` over conversions
    pub conversion_value: f64,
    /// `conversions / impressions`, 0 without impressions
    pub rate: f64,
}

impl VariantStats {
    fn empty(variant_id: &str, variant_name: &str) -> Self {
        Self {
            variant_id: variant_id.to_string(),
            variant_name: variant_name.to_string(),
            impressions: 0,
            conversions: 0,
            interactions: 0,
            conversion_value: 0.0,
            rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    /// Fewer than two variants reached the minimum sample
    InsufficientData,
    /// Comparable, but the difference is not significant yet
    InProgress,
    /// Best variant beats the runner-up significantly
    WinnerDeclared,
}

impl EvaluationStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient_data",
            Self::InProgress => "in_progress",
            Self::WinnerDeclared => "winner_declared",
        }
    }
}

/// Outcome of evaluating one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub status: EvaluationStatus,
    /// One entry per variant, in stored order
    pub per_variant_stats: Vec<VariantStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_score: Option<f64>,
    /// Events whose variant id is not part of the test
    pub ignored_events: u64,
}

/// Result of comparing two proportions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZTest {
    pub pooled: f64,
    pub standard_error: f64,
    /// `|p1 - p2| / se`; 0 when `se == 0`
    pub z: f64,
}

impl ZTest {
    /// Zero variance means the proportions cannot be told apart.
    pub fn is_degenerate(&self) -> bool {
        self.standard_error == 0.0
    }
}

/// Pooled two-proportion Z-test for `c1/n1` against `c2/n2`.
///
/// Never divides by zero: an empty sample or zero standard error yields
/// `z = 0`.
pub fn two_proportion_z(c1: u64, n1: u64, c2: u64, n2: u64) -> ZTest {
    if n1 == 0 || n2 == 0 {
        return ZTest {
            pooled: 0.0,
            standard_error: 0.0,
            z: 0.0,
        };
    }
    let (c1, n1, c2, n2) = (c1 as f64, n1 as f64, c2 as f64, n2 as f64);
    let p1 = c1 / n1;
    let p2 = c2 / n2;
    let pooled = (c1 + c2) / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    if se == 0.0 || !se.is_finite() {
        return ZTest {
            pooled,
            standard_error: 0.0,
            z: 0.0,
        };
    }
    ZTest {
        pooled,
        standard_error: se,
        z: (p1 - p2).abs() / se,
    }
}

/// Map a Z statistic to a two-tailed confidence percentage.
pub fn confidence_for_z(z: f64) -> u8 {
    if z > Z_99 {
        99
    } else if z > Z_95 {
        95
    } else if z > Z_90 {
        90
    } else {
        let raw = two_tailed_confidence(z).round().clamp(0.0, 99.0);
        raw as u8
    }
}

/// Aggregate events per variant, in the test's stored variant order.
pub fn aggregate(test: &Test, events: &[Event]) -> (Vec<VariantStats>, u64) {
    let mut stats: Vec<VariantStats> = test
        .variants
        .iter()
        .map(|v| VariantStats::empty(&v.id, &v.name))
        .collect();
    let index: HashMap<&str, usize> = test
        .variants
        .iter()
        .enumerate()
        .map(|(idx, v)| (v.id.as_str(), idx))
        .collect();

    let mut ignored = 0u64;
    for event in events {
        let Some(&idx) = index.get(event.variant_id.as_str()) else {
            ignored += 1;
            continue;
        };
        let entry = &mut stats[idx];
        match event.event_type {
            EventType::Impression => entry.impressions += 1,
            EventType::Conversion => {
                entry.conversions += 1;
                entry.conversion_value += event.event_value.unwrap_or(0.0);
            }
            EventType::Interaction => entry.interactions += 1,
        }
    }

    for entry in &mut stats {
        entry.rate = if entry.impressions == 0 {
            0.0
        } else {
            entry.conversions as f64 / entry.impressions as f64
        };
    }

    if ignored > 0 {
        debug!(test = %test.name, ignored, "events reference unknown variants");
    }
    (stats, ignored)
}

/// Evaluate a test against its events with the default minimum sample.
pub fn evaluate(test: &Test, events: &[Event]) -> Evaluation {
    evaluate_with_min_sample(test, events, MIN_SAMPLE)
}

/// Evaluate a test, excluding variants below `min_sample` impressions.
pub fn evaluate_with_min_sample(test: &Test, events: &[Event], min_sample: u64) -> Evaluation {
    let (per_variant_stats, ignored_events) = aggregate(test, events);

    let mut qualifying: Vec<&VariantStats> = per_variant_stats
        .iter()
        .filter(|s| s.impressions >= min_sample)
        .collect();

    if qualifying.len() < 2 {
        return Evaluation {
            status: EvaluationStatus::InsufficientData,
            per_variant_stats,
            winner: None,
            confidence: None,
            z_score: None,
            ignored_events,
        };
    }

    // Stable sort: stored order breaks rate ties.
    qualifying.sort_by(|a, b| b.rate.total_cmp(&a.rate));
    let best = qualifying[0];
    let runner_up = qualifying[1];

    let test_result = two_proportion_z(
        best.conversions,
        best.impressions,
        runner_up.conversions,
        runner_up.impressions,
    );
    let confidence = if test_result.is_degenerate() {
        0
    } else {
        confidence_for_z(test_result.z)
    };
    let significant = !test_result.is_degenerate()
        && test_result.z > Z_95
        && confidence >= DECISION_CONFIDENCE;

    debug!(
        test = %test.name,
        best = %best.variant_id,
        runner_up = %runner_up.variant_id,
        z = test_result.z,
        confidence,
        significant,
        "evaluated test"
    );

    let winner = significant.then(|| best.variant_id.clone());
    Evaluation {
        status: if significant {
            EvaluationStatus::WinnerDeclared
        } else {
            EvaluationStatus::InProgress
        },
        per_variant_stats,
        winner,
        confidence: Some(confidence),
        z_score: Some(test_result.z),
        ignored_events,
    }
}
