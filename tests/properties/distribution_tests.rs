//! Empirical split checks over seeded random subject ids.

use std::collections::HashMap;

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use splitlab::assignment::{check_audience, select_variant};
use splitlab::core::{AudienceCriteria, SubjectAttributes, Test, TestStatus, Variant};

const SAMPLES: usize = 20_000;
const TOLERANCE: f64 = 0.03;

fn subject_ids(seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..SAMPLES)
        .map(|_| {
            let len = rng.random_range(6..20);
            (&mut rng)
                .sample_iter(Alphanumeric)
                .take(len)
                .map(char::from)
                .collect()
        })
        .collect()
}

fn test_with(weights: &[(&str, f64)]) -> Test {
    let now = Utc::now();
    Test {
        id: "dist".to_string(),
        name: "dist".to_string(),
        description: None,
        status: TestStatus::Active,
        variants: weights
            .iter()
            .map(|(id, w)| Variant::new(*id, *id, *w))
            .collect(),
        audience_criteria: None,
        results: None,
        created_at: now,
        updated_at: now,
    }
}

fn shares(test: &Test, ids: &[String]) -> HashMap<String, f64> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for id in ids {
        let variant = select_variant(test, id).unwrap();
        *counts.entry(variant.id.clone()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(id, n)| (id, n as f64 / ids.len() as f64))
        .collect()
}

#[test]
fn even_split_is_close_to_half() {
    let ids = subject_ids(11);
    let shares = shares(&test_with(&[("a", 1.0), ("b", 1.0)]), &ids);
    println!("[TEST] even split shares: {shares:?}");
    assert!((shares["a"] - 0.5).abs() < TOLERANCE);
    assert!((shares["b"] - 0.5).abs() < TOLERANCE);
}

#[test]
fn weighted_split_tracks_weights() {
    let ids = subject_ids(23);
    let shares = shares(&test_with(&[("a", 1.0), ("b", 3.0)]), &ids);
    println!("[TEST] weighted shares: {shares:?}");
    assert!((shares["a"] - 0.25).abs() < TOLERANCE);
    assert!((shares["b"] - 0.75).abs() < TOLERANCE);
}

#[test]
fn zero_weight_arm_gets_nothing() {
    let ids = subject_ids(5);
    let shares = shares(&test_with(&[("a", 1.0), ("off", 0.0), ("b", 1.0)]), &ids);
    assert!(!shares.contains_key("off"));
    assert!((shares["a"] + shares["b"] - 1.0).abs() < 1e-9);
}

#[test]
fn rollout_percentage_admits_matching_share() {
    let ids = subject_ids(31);
    let audience = AudienceCriteria {
        percentage: 30.0,
        allowed_roles: Vec::new(),
    };
    let attrs = SubjectAttributes::default();
    let admitted = ids
        .iter()
        .filter(|id| check_audience(Some(&audience), id, &attrs).is_none())
        .count();
    let share = admitted as f64 / ids.len() as f64;
    println!("[TEST] admitted share at 30%: {share}");
    assert!((share - 0.30).abs() < TOLERANCE);
}
