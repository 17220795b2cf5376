use chrono::Utc;
use proptest::prelude::*;

use splitlab::core::{Event, EventType, Test, TestStatus, Variant};
use splitlab::stats::{EvaluationStatus, confidence_for_z, evaluate, two_proportion_z};

fn test_with_arms(arms: usize) -> Test {
    let now = Utc::now();
    Test {
        id: "stats-prop".to_string(),
        name: "stats-prop".to_string(),
        description: None,
        status: TestStatus::Active,
        variants: (0..arms)
            .map(|idx| Variant::new(format!("v{idx}"), format!("V{idx}"), 1.0))
            .collect(),
        audience_criteria: None,
        results: None,
        created_at: now,
        updated_at: now,
    }
}

fn events(test: &Test, counts: &[(usize, usize)]) -> Vec<Event> {
    let mut out = Vec::new();
    for (variant, (impressions, conversions)) in test.variants.iter().zip(counts) {
        for i in 0..*impressions {
            out.push(Event::new(&test.id, &variant.id, EventType::Impression, "view", format!("s{i}"), format!("s{i}")));
        }
        for i in 0..*conversions {
            out.push(Event::new(&test.id, &variant.id, EventType::Conversion, "buy", format!("s{i}"), format!("s{i}")));
        }
    }
    out
}

proptest! {
    #[test]
    fn z_is_never_nan(c1 in 0u64..500, n1 in 0u64..500, c2 in 0u64..500, n2 in 0u64..500) {
        let test = two_proportion_z(c1.min(n1), n1, c2.min(n2), n2);
        prop_assert!(test.z.is_finite());
        prop_assert!(test.z >= 0.0);
        prop_assert!(confidence_for_z(test.z) <= 99);
    }

    #[test]
    fn z_is_symmetric(c1 in 0u64..200, n1 in 1u64..200, c2 in 0u64..200, n2 in 1u64..200) {
        let forward = two_proportion_z(c1.min(n1), n1, c2.min(n2), n2);
        let backward = two_proportion_z(c2.min(n2), n2, c1.min(n1), n1);
        prop_assert!((forward.z - backward.z).abs() < 1e-9);
    }

    #[test]
    fn evaluation_is_well_formed(
        counts in prop::collection::vec((0usize..80, 0usize..80), 2..4)
    ) {
        let test = test_with_arms(counts.len());
        let counts: Vec<(usize, usize)> = counts.into_iter().map(|(n, c)| (n, c.min(n))).collect();
        let evaluation = evaluate(&test, &events(&test, &counts));

        prop_assert_eq!(evaluation.per_variant_stats.len(), test.variants.len());
        for stats in &evaluation.per_variant_stats {
            prop_assert!(stats.rate.is_finite());
            prop_assert!((0.0..=1.0).contains(&stats.rate));
        }
        if let Some(z) = evaluation.z_score {
            prop_assert!(z.is_finite());
        }
        match evaluation.status {
            EvaluationStatus::WinnerDeclared => {
                let winner = evaluation.winner.as_deref().unwrap();
                prop_assert!(test.variant(winner).is_some());
                prop_assert!(evaluation.confidence.unwrap() >= 95);
            }
            EvaluationStatus::InsufficientData => {
                prop_assert!(evaluation.winner.is_none());
            }
            EvaluationStatus::InProgress => {}
        }
    }
}
