use chrono::Utc;
use proptest::prelude::*;

use splitlab::assignment::{BUCKETS, Exclusion, bucket, check_audience, select_variant};
use splitlab::core::{AudienceCriteria, SubjectAttributes, Test, TestStatus, Variant};

fn arb_variants() -> impl Strategy<Value = Vec<Variant>> {
    prop::collection::vec(0.0f64..10.0, 1..6)
        .prop_filter("needs positive mass", |weights| {
            weights.iter().any(|w| *w > 0.0)
        })
        .prop_map(|weights| {
            weights
                .into_iter()
                .enumerate()
                .map(|(idx, weight)| Variant::new(format!("v{idx}"), format!("V{idx}"), weight))
                .collect()
        })
}

fn arb_subject_id() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_@.:-]{1,40}"
}

fn active_test(variants: Vec<Variant>) -> Test {
    let now = Utc::now();
    Test {
        id: "prop-test".to_string(),
        name: "prop".to_string(),
        description: None,
        status: TestStatus::Active,
        variants,
        audience_criteria: None,
        results: None,
        created_at: now,
        updated_at: now,
    }
}

proptest! {
    #[test]
    fn bucket_is_in_range(subject in ".{0,64}") {
        prop_assert!(bucket(&subject) < BUCKETS);
    }

    #[test]
    fn same_subject_same_variant(variants in arb_variants(), subject in arb_subject_id()) {
        let first = active_test(variants.clone());
        let second = active_test(variants);
        let a = select_variant(&first, &subject).unwrap().id.clone();
        let b = select_variant(&second, &subject).unwrap().id.clone();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn zero_weight_variants_are_never_chosen(variants in arb_variants(), subject in arb_subject_id()) {
        let test = active_test(variants);
        let chosen = select_variant(&test, &subject).unwrap();
        prop_assert!(chosen.weight > 0.0);
    }

    #[test]
    fn full_rollout_without_roles_admits_everyone(subject in arb_subject_id()) {
        let audience = AudienceCriteria::default();
        prop_assert_eq!(
            check_audience(Some(&audience), &subject, &SubjectAttributes::default()),
            None
        );
    }

    #[test]
    fn zero_rollout_excludes_everyone(subject in arb_subject_id()) {
        let audience = AudienceCriteria { percentage: 0.0, allowed_roles: Vec::new() };
        prop_assert_eq!(
            check_audience(Some(&audience), &subject, &SubjectAttributes::default()),
            Some(Exclusion::Rollout)
        );
    }

    #[test]
    fn rollout_admits_exactly_low_buckets(subject in arb_subject_id(), pct in 0u32..=100) {
        let audience = AudienceCriteria { percentage: f64::from(pct), allowed_roles: Vec::new() };
        let excluded = check_audience(Some(&audience), &subject, &SubjectAttributes::default()).is_some();
        prop_assert_eq!(excluded, bucket(&subject) >= pct);
    }

    #[test]
    fn unlisted_role_is_excluded(subject in arb_subject_id(), role in "[a-z]{3,8}") {
        let audience = AudienceCriteria {
            percentage: 100.0,
            allowed_roles: vec!["staff".to_string()],
        };
        let attrs = SubjectAttributes::with_role(format!("x{role}"));
        prop_assert_eq!(check_audience(Some(&audience), &subject, &attrs), Some(Exclusion::Role));
    }
}
