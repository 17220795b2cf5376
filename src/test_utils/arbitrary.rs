use proptest::prelude::*;

use crate::core::{AudienceCriteria, TestStatus, Variant};

pub fn arb_status() -> impl Strategy<Value = TestStatus> {
    prop_oneof![
        Just(TestStatus::Draft),
        Just(TestStatus::Active),
        Just(TestStatus::Paused),
        Just(TestStatus::Completed),
    ]
}

/// 1..6 variants with unique ids and at least one positive weight.
pub fn arb_variants() -> impl Strategy<Value = Vec<Variant>> {
    prop::collection::vec(0.0f64..10.0, 1..6)
        .prop_filter("needs positive mass", |weights| {
            weights.iter().any(|w| *w > 0.0)
        })
        .prop_map(|weights| {
            weights
                .into_iter()
                .enumerate()
                .map(|(idx, weight)| Variant::new(format!("v{idx}"), format!("Variant {idx}"), weight))
                .collect()
        })
}

pub fn arb_audience() -> impl Strategy<Value = AudienceCriteria> {
    (
        0.0f64..=100.0,
        prop::collection::vec("[a-z]{3,8}", 0..3),
    )
        .prop_map(|(percentage, allowed_roles)| AudienceCriteria {
            percentage,
            allowed_roles,
        })
}

pub fn arb_subject_id() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_@.:-]{1,40}"
}

mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_variants_are_valid(variants in arb_variants()) {
            let test = crate::core::NewTest::new("generated", variants);
            prop_assert!(test.validate().is_ok());
        }

        #[test]
        fn generated_audience_is_valid(audience in arb_audience()) {
            prop_assert!((0.0..=100.0).contains(&audience.percentage));
        }

        #[test]
        fn completed_is_absorbing(next in arb_status()) {
            prop_assert!(!TestStatus::Completed.can_transition_to(next));
        }
    }
}
