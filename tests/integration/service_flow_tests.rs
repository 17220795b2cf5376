use std::sync::Arc;

use splitlab::assignment::SessionAssignments;
use splitlab::config::Config;
use splitlab::core::{AudienceCriteria, EventType, NewTest, SubjectContext, TestStatus, Variant};
use splitlab::error::SplitError;
use splitlab::service::{DropReason, ExperimentService, TrackOutcome, TrackedEvent};
use splitlab::stats::EvaluationStatus;
use splitlab::storage::Repository;
use splitlab::test_utils::fixtures::StoreFixture;
use splitlab::test_utils::logging::init_test_tracing;

fn sqlite_service(fixture: &StoreFixture) -> ExperimentService {
    let repo: Arc<dyn Repository> = Arc::new(fixture.second_connection());
    ExperimentService::new(repo, &Config::default())
}

#[test]
fn full_experiment_flow_on_sqlite() {
    init_test_tracing();
    let fixture = StoreFixture::new();
    let service = sqlite_service(&fixture);

    service
        .create_test(NewTest::new(
            "checkout",
            vec![
                Variant::new("control", "Control", 1.0),
                Variant::new("express", "Express", 1.0),
            ],
        ))
        .unwrap();
    service.activate("checkout").unwrap();

    let mut assigned = 0;
    for idx in 0..400 {
        let user = format!("user-{idx}");
        let ctx = SubjectContext::user(&user).with_session(format!("sess-{idx}"));
        let mut session = SessionAssignments::new(format!("sess-{idx}"));
        let variant = service
            .assign_variant(&mut session, "checkout", &ctx)
            .unwrap()
            .expect("full rollout assigns everyone");
        assigned += 1;

        // Express converts every time, control never does.
        if variant.id == "express" {
            let outcome = service.track_event(
                &session,
                "checkout",
                TrackedEvent::conversion("purchase").with_value(Some(20.0)),
                &ctx,
            );
            assert!(outcome.is_recorded());
        }
    }
    assert_eq!(assigned, 400);

    let (_, evaluation) = service.evaluate_test("checkout").unwrap();
    assert_eq!(evaluation.status, EvaluationStatus::WinnerDeclared);
    assert_eq!(evaluation.winner.as_deref(), Some("express"));
    let express = evaluation
        .per_variant_stats
        .iter()
        .find(|s| s.variant_id == "express")
        .unwrap();
    assert_eq!(express.conversions, express.impressions);
    assert!((express.conversion_value - 20.0 * express.conversions as f64).abs() < 1e-6);

    let summary = service.run_lifecycle_evaluation().unwrap();
    assert_eq!(summary.declared_count(), 1);

    let test = service.require_test("checkout").unwrap();
    assert_eq!(test.status, TestStatus::Completed);
    assert_eq!(test.results.unwrap().winner, "express");

    // Completed tests serve the default experience and drop events.
    let ctx = SubjectContext::user("late-user");
    let mut session = SessionAssignments::unscoped();
    assert!(service
        .assign_variant(&mut session, "checkout", &ctx)
        .unwrap()
        .is_none());
    let outcome = service.track_event(&session, "checkout", TrackedEvent::conversion("purchase"), &ctx);
    assert!(matches!(
        outcome,
        TrackOutcome::Dropped {
            reason: DropReason::NotAssigned,
            ..
        }
    ));
}

#[test]
fn state_survives_reopening_the_database() {
    let fixture = StoreFixture::new();
    {
        let service = sqlite_service(&fixture);
        service
            .create_test(NewTest::new("banner", vec![Variant::new("a", "A", 1.0)]))
            .unwrap();
        service.activate("banner").unwrap();
        let ctx = SubjectContext::session("s-1");
        let mut session = SessionAssignments::new("s-1");
        service.assign_variant(&mut session, "banner", &ctx).unwrap();
    }

    let reopened = sqlite_service(&fixture);
    let (test, evaluation) = reopened.evaluate_test("banner").unwrap();
    assert_eq!(test.status, TestStatus::Active);
    assert_eq!(evaluation.per_variant_stats[0].impressions, 1);
}

#[test]
fn audience_rules_apply_end_to_end() {
    let fixture = StoreFixture::new();
    let service = sqlite_service(&fixture);
    service
        .create_test(
            NewTest::new("admin-only", vec![Variant::new("a", "A", 1.0)]).with_audience(
                AudienceCriteria {
                    percentage: 100.0,
                    allowed_roles: vec!["admin".to_string()],
                },
            ),
        )
        .unwrap();
    service.activate("admin-only").unwrap();

    let mut session = SessionAssignments::unscoped();
    let guest = SubjectContext::user("u-1").with_role("guest");
    assert!(service
        .assign_variant(&mut session, "admin-only", &guest)
        .unwrap()
        .is_none());

    let admin = SubjectContext::user("u-2").with_role("admin");
    assert!(service
        .assign_variant(&mut session, "admin-only", &admin)
        .unwrap()
        .is_some());
}

#[test]
fn invalid_transitions_are_rejected() {
    let fixture = StoreFixture::new();
    let service = sqlite_service(&fixture);
    service
        .create_test(NewTest::new("flow", vec![Variant::new("a", "A", 1.0)]))
        .unwrap();

    assert!(matches!(
        service.pause("flow"),
        Err(SplitError::InvalidTransition { .. })
    ));
    service.activate("flow").unwrap();
    service.pause("flow").unwrap();
    assert_eq!(service.resume("flow").unwrap().status, TestStatus::Active);
    assert!(matches!(
        service.activate("missing"),
        Err(SplitError::TestNotFound(_))
    ));
}

#[test]
fn interactions_are_counted_separately() {
    let fixture = StoreFixture::new();
    let service = sqlite_service(&fixture);
    service
        .create_test(NewTest::new("nav", vec![Variant::new("a", "A", 1.0)]))
        .unwrap();
    service.activate("nav").unwrap();

    let ctx = SubjectContext::user("u-1");
    let mut session = SessionAssignments::unscoped();
    service.assign_variant(&mut session, "nav", &ctx).unwrap();
    let outcome = service.track_event(
        &session,
        "nav",
        TrackedEvent::new(EventType::Interaction, "open_menu")
            .with_data(Some(serde_json::json!({ "menu": "main" }))),
        &ctx,
    );
    let TrackOutcome::Recorded(event) = outcome else {
        panic!("interaction should be recorded");
    };
    assert_eq!(event.event_data.unwrap()["menu"], "main");

    let (_, evaluation) = service.evaluate_test("nav").unwrap();
    assert_eq!(evaluation.per_variant_stats[0].interactions, 1);
    assert_eq!(evaluation.per_variant_stats[0].conversions, 0);
}
