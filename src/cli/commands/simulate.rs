//! splitlab simulate - Drive synthetic traffic through a test.
//!
//! By default the test definition is copied into an in-memory store so
//! real data is never touched. `--persist` writes the synthetic events to
//! the configured database instead.

use std::collections::HashMap;
use std::sync::Arc;

use clap::Args;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, warn};

use crate::app::AppContext;
use crate::assignment::SessionAssignments;
use crate::cli::commands::stats::render_stats;
use crate::cli::output::{emit_human, emit_json, robot_ok};
use crate::core::{NewTest, SubjectContext, Test, TestStatus};
use crate::error::{Result, SplitError};
use crate::lifecycle::RunSummary;
use crate::service::{ExperimentService, TrackedEvent};
use crate::storage::{MemoryRepository, Repository};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Test name
    pub test: String,

    /// Number of synthetic subjects
    #[arg(long, default_value = "1000")]
    pub subjects: usize,

    /// True conversion rate per variant (id=rate, rate in 0..=1)
    #[arg(long)]
    pub rate: Vec<String>,

    /// Conversion rate for variants without --rate
    #[arg(long, default_value = "0.1")]
    pub default_rate: f64,

    /// RNG seed; the same seed replays the same traffic
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Write events to the configured database instead of a sandbox
    #[arg(long)]
    pub persist: bool,

    /// Run a lifecycle evaluation after the traffic
    #[arg(long)]
    pub evaluate: bool,
}

/// Knobs for one synthetic traffic run.
#[derive(Debug, Clone)]
pub struct TrafficPlan {
    pub subjects: usize,
    pub rates: HashMap<String, f64>,
    pub default_rate: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrafficReport {
    pub subjects: usize,
    pub assigned: usize,
    pub excluded: usize,
    pub conversions: usize,
    pub dropped_events: usize,
    pub per_variant: HashMap<String, usize>,
}

pub fn run(ctx: &AppContext, args: &SimulateArgs) -> Result<()> {
    let plan = TrafficPlan {
        subjects: args.subjects,
        rates: parse_rate_specs(&args.rate)?,
        default_rate: check_rate("--default-rate", args.default_rate)?,
        seed: args.seed,
    };

    let source = ctx.service.require_test(&args.test)?;
    let sandbox;
    let service = if args.persist {
        if source.status != TestStatus::Active {
            warn!(test = %source.name, status = %source.status, "test is not active; no subject will be assigned");
        }
        &ctx.service
    } else {
        sandbox = sandbox_service(ctx, &source)?;
        &sandbox
    };

    let report = simulate_traffic(service, &source.name, &plan)?;
    let lifecycle = if args.evaluate {
        Some(service.run_lifecycle_evaluation()?)
    } else {
        None
    };
    let (test, evaluation) = service.evaluate_test(&source.name)?;

    if ctx.robot_mode {
        let payload = serde_json::json!({
            "test": test.name,
            "persisted": args.persist,
            "seed": plan.seed,
            "traffic": report,
            "evaluation": evaluation,
            "lifecycle": lifecycle,
        });
        return emit_json(&robot_ok(payload).with_metadata(&ctx.config.robot));
    }

    let mut layout = render_stats(&test, &evaluation);
    layout
        .section("Traffic")
        .kv("Subjects", &report.subjects.to_string())
        .kv("Assigned", &report.assigned.to_string())
        .kv("Excluded", &report.excluded.to_string())
        .kv("Conversions", &report.conversions.to_string())
        .kv("Dropped events", &report.dropped_events.to_string())
        .kv("Seed", &plan.seed.to_string())
        .kv("Persisted", if args.persist { "yes" } else { "no (sandbox)" });
    if let Some(summary) = &lifecycle {
        render_lifecycle(&mut layout, summary);
    }
    emit_human(layout);
    Ok(())
}

/// Copy the test into a fresh in-memory store and activate it there.
fn sandbox_service(ctx: &AppContext, source: &Test) -> Result<ExperimentService> {
    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let service = ExperimentService::new(repo, &ctx.config);
    let mut copy = NewTest::new(&source.name, source.variants.clone());
    copy.description.clone_from(&source.description);
    copy.audience_criteria.clone_from(&source.audience_criteria);
    service.create_test(copy)?;
    service.activate(&source.name)?;
    Ok(service)
}

/// Assign `plan.subjects` synthetic subjects and convert each with its
/// variant's rate.
pub fn simulate_traffic(
    service: &ExperimentService,
    test_name: &str,
    plan: &TrafficPlan,
) -> Result<TrafficReport> {
    let test = service.require_test(test_name)?;
    let role = test
        .audience_criteria
        .as_ref()
        .and_then(|audience| audience.allowed_roles.first().cloned());

    let mut rng = StdRng::seed_from_u64(plan.seed);
    let mut report = TrafficReport {
        subjects: plan.subjects,
        ..TrafficReport::default()
    };

    for idx in 0..plan.subjects {
        let session_id = format!("sim-{}-{idx}", plan.seed);
        let mut context = SubjectContext::session(&session_id);
        if let Some(role) = &role {
            context = context.with_role(role);
        }
        let mut session = SessionAssignments::new(&session_id);

        let Some(variant) = service.assign_variant(&mut session, test_name, &context)? else {
            report.excluded += 1;
            continue;
        };
        report.assigned += 1;
        *report.per_variant.entry(variant.id.clone()).or_default() += 1;

        let rate = plan
            .rates
            .get(&variant.id)
            .copied()
            .unwrap_or(plan.default_rate);
        if rng.random::<f64>() < rate {
            let outcome =
                service.track_event(&session, test_name, TrackedEvent::conversion("conversion"), &context);
            if outcome.is_recorded() {
                report.conversions += 1;
            } else {
                report.dropped_events += 1;
            }
        }
    }

    debug!(
        test = test_name,
        assigned = report.assigned,
        conversions = report.conversions,
        "simulated traffic"
    );
    Ok(report)
}

fn render_lifecycle(layout: &mut crate::cli::output::HumanLayout, summary: &RunSummary) {
    layout.blank().section("Lifecycle");
    for result in &summary.results {
        layout.bullet(&format!("{}: {}", result.test_name, result.status.as_str()));
    }
}

fn parse_rate_specs(specs: &[String]) -> Result<HashMap<String, f64>> {
    let mut rates = HashMap::new();
    for spec in specs {
        let (id, value) = spec
            .split_once('=')
            .ok_or_else(|| SplitError::ValidationFailed(format!("invalid rate: {spec}")))?;
        let id = id.trim();
        if id.is_empty() {
            return Err(SplitError::ValidationFailed(
                "rate variant id cannot be empty".to_string(),
            ));
        }
        let value: f64 = value.trim().parse().map_err(|_| {
            SplitError::ValidationFailed(format!("invalid rate value for {id}: {value}"))
        })?;
        rates.insert(id.to_string(), check_rate(id, value)?);
    }
    Ok(rates)
}

fn check_rate(label: &str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(SplitError::ValidationFailed(format!(
            "rate for {label} must be within [0, 1], got {value}"
        )))
    }
}
