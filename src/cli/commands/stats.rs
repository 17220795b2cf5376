//! splitlab stats - Per-variant statistics and current significance.

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_ok, status_label};
use crate::core::Test;
use crate::error::Result;
use crate::stats::{Evaluation, VariantStats};

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Test name
    pub test: String,
}

pub fn run(ctx: &AppContext, args: &StatsArgs) -> Result<()> {
    let (test, evaluation) = ctx.service.evaluate_test(&args.test)?;

    if ctx.robot_mode {
        let mut response = robot_ok(serde_json::json!({
            "test_id": test.id,
            "name": test.name,
            "test_status": test.status,
            "evaluation": evaluation,
        }));
        if evaluation.ignored_events > 0 {
            response = response.with_warning(format!(
                "{} events reference variants outside this test",
                evaluation.ignored_events
            ));
        }
        return emit_json(&response.with_metadata(&ctx.config.robot));
    }

    emit_human(render_stats(&test, &evaluation));
    Ok(())
}

/// Human rendering shared with `simulate`.
pub(crate) fn render_stats(test: &Test, evaluation: &Evaluation) -> HumanLayout {
    let mut layout = HumanLayout::new();
    layout
        .title(&format!("Stats: {}", test.name))
        .kv("Test status", &status_label(test.status.as_str()))
        .kv("Evaluation", &status_label(evaluation.status.as_str()));
    if let Some(winner) = &evaluation.winner {
        layout.kv("Leader", winner);
    }
    if let Some(confidence) = evaluation.confidence {
        layout.kv("Confidence", &format!("{confidence}%"));
    }
    if let Some(z) = evaluation.z_score {
        layout.kv("z-score", &format!("{z:.3}"));
    }
    if evaluation.ignored_events > 0 {
        layout.kv("Ignored events", &evaluation.ignored_events.to_string());
    }
    layout.blank();

    for stats in &evaluation.per_variant_stats {
        render_variant(&mut layout, stats);
    }
    layout
}

fn render_variant(layout: &mut HumanLayout, stats: &VariantStats) {
    let rate = if stats.impressions > 0 {
        format!("{:.2}%", stats.rate * 100.0)
    } else {
        "-".to_string()
    };
    layout
        .section(&stats.variant_id)
        .kv("Name", &stats.variant_name)
        .kv("Impressions", &stats.impressions.to_string())
        .kv("Conversions", &stats.conversions.to_string())
        .kv("Interactions", &stats.interactions.to_string())
        .kv("Conversion rate", &rate)
        .kv("Value", &format!("{:.2}", stats.conversion_value))
        .blank();
}
