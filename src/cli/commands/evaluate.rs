//! splitlab evaluate - One lifecycle pass over all active tests.

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_ok, status_label};
use crate::error::{Result, SplitError};
use crate::lifecycle::RunSummary;

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Exit with an error when any test failed to evaluate
    #[arg(long)]
    pub strict: bool,
}

pub fn run(ctx: &AppContext, args: &EvaluateArgs) -> Result<()> {
    let summary = ctx.service.run_lifecycle_evaluation()?;

    if ctx.robot_mode {
        emit_json(&robot_ok(&summary).with_metadata(&ctx.config.robot))?;
    } else {
        emit_human(render_summary(&summary));
    }

    if args.strict && summary.failed_count() > 0 {
        return Err(SplitError::EvaluationFailed(format!(
            "{} of {} tests failed to evaluate",
            summary.failed_count(),
            summary.processed_count
        )));
    }
    Ok(())
}

fn render_summary(summary: &RunSummary) -> HumanLayout {
    let mut layout = HumanLayout::new();
    layout
        .title("Lifecycle Evaluation")
        .kv("Processed", &summary.processed_count.to_string())
        .kv("Declared", &summary.declared_count().to_string())
        .kv("Failed", &summary.failed_count().to_string())
        .kv(
            "Duration",
            &format!(
                "{}ms",
                (summary.finished_at - summary.started_at).num_milliseconds()
            ),
        );

    if !summary.results.is_empty() {
        layout.blank();
    }
    for result in &summary.results {
        let mut line = format!(
            "{}: {}",
            result.test_name,
            status_label(result.status.as_str())
        );
        if let (Some(winner), Some(confidence)) = (&result.winner, result.confidence) {
            line.push_str(&format!(" (winner {winner}, {confidence}%)"));
        }
        if let Some(error) = &result.error {
            line.push_str(&format!(" - {error}"));
        }
        layout.bullet(&line);
    }
    layout
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{RunStatus, TestRunResult};
    use clap::{Parser, Subcommand};

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        cmd: TestCommand,
    }

    #[derive(Subcommand)]
    enum TestCommand {
        Evaluate(EvaluateArgs),
    }

    #[test]
    fn parse_evaluate() {
        let parsed = TestCli::parse_from(["splitlab", "evaluate", "--strict"]);
        let TestCommand::Evaluate(args) = parsed.cmd;
        assert!(args.strict);
    }

    #[test]
    fn summary_lists_winners_and_failures() {
        let now = chrono::Utc::now();
        let summary = RunSummary {
            processed_count: 2,
            results: vec![
                TestRunResult {
                    test_id: "t1".into(),
                    test_name: "checkout".into(),
                    status: RunStatus::WinnerDeclared,
                    winner: Some("b".into()),
                    confidence: Some(99),
                    error: None,
                },
                TestRunResult {
                    test_id: "t2".into(),
                    test_name: "banner".into(),
                    status: RunStatus::Failed,
                    winner: None,
                    confidence: None,
                    error: Some("disk I/O error".into()),
                },
            ],
            started_at: now,
            finished_at: now,
        };

        let text = render_summary(&summary).build();
        assert!(text.contains("winner b, 99%"));
        assert!(text.contains("disk I/O error"));
    }
}
