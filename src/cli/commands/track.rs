//! splitlab track - Record an event against the subject's variant.

use clap::Args;

use crate::app::AppContext;
use crate::cli::commands::assign::SubjectArgs;
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_ok, status_label};
use crate::core::EventType;
use crate::error::{Result, SplitError};
use crate::service::{TrackOutcome, TrackedEvent};

#[derive(Args, Debug)]
pub struct TrackArgs {
    /// Test name
    pub test: String,

    /// Event type: impression, conversion, interaction
    #[arg(long = "type", default_value = "conversion")]
    pub event_type: String,

    /// Event name (defaults to the event type)
    #[arg(long)]
    pub name: Option<String>,

    /// Numeric value, e.g. order total
    #[arg(long)]
    pub value: Option<f64>,

    /// Extra event data as a JSON document
    #[arg(long)]
    pub data: Option<String>,

    #[command(flatten)]
    pub subject: SubjectArgs,
}

pub fn run(ctx: &AppContext, args: &TrackArgs) -> Result<()> {
    let event_type: EventType = args.event_type.parse()?;
    let data = args.data.as_deref().map(parse_event_data).transpose()?;
    let event = TrackedEvent::new(
        event_type,
        args.name.as_deref().unwrap_or(event_type.as_str()),
    )
    .with_value(args.value)
    .with_data(data);

    let context = args.subject.context();
    let session = args.subject.session_cache();
    let outcome = ctx
        .service
        .track_event(&session, &args.test, event, &context);

    if ctx.robot_mode {
        let payload = match &outcome {
            TrackOutcome::Recorded(event) => serde_json::json!({
                "recorded": true,
                "event": event,
            }),
            TrackOutcome::Dropped { reason, detail } => serde_json::json!({
                "recorded": false,
                "reason": reason,
                "detail": detail,
            }),
        };
        return emit_json(&robot_ok(payload).with_metadata(&ctx.config.robot));
    }

    let mut layout = HumanLayout::new();
    layout.title("Track").kv("Test", &args.test);
    match &outcome {
        TrackOutcome::Recorded(event) => {
            layout
                .kv("Result", &status_label("recorded"))
                .kv("Event ID", &event.id)
                .kv("Variant", &event.variant_id)
                .kv("Type", event.event_type.as_str())
                .kv("Name", &event.event_name);
        }
        TrackOutcome::Dropped { reason, detail } => {
            layout
                .kv("Result", &status_label("dropped"))
                .kv("Reason", reason.as_str());
            if !detail.is_empty() {
                layout.kv("Detail", detail);
            }
        }
    }
    emit_human(layout);
    Ok(())
}

fn parse_event_data(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|err| SplitError::ValidationFailed(format!("--data is not valid JSON: {err}")))
}
