//! splitlab assign - Resolve a subject's variant for an active test.

use clap::Args;

use crate::app::AppContext;
use crate::assignment::SessionAssignments;
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_ok};
use crate::core::SubjectContext;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct AssignArgs {
    /// Test name
    pub test: String,

    #[command(flatten)]
    pub subject: SubjectArgs,
}

/// Subject identity flags shared by `assign` and `track`.
#[derive(Args, Debug, Clone, Default)]
pub struct SubjectArgs {
    /// Authenticated user id (preferred bucketing key)
    #[arg(long)]
    pub user: Option<String>,

    /// Session id (bucketing key for anonymous visitors)
    #[arg(long)]
    pub session: Option<String>,

    /// Subject role, checked against the test's allowed roles
    #[arg(long)]
    pub role: Option<String>,
}

impl SubjectArgs {
    pub fn context(&self) -> SubjectContext {
        let mut context = SubjectContext {
            user_id: self.user.clone(),
            session_id: self.session.clone(),
            ..SubjectContext::default()
        };
        if let Some(role) = &self.role {
            context = context.with_role(role);
        }
        context
    }

    pub fn session_cache(&self) -> SessionAssignments {
        self.session
            .as_deref()
            .map_or_else(SessionAssignments::unscoped, SessionAssignments::new)
    }
}

pub fn run(ctx: &AppContext, args: &AssignArgs) -> Result<()> {
    let context = args.subject.context();
    let mut session = args.subject.session_cache();
    let variant = ctx
        .service
        .assign_variant(&mut session, &args.test, &context)?;
    let subject_id = context.resolve().map(|subject| subject.id);

    if ctx.robot_mode {
        let payload = serde_json::json!({
            "test": args.test,
            "subject_id": subject_id,
            "assigned": variant.is_some(),
            "variant": variant,
        });
        return emit_json(&robot_ok(payload).with_metadata(&ctx.config.robot));
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Assignment")
        .kv("Test", &args.test)
        .kv("Subject", subject_id.as_deref().unwrap_or("(anonymous)"));
    match &variant {
        Some(variant) => {
            layout
                .kv("Variant", &variant.id)
                .kv("Name", &variant.name);
        }
        None => {
            layout.kv("Variant", "- (default experience)");
        }
    }
    emit_human(layout);
    Ok(())
}
