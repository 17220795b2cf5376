use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;

use crate::config::RobotConfig;
use crate::error::{ErrorCode, Result, SplitError, StructuredError};

/// Output mode for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Human,
    Robot,
}

impl OutputMode {
    #[must_use]
    pub const fn from_robot_flag(robot: bool) -> Self {
        if robot { Self::Robot } else { Self::Human }
    }

    #[must_use]
    pub const fn is_robot(&self) -> bool {
        matches!(self, Self::Robot)
    }
}

#[derive(Debug, Serialize)]
pub struct RobotResponse<T> {
    pub status: RobotStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> RobotResponse<T> {
    /// Drop `timestamp`/`version` when the config asks for bare payloads.
    #[must_use]
    pub fn with_metadata(mut self, robot: &RobotConfig) -> Self {
        if !robot.include_metadata {
            self.timestamp = None;
            self.version = None;
        }
        self
    }

    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    Ok,
    Error {
        /// Error code enum value (e.g., "TEST_NOT_FOUND")
        code: ErrorCode,
        /// Numeric error code (e.g., 101)
        numeric_code: u16,
        message: String,
        /// Actionable suggestion for recovery
        suggestion: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
        recoverable: bool,
        category: String,
    },
}

impl From<StructuredError> for RobotStatus {
    fn from(err: StructuredError) -> Self {
        Self::Error {
            code: err.code,
            numeric_code: err.numeric_code,
            message: err.message,
            suggestion: err.suggestion,
            context: err.context,
            recoverable: err.recoverable,
            category: err.category,
        }
    }
}

impl From<&SplitError> for RobotStatus {
    fn from(err: &SplitError) -> Self {
        err.to_structured().into()
    }
}

pub fn robot_ok<T: Serialize>(data: T) -> RobotResponse<T> {
    RobotResponse {
        status: RobotStatus::Ok,
        timestamp: Some(Utc::now()),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        data,
        warnings: Vec::new(),
    }
}

/// Robot error response with code, suggestion and context.
pub fn robot_error(err: &SplitError) -> RobotResponse<serde_json::Value> {
    RobotResponse {
        status: err.into(),
        timestamp: Some(Utc::now()),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        data: serde_json::Value::Null,
        warnings: Vec::new(),
    }
}

pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)
        .map_err(|err| SplitError::Serialization(format!("serialize output: {err}")))?;
    println!("{payload}");
    Ok(())
}

pub struct HumanLayout {
    lines: Vec<String>,
    key_width: usize,
}

impl Default for HumanLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanLayout {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            key_width: 18,
        }
    }

    pub fn title(&mut self, text: &str) -> &mut Self {
        self.lines.push(style(text).bold().to_string());
        self.lines.push(String::new());
        self
    }

    pub fn section(&mut self, text: &str) -> &mut Self {
        self.lines.push(style(text).bold().to_string());
        self.lines.push("-".repeat(text.len().max(3)));
        self
    }

    pub fn kv(&mut self, key: &str, value: &str) -> &mut Self {
        let key_style = style(key).dim().to_string();
        self.lines.push(format!(
            "{key_style:width$} {value}",
            width = self.key_width
        ));
        self
    }

    pub fn bullet(&mut self, text: &str) -> &mut Self {
        self.lines.push(format!("- {text}"));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    pub fn push_line(&mut self, line: impl Into<String>) -> &mut Self {
        self.lines.push(line.into());
        self
    }

    #[must_use]
    pub fn build(self) -> String {
        self.lines.join("\n")
    }
}

pub fn emit_human(layout: HumanLayout) {
    println!("{}", layout.build());
}

/// Colored status label for human output.
pub fn status_label(status: &str) -> String {
    match status {
        "active" | "winner_declared" | "recorded" => style(status).green().to_string(),
        "paused" | "in_progress" | "insufficient_data" | "dropped" => {
            style(status).yellow().to_string()
        }
        "failed" => style(status).red().to_string(),
        _ => style(status).cyan().to_string(),
    }
}
