pub mod ask;
pub mod chat;
pub mod config;
pub mod doctor;
pub mod guardrails;

use std::future::Future;

use serde::Serialize;
use serde_json::Value;
use tutor_core::WorkflowError;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            report: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    /// A guardrail tripped. Not an error, but scripts can tell it apart.
    pub fn blocked(command: &str, report: Value) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "blocked".to_string(),
            error_class: None,
            message: "message was blocked by guardrails".to_string(),
            report: Some(report),
        };
        Self { exit_code: 3, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            report: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_workflow_error(command: &str, error: &WorkflowError) -> Self {
        let exit_code = match error {
            WorkflowError::Validation(_) | WorkflowError::Configuration(_) => 2,
            WorkflowError::AgentResult(_) | WorkflowError::Upstream(_) => 1,
        };
        Self::failure(command, error.kind(), error.to_string(), exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Drives an async command on a fresh single-threaded runtime.
pub(crate) fn block_on<F>(command: &str, future: F) -> CommandResult
where
    F: Future<Output = CommandResult>,
{
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(future),
        Err(error) => CommandResult::failure(
            command,
            "runtime",
            format!("failed to initialize async runtime: {error}"),
            1,
        ),
    }
}
