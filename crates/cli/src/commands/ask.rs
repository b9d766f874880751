use tutor_agent::backend::{BackendFactory, OpenAiBackend};
use tutor_agent::workflow::{Workflow, WorkflowOutcome};
use tutor_core::config::{AppConfig, LoadOptions};
use tutor_core::WorkflowInput;
use uuid::Uuid;

use super::{block_on, CommandResult};

pub fn run(message: &str, api_key: Option<&str>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("ask", "config_validation", error.to_string(), 2),
    };
    let backend = OpenAiBackend::new(config.openai.clone());

    block_on("ask", run_with(&config, &backend, message, api_key))
}

/// One-shot workflow run against the given backend.
pub async fn run_with(
    config: &AppConfig,
    backend: &dyn BackendFactory,
    message: &str,
    api_key: Option<&str>,
) -> CommandResult {
    let deps = match config.resolve_api_key(api_key).and_then(|key| backend.connect(&key)) {
        Ok(deps) => deps,
        Err(error) => return CommandResult::from_workflow_error("ask", &error),
    };

    let workflow = Workflow::from_config(config);
    let mut input = WorkflowInput::new(message);
    let correlation_id = Uuid::new_v4().to_string();

    match workflow.run_workflow(&mut input, &deps, &correlation_id).await {
        Ok(WorkflowOutcome::Completed(result)) => CommandResult::success("ask", result.output_text),
        Ok(WorkflowOutcome::Blocked(report)) => match serde_json::to_value(&report) {
            Ok(report) => CommandResult::blocked("ask", report),
            Err(error) => CommandResult::failure("ask", "serialization", error.to_string(), 1),
        },
        Err(error) => CommandResult::from_workflow_error("ask", &error),
    }
}
