use serde::Serialize;
use tutor_agent::backend::{BackendFactory, OpenAiBackend};
use tutor_agent::guardrails::{
    has_tripwire, ErrorMode, GuardrailConfig, GuardrailFailReport, GuardrailResult,
};
use tutor_core::config::{AppConfig, LoadOptions};

use super::{block_on, CommandResult};

#[derive(Debug, Serialize)]
struct GuardrailsReport<'a> {
    command: &'static str,
    status: &'static str,
    results: &'a [GuardrailResult],
    report: GuardrailFailReport,
}

pub fn run(text: &str, api_key: Option<&str>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("guardrails", "config_validation", error.to_string(), 2)
        }
    };
    let backend = OpenAiBackend::new(config.openai.clone());

    block_on("guardrails", run_with(&config, &backend, text, api_key))
}

/// Evaluates the configured checks in record mode, so one failing check
/// shows up as `errored` instead of hiding the others.
pub async fn run_with(
    config: &AppConfig,
    backend: &dyn BackendFactory,
    text: &str,
    api_key: Option<&str>,
) -> CommandResult {
    let deps = match config.resolve_api_key(api_key).and_then(|key| backend.connect(&key)) {
        Ok(deps) => deps,
        Err(error) => return CommandResult::from_workflow_error("guardrails", &error),
    };

    let guardrail_config = GuardrailConfig::tutor_default(&config.guardrails);
    let results =
        match deps.guardrails.run(text, &guardrail_config, &deps.context, ErrorMode::Record).await {
            Ok(results) => results,
            Err(error) => {
                return CommandResult::failure("guardrails", "upstream", format!("{error:#}"), 1)
            }
        };

    let tripped = has_tripwire(&results);
    let payload = GuardrailsReport {
        command: "guardrails",
        status: if tripped { "tripped" } else { "ok" },
        results: &results,
        report: GuardrailFailReport::build(&results),
    };

    match serde_json::to_string_pretty(&payload) {
        Ok(output) => CommandResult { exit_code: if tripped { 3 } else { 0 }, output },
        Err(error) => CommandResult::failure("guardrails", "serialization", error.to_string(), 1),
    }
}
