use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use tutor_agent::backend::{BackendFactory, OpenAiBackend};
use tutor_agent::guardrails::GuardrailFailReport;
use tutor_agent::prompts::{SESSION_EXIT_WORDS, SESSION_FAREWELL, SESSION_OPENER};
use tutor_agent::session::TutorSession;
use tutor_agent::workflow::{Workflow, WorkflowOutcome};
use tutor_core::config::{AppConfig, LoadOptions};
use uuid::Uuid;

use super::{block_on, CommandResult};

pub fn run(api_key: Option<&str>, save: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("chat", "config_validation", error.to_string(), 2),
    };
    let backend = OpenAiBackend::new(config.openai.clone());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    block_on("chat", run_with(&config, &backend, api_key, save, stdin.lock(), &mut stdout))
}

/// Interactive session over arbitrary line input and text output.
pub async fn run_with<R, W>(
    config: &AppConfig,
    backend: &dyn BackendFactory,
    api_key: Option<&str>,
    save: Option<&Path>,
    input: R,
    output: &mut W,
) -> CommandResult
where
    R: BufRead,
    W: Write,
{
    let deps = match config.resolve_api_key(api_key).and_then(|key| backend.connect(&key)) {
        Ok(deps) => deps,
        Err(error) => return CommandResult::from_workflow_error("chat", &error),
    };

    let workflow = Arc::new(Workflow::from_config(config));
    let mut session = TutorSession::new(workflow, deps, Uuid::new_v4().to_string());

    let banner = "=".repeat(60);
    let _ = writeln!(output, "{banner}\nPersonal Learning Tutor\n{banner}");
    let _ = writeln!(output, "\nType 'quit' or 'exit' to end the session.\n");

    respond(&mut session, SESSION_OPENER, output).await;

    for line in input.lines() {
        let Ok(line) = line else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if SESSION_EXIT_WORDS.contains(&message.to_lowercase().as_str()) {
            let _ = writeln!(output, "\nTutor: {SESSION_FAREWELL}\n");
            break;
        }

        respond(&mut session, message, output).await;
    }

    if let Some(path) = save {
        if let Err(error) = session.save_transcript(path) {
            return CommandResult::failure("chat", "io", format!("{error:#}"), 1);
        }
        return CommandResult::success("chat", format!("Session saved to {}", path.display()));
    }

    CommandResult::success("chat", "session ended")
}

async fn respond<W: Write>(session: &mut TutorSession, message: &str, output: &mut W) {
    let reply = match session.send(message).await {
        Ok(WorkflowOutcome::Completed(result)) => result.output_text,
        Ok(WorkflowOutcome::Blocked(report)) => blocked_notice(&report),
        Err(error) => format!("Sorry, I encountered an error: {error}"),
    };
    let _ = writeln!(output, "\nTutor: {reply}\n");
}

fn blocked_notice(report: &GuardrailFailReport) -> String {
    let checks = [
        ("pii", report.pii.failed),
        ("moderation", report.moderation.failed),
        ("jailbreak", report.jailbreak.failed),
        ("hallucination", report.hallucination.failed),
        ("nsfw", report.nsfw.failed),
        ("url_filter", report.url_filter.failed),
        ("custom_prompt_check", report.custom_prompt_check.failed),
        ("prompt_injection", report.prompt_injection.failed),
    ];
    let failed: Vec<&str> =
        checks.iter().filter(|(_, failed)| *failed).map(|(name, _)| *name).collect();

    format!("I can't help with that message (blocked by: {}).", failed.join(", "))
}
