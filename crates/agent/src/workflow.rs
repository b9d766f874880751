use std::sync::Arc;

use tracing::{info, warn, Instrument};
use tutor_core::config::{AppConfig, TraceConfig};
use tutor_core::{ConversationHistory, WorkflowError, WorkflowInput, WorkflowResult};

use crate::guardrails::{
    ErrorMode, GuardrailConfig, GuardrailContext, GuardrailFailReport, GuardrailOutcome,
    GuardrailService,
};
use crate::runtime::{AgentDefinition, AgentRuntime};

/// Per-request collaborators, built from the credential resolved for that request.
#[derive(Clone)]
pub struct WorkflowDeps {
    pub guardrails: Arc<dyn GuardrailService>,
    pub agent_runtime: Arc<dyn AgentRuntime>,
    pub context: GuardrailContext,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceMetadata {
    pub source: String,
    pub workflow_id: String,
}

impl From<&TraceConfig> for TraceMetadata {
    fn from(config: &TraceConfig) -> Self {
        Self { source: config.source.clone(), workflow_id: config.workflow_id.clone() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WorkflowOutcome {
    /// A guardrail tripped. The agent was not invoked.
    Blocked(GuardrailFailReport),
    Completed(WorkflowResult),
}

impl WorkflowOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

/// The guardrail-gated tutor workflow. Holds only immutable, process-wide
/// definitions; everything request-scoped is passed in.
#[derive(Clone, Debug)]
pub struct Workflow {
    agent: AgentDefinition,
    guardrails: GuardrailConfig,
    trace: TraceMetadata,
}

impl Workflow {
    pub fn new(agent: AgentDefinition, guardrails: GuardrailConfig, trace: TraceMetadata) -> Self {
        Self { agent, guardrails, trace }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            AgentDefinition::tutor(&config.agent),
            GuardrailConfig::tutor_default(&config.guardrails),
            TraceMetadata::from(&config.trace),
        )
    }

    pub fn agent(&self) -> &AgentDefinition {
        &self.agent
    }

    pub fn guardrails(&self) -> &GuardrailConfig {
        &self.guardrails
    }

    /// Runs one request: a fresh one-message history built from
    /// `input.input_as_text`. PII scrubbing rewrites `input` in place.
    pub async fn run_workflow(
        &self,
        input: &mut WorkflowInput,
        deps: &WorkflowDeps,
        correlation_id: &str,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let mut history = ConversationHistory::from_user_text(input.input_as_text.clone());
        self.run_turn(&mut history, input, deps, correlation_id).await
    }

    /// Runs one turn against an existing history whose last item is the
    /// user message for `input`. Agent items are appended on completion.
    pub async fn run_turn(
        &self,
        history: &mut ConversationHistory,
        input: &mut WorkflowInput,
        deps: &WorkflowDeps,
        correlation_id: &str,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let span = tracing::info_span!(
            "workflow.trace",
            trace_name = %self.agent.name,
            trace_source = %self.trace.source,
            workflow_id = %self.trace.workflow_id,
            correlation_id = %correlation_id,
        );

        self.run_turn_inner(history, input, deps, correlation_id).instrument(span).await
    }

    async fn run_turn_inner(
        &self,
        history: &mut ConversationHistory,
        input: &mut WorkflowInput,
        deps: &WorkflowDeps,
        correlation_id: &str,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        if input.input_as_text.is_empty() {
            return Err(WorkflowError::Validation("Message is required".to_string()));
        }

        let input_text = input.input_as_text.clone();
        let outcome = self.run_and_apply_guardrails(&input_text, history, input, deps).await?;

        if outcome.has_tripwire {
            warn!(
                event_name = "agent.workflow.blocked",
                correlation_id = %correlation_id,
                guardrail_count = outcome.results.len(),
                "guardrail tripwire triggered; agent not invoked"
            );
            return Ok(WorkflowOutcome::Blocked(outcome.fail_output));
        }

        let run = deps
            .agent_runtime
            .run(&self.agent, history)
            .await
            .map_err(WorkflowError::upstream)?;
        history.extend(run.new_items);

        let output_text = run
            .final_output
            .filter(|text| !text.is_empty())
            .ok_or_else(|| WorkflowError::AgentResult("Agent result is undefined".to_string()))?;

        info!(
            event_name = "agent.workflow.completed",
            correlation_id = %correlation_id,
            history_len = history.len(),
            "tutor agent produced a response"
        );
        Ok(WorkflowOutcome::Completed(WorkflowResult { output_text }))
    }

    /// Full pass over the input text, then PII masking of history and input
    /// fields when the PII check is non-blocking. Masking runs even when the
    /// full pass tripped.
    async fn run_and_apply_guardrails(
        &self,
        input_text: &str,
        history: &mut ConversationHistory,
        input: &mut WorkflowInput,
        deps: &WorkflowDeps,
    ) -> Result<GuardrailOutcome, WorkflowError> {
        let results = deps
            .guardrails
            .run(input_text, &self.guardrails, &deps.context, ErrorMode::Raise)
            .await
            .map_err(WorkflowError::upstream)?;

        if let Some(pii_only) = self.guardrails.pii_masking() {
            for text in history.input_texts_mut() {
                scrub(text, &pii_only, deps).await?;
            }
            for text in input.text_fields_mut() {
                scrub(text, &pii_only, deps).await?;
            }
        }

        Ok(GuardrailOutcome::from_results(results, input_text))
    }
}

async fn scrub(
    text: &mut String,
    pii_only: &GuardrailConfig,
    deps: &WorkflowDeps,
) -> Result<(), WorkflowError> {
    let results = deps
        .guardrails
        .run(text, pii_only, &deps.context, ErrorMode::Raise)
        .await
        .map_err(WorkflowError::upstream)?;
    *text = crate::guardrails::safe_text(&results, text);
    Ok(())
}
