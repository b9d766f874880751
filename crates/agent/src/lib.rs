//! Agent Runtime - guardrail-gated tutoring workflow
//!
//! This crate provides the orchestration core of the tutor service:
//! - Runs the configured safety guardrails against every inbound message
//! - Scrubs PII from conversation history when masking is configured
//! - Shapes guardrail results into a typed blocked-output report
//! - Invokes the tutor agent over the OpenAI Responses API
//!
//! # Architecture
//!
//! A request moves through a fixed pipeline:
//! 1. **Guardrail Evaluation** (`guardrails`) - every configured check runs against the input
//! 2. **PII Masking** (`workflow`) - non-blocking PII checks rewrite history in place
//! 3. **Gate** (`workflow`) - any tripwire ends the run with a `GuardrailFailReport`
//! 4. **Agent Invocation** (`runtime`) - the tutor agent answers the scrubbed history
//!
//! # Key Types
//!
//! - `Workflow` - main orchestrator (see `workflow` module)
//! - `GuardrailService` / `AgentRuntime` - seams to the hosted collaborators
//! - `BackendFactory` - builds per-request collaborators from a resolved credential
//!
//! # Safety Principle
//!
//! Text that trips any guardrail is never forwarded to the model, not even
//! in anonymized form.

pub mod backend;
pub mod guardrails;
pub mod llm;
pub mod openai;
pub mod prompts;
pub mod runtime;
pub mod session;
pub mod tools;
pub mod workflow;
