use anyhow::Result;
use async_trait::async_trait;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub instructions: String,
    pub input: String,
}

/// Plain text completion, used by the LLM-backed guardrail checks.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModerationVerdict {
    pub flagged: bool,
    pub flagged_categories: Vec<String>,
}

/// Hosted moderation classifier.
#[async_trait]
pub trait ModerationClient: Send + Sync {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict>;
}
