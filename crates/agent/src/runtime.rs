use anyhow::Result;
use async_trait::async_trait;
use tutor_core::config::{AgentConfig, ReasoningEffort, ReasoningSummary};
use tutor_core::{ConversationHistory, MessageItem};

use crate::prompts::TUTOR_INSTRUCTIONS;
use crate::tools::{HostedTool, ToolSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelSettings {
    pub reasoning_effort: ReasoningEffort,
    pub reasoning_summary: ReasoningSummary,
    pub store: bool,
}

/// An agent as the runtime sees it: who it is, what it may call, how it reasons.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentDefinition {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub tools: ToolSet,
    pub model_settings: ModelSettings,
}

impl AgentDefinition {
    pub fn tutor(config: &AgentConfig) -> Self {
        let mut tools = ToolSet::default();
        tools.register(HostedTool::web_search(config.search_context_size));

        Self {
            name: config.name.clone(),
            instructions: TUTOR_INSTRUCTIONS.to_string(),
            model: config.model.clone(),
            tools,
            model_settings: ModelSettings {
                reasoning_effort: config.reasoning_effort,
                reasoning_summary: config.reasoning_summary,
                store: config.store,
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentRunResult {
    /// `None` or empty means the agent produced nothing usable.
    pub final_output: Option<String>,
    /// Items the agent produced, in the shape they are appended to history.
    pub new_items: Vec<MessageItem>,
}

#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn run(
        &self,
        agent: &AgentDefinition,
        history: &ConversationHistory,
    ) -> Result<AgentRunResult>;
}
