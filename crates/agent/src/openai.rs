//! OpenAI HTTP client backing the agent runtime and the guardrail context.
//!
//! One client is built per request from the resolved credential, so a key
//! supplied by one caller is never visible to another.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tutor_core::config::OpenAiConfig;
use tutor_core::{ConversationHistory, MessageItem};

use crate::llm::{CompletionRequest, LlmClient, ModerationClient, ModerationVerdict};
use crate::runtime::{AgentDefinition, AgentRunResult, AgentRuntime};

pub const MODERATION_MODEL: &str = "omni-moderation-latest";

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig, api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build OpenAI HTTP client")?;

        Ok(Self { http, api_key, base_url: config.base_url.trim_end_matches('/').to_string() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        let text = response.text().await.with_context(|| format!("reading {url} response failed"))?;
        if !status.is_success() {
            return Err(anyhow!("OpenAI {path} returned {status}: {}", api_error_message(&text)));
        }

        serde_json::from_str(&text).with_context(|| format!("unexpected {path} response body"))
    }
}

#[async_trait]
impl AgentRuntime for OpenAiClient {
    async fn run(
        &self,
        agent: &AgentDefinition,
        history: &ConversationHistory,
    ) -> Result<AgentRunResult> {
        let body = responses_request(agent, history)?;
        let reply: ResponsesReply = self.post("responses", &body).await?;
        Ok(reply.into_run_result())
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = json!({
            "model": request.model,
            "instructions": request.instructions,
            "input": request.input,
            "store": false,
        });
        let reply: ResponsesReply = self.post("responses", &body).await?;
        Ok(reply.into_run_result().final_output.unwrap_or_default())
    }
}

#[async_trait]
impl ModerationClient for OpenAiClient {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict> {
        let body = json!({ "model": MODERATION_MODEL, "input": text });
        let reply: ModerationReply = self.post("moderations", &body).await?;
        Ok(reply.into_verdict())
    }
}

/// Request body for one agent turn over the Responses API.
pub fn responses_request(agent: &AgentDefinition, history: &ConversationHistory) -> Result<Value> {
    let input = serde_json::to_value(history).context("failed to encode conversation history")?;
    let settings = &agent.model_settings;

    Ok(json!({
        "model": agent.model,
        "instructions": agent.instructions,
        "input": input,
        "tools": agent.tools.to_request_json(),
        "reasoning": {
            "effort": settings.reasoning_effort.as_str(),
            "summary": settings.reasoning_summary.as_str(),
        },
        "store": settings.store,
    }))
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.pointer("/error/message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.chars().take(300).collect())
}

#[derive(Debug, Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputContent {
    OutputText {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl ResponsesReply {
    /// Assistant messages become history items; their text, concatenated,
    /// is the final output. Reasoning and tool-call items are dropped.
    fn into_run_result(self) -> AgentRunResult {
        let mut new_items = Vec::new();
        let mut final_output = String::new();

        for item in self.output {
            let OutputItem::Message { content } = item else {
                continue;
            };
            let text: String = content
                .into_iter()
                .filter_map(|part| match part {
                    OutputContent::OutputText { text } => Some(text),
                    OutputContent::Other => None,
                })
                .collect();
            if text.is_empty() {
                continue;
            }

            final_output.push_str(&text);
            new_items.push(MessageItem::assistant_text(text));
        }

        AgentRunResult {
            final_output: (!final_output.is_empty()).then_some(final_output),
            new_items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModerationReply {
    #[serde(default)]
    results: Vec<ModerationEntry>,
}

#[derive(Debug, Deserialize)]
struct ModerationEntry {
    flagged: bool,
    #[serde(default)]
    categories: BTreeMap<String, bool>,
}

impl ModerationReply {
    fn into_verdict(self) -> ModerationVerdict {
        let mut verdict = ModerationVerdict::default();
        for entry in self.results {
            verdict.flagged |= entry.flagged;
            for (category, hit) in entry.categories {
                if hit && !verdict.flagged_categories.contains(&category) {
                    verdict.flagged_categories.push(category);
                }
            }
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use tutor_core::config::AppConfig;
    use tutor_core::{ConversationHistory, MessageItem};

    use super::{
        api_error_message, responses_request, ModerationReply, OpenAiClient, ResponsesReply,
    };
    use crate::runtime::AgentDefinition;

    #[test]
    fn request_carries_agent_settings_and_history() {
        let config = AppConfig::default();
        let agent = AgentDefinition::tutor(&config.agent);
        let history = ConversationHistory::from_user_text("teach me guitar");

        let body = responses_request(&agent, &history).expect("request body");

        assert_eq!(body["model"], "gpt-5.2");
        assert_eq!(body["store"], true);
        assert_eq!(body["reasoning"], json!({ "effort": "low", "summary": "auto" }));
        assert_eq!(body["tools"][0]["type"], "web_search_preview");
        assert_eq!(
            body["input"],
            json!([{ "role": "user", "content": [{ "type": "input_text", "text": "teach me guitar" }] }])
        );
    }

    #[test]
    fn reply_keeps_assistant_messages_and_skips_reasoning() {
        let reply: ResponsesReply = serde_json::from_value(json!({
            "id": "resp_1",
            "output": [
                { "type": "reasoning", "summary": [] },
                { "type": "web_search_call", "status": "completed" },
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [
                        { "type": "output_text", "text": "Hi! I'm your tutor.", "annotations": [] }
                    ]
                }
            ]
        }))
        .expect("parse reply");

        let result = reply.into_run_result();

        assert_eq!(result.final_output.as_deref(), Some("Hi! I'm your tutor."));
        assert_eq!(result.new_items, vec![MessageItem::assistant_text("Hi! I'm your tutor.")]);
    }

    #[test]
    fn reply_without_text_has_no_final_output() {
        let reply: ResponsesReply =
            serde_json::from_value(json!({ "output": [{ "type": "reasoning" }] })).expect("parse");
        let result = reply.into_run_result();
        assert_eq!(result.final_output, None);
        assert!(result.new_items.is_empty());
    }

    #[test]
    fn moderation_reply_lists_true_categories() {
        let reply: ModerationReply = serde_json::from_value(json!({
            "results": [{
                "flagged": true,
                "categories": { "harassment": false, "violence/graphic": true, "illicit/violent": true }
            }]
        }))
        .expect("parse moderation");

        let verdict = reply.into_verdict();
        assert!(verdict.flagged);
        assert_eq!(verdict.flagged_categories, vec!["illicit/violent", "violence/graphic"]);
    }

    #[test]
    fn api_error_message_prefers_structured_message() {
        assert_eq!(
            api_error_message(r#"{"error": {"message": "Incorrect API key provided"}}"#),
            "Incorrect API key provided"
        );
        assert_eq!(api_error_message("bad gateway"), "bad gateway");
    }

    #[test]
    fn debug_output_redacts_key() {
        let mut config = AppConfig::default().openai;
        config.base_url = "https://proxy.example/v1/".to_string();
        let client = OpenAiClient::new(&config, SecretString::from("sk-live-secret".to_string()))
            .expect("build client");

        let rendered = format!("{client:?}");
        assert!(!rendered.contains("sk-live-secret"));
        assert_eq!(client.base_url(), "https://proxy.example/v1");
    }
}
