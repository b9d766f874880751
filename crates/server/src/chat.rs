use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use tutor_agent::backend::BackendFactory;
use tutor_agent::guardrails::GuardrailFailReport;
use tutor_agent::workflow::{Workflow, WorkflowOutcome};
use tutor_core::config::AppConfig;
use tutor_core::{InterfaceError, WorkflowError, WorkflowInput};
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatState {
    config: Arc<AppConfig>,
    workflow: Arc<Workflow>,
    backend: Arc<dyn BackendFactory>,
}

impl ChatState {
    pub fn new(
        config: Arc<AppConfig>,
        workflow: Arc<Workflow>,
        backend: Arc<dyn BackendFactory>,
    ) -> Self {
        Self { config, workflow, backend }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
}

/// Either the tutor's answer or, when a guardrail tripped, the fail report.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatReply {
    Text(String),
    Blocked(GuardrailFailReport),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub response: ChatReply,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

type ChatResult = Result<Json<ChatResponse>, (StatusCode, Json<ChatError>)>;

pub fn router(state: ChatState) -> Router {
    Router::new().route("/api/chat", post(chat)).with_state(state)
}

pub async fn chat(
    State(state): State<ChatState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ChatResult {
    let correlation_id = Uuid::new_v4().to_string();

    let Json(request) = payload.map_err(|rejection| {
        warn!(
            event_name = "server.chat.rejected_body",
            correlation_id = %correlation_id,
            error = %rejection.body_text(),
            "chat request body could not be parsed"
        );
        (
            StatusCode::BAD_REQUEST,
            Json(ChatError { error: rejection.body_text(), details: None }),
        )
    })?;

    let Some(message) = request.message.filter(|message| !message.is_empty()) else {
        return Err(reject(
            WorkflowError::Validation("Message is required".to_string())
                .into_interface(correlation_id),
        ));
    };

    let api_key = state
        .config
        .resolve_api_key(request.api_key.as_deref())
        .map_err(|error| reject(error.into_interface(correlation_id.clone())))?;

    let deps = state
        .backend
        .connect(&api_key)
        .map_err(|error| reject(error.into_interface(correlation_id.clone())))?;

    info!(
        event_name = "server.chat.accepted",
        correlation_id = %correlation_id,
        message_chars = message.chars().count(),
        "running tutor workflow"
    );

    let mut input = WorkflowInput::new(message);
    let outcome = state
        .workflow
        .run_workflow(&mut input, &deps, &correlation_id)
        .await
        .map_err(|error| reject(error.into_interface(correlation_id.clone())))?;

    let response = match outcome {
        WorkflowOutcome::Blocked(report) => ChatReply::Blocked(report),
        WorkflowOutcome::Completed(result) => ChatReply::Text(result.output_text),
    };

    Ok(Json(ChatResponse { success: true, response }))
}

fn reject(error: InterfaceError) -> (StatusCode, Json<ChatError>) {
    match &error {
        InterfaceError::BadRequest { .. } => {
            warn!(
                event_name = "server.chat.bad_request",
                correlation_id = %error.correlation_id(),
                error = %error.user_message(),
                "chat request rejected"
            );
            (
                StatusCode::BAD_REQUEST,
                Json(ChatError { error: error.user_message().to_string(), details: None }),
            )
        }
        InterfaceError::Internal { details, .. } => {
            error!(
                event_name = "server.chat.failed",
                correlation_id = %error.correlation_id(),
                error = %details,
                "error running workflow"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatError {
                    error: error.user_message().to_string(),
                    details: Some(details.clone()),
                }),
            )
        }
    }
}
