use std::sync::Arc;

use axum::Router;
use tower_http::services::ServeDir;
use tracing::{info, warn};
use tutor_agent::backend::{BackendFactory, OpenAiBackend};
use tutor_agent::workflow::Workflow;
use tutor_core::config::AppConfig;

use crate::{chat, health};

pub struct Application {
    pub config: Arc<AppConfig>,
    pub workflow: Arc<Workflow>,
    pub backend: Arc<dyn BackendFactory>,
}

pub fn bootstrap_with_config(config: AppConfig) -> Application {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        agent = %config.agent.name,
        model = %config.agent.model,
        "starting application bootstrap"
    );

    if config.openai.api_key.is_none() {
        warn!(
            event_name = "system.bootstrap.credential_missing",
            correlation_id = "bootstrap",
            "no OpenAI API key configured; requests must supply apiKey"
        );
    }

    let workflow = Arc::new(Workflow::from_config(&config));
    info!(
        event_name = "system.bootstrap.guardrails_loaded",
        correlation_id = "bootstrap",
        guardrail_count = workflow.guardrails().guardrails.len(),
        "guardrail configuration loaded"
    );

    let backend: Arc<dyn BackendFactory> = Arc::new(OpenAiBackend::new(config.openai.clone()));
    Application { config: Arc::new(config), workflow, backend }
}

impl Application {
    /// Chat and health routes, with the public directory as fallback.
    pub fn router(&self) -> Router {
        let state =
            chat::ChatState::new(self.config.clone(), self.workflow.clone(), self.backend.clone());

        chat::router(state)
            .merge(health::router(self.config.agent.name.clone()))
            .fallback_service(ServeDir::new(&self.config.server.public_dir))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use tutor_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap_with_config;

    #[test]
    fn bootstrap_applies_overrides() {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                server_port: Some(4100),
                openai_api_key: Some("sk-override".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("config should load");
        let app = bootstrap_with_config(config);

        assert_eq!(app.config.server.port, 4100);
        assert!(app.config.openai.api_key.is_some());
        assert_eq!(app.workflow.agent().name, "My Personal Tutor");
    }

    #[tokio::test]
    async fn router_serves_health_and_public_files() {
        let public = tempfile::tempdir().expect("tempdir");
        std::fs::write(public.path().join("index.html"), "<h1>Tutor</h1>").expect("write index");

        let mut config = AppConfig::default();
        config.server.public_dir = public.path().to_path_buf();
        let router = bootstrap_with_config(config).router();

        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("health response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.expect("body");
        let value: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value, json!({ "status": "healthy", "service": "My Personal Tutor" }));

        let response = router
            .oneshot(Request::get("/index.html").body(Body::empty()).expect("request"))
            .await
            .expect("static response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.expect("body");
        assert_eq!(&body[..], b"<h1>Tutor</h1>");
    }

    #[tokio::test]
    async fn malformed_chat_body_is_bad_request() {
        let router = bootstrap_with_config(AppConfig::default()).router();

        let response = router
            .oneshot(
                Request::post("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .expect("request"),
            )
            .await
            .expect("chat response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
