use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    service: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
}

pub fn router(service: impl Into<String>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { service: service.into() })
}

pub async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", service: state.service })
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, Json};
    use serde_json::json;

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_reports_healthy_with_agent_name() {
        let Json(payload) =
            health(State(HealthState { service: "My Personal Tutor".to_string() })).await;

        assert_eq!(
            serde_json::to_value(&payload).expect("serialize"),
            json!({ "status": "healthy", "service": "My Personal Tutor" })
        );
    }
}
