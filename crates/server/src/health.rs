use std::sync::Arc;

use arbot_agent::runtime::AgentRuntime;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionsCheck {
    pub active: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub sessions: SessionsCheck,
    pub checked_at: String,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { runtime })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let now = Utc::now();
    let sessions = state.runtime.sessions();
    sessions.evict_expired(now).await;
    let active = sessions.len().await;

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: format!(
                "arbot-server runtime initialized with {} deterministic handlers",
                state.runtime.handler_count()
            ),
        },
        sessions: SessionsCheck { active },
        checked_at: now.to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}
