use std::sync::Arc;

use arbot_agent::conversation::{ResponseEnvelope, TurnRequest};
use arbot_agent::llm::ConversationArchive;
use arbot_agent::runtime::AgentRuntime;
use arbot_core::errors::InterfaceError;
use axum::extract::rejection::JsonRejection;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const CHAT_DATA_DELETED: &str = "Success!";

type ErrorResponse = (StatusCode, Json<ErrorBody>);

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<AgentRuntime>,
    archive: Option<Arc<dyn ConversationArchive>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    #[serde(default)]
    pub conversation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeleteAllResponse {
    pub message: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: &'static str,
    pub correlation_id: String,
}

/// `archive` is `None` when no AI engine is configured; the history and
/// delete routes then answer 503.
pub fn router(runtime: Arc<AgentRuntime>, archive: Option<Arc<dyn ConversationArchive>>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/history", post(history))
        .route("/chat/delete-all", post(delete_all))
        .with_state(ChatState { runtime, archive })
}

pub async fn chat(
    State(state): State<ChatState>,
    payload: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Json<ResponseEnvelope>, ErrorResponse> {
    let Json(request) = payload.map_err(rejected)?;

    let correlation_id = request.correlation_id();
    match state.runtime.handle_turn(request).await {
        Ok(envelope) => Ok(Json(envelope)),
        Err(failure) => {
            let interface = failure.into_interface(correlation_id);
            error!(
                event_name = "chat.turn.failed",
                correlation_id = %interface.correlation_id(),
                error = %interface,
                "chat turn failed"
            );
            Err(error_response(interface))
        }
    }
}

pub async fn history(
    State(state): State<ChatState>,
    payload: Result<Json<HistoryRequest>, JsonRejection>,
) -> Result<Json<Value>, ErrorResponse> {
    let Json(request) = payload.map_err(rejected)?;
    let conversation_id = request.conversation_id.trim().to_owned();
    if conversation_id.is_empty() {
        return Err(error_response(InterfaceError::BadRequest {
            message: "conversationId is required".to_owned(),
            correlation_id: Uuid::new_v4().to_string(),
        }));
    }

    let archive = configured_archive(&state, &conversation_id)?;
    match archive.history(&conversation_id).await {
        Ok(history) => Ok(Json(history)),
        Err(failure) => Err(archive_failed(&conversation_id, failure)),
    }
}

pub async fn delete_all(State(state): State<ChatState>) -> Result<Json<DeleteAllResponse>, ErrorResponse> {
    let correlation_id = Uuid::new_v4().to_string();
    let archive = configured_archive(&state, &correlation_id)?;
    match archive.delete_all().await {
        Ok(()) => {
            info!(
                event_name = "chat.archive.deleted_all",
                correlation_id = %correlation_id,
                "all chat data deleted"
            );
            Ok(Json(DeleteAllResponse { message: CHAT_DATA_DELETED }))
        }
        Err(failure) => Err(archive_failed(&correlation_id, failure)),
    }
}

fn configured_archive<'a>(
    state: &'a ChatState,
    correlation_id: &str,
) -> Result<&'a Arc<dyn ConversationArchive>, ErrorResponse> {
    state.archive.as_ref().ok_or_else(|| {
        warn!(
            event_name = "chat.archive.unconfigured",
            correlation_id = %correlation_id,
            "ai_engine.base_url is unset; conversation archive unavailable"
        );
        error_response(InterfaceError::ServiceUnavailable {
            message: "conversation archive is not configured".to_owned(),
            correlation_id: correlation_id.to_owned(),
        })
    })
}

fn archive_failed(correlation_id: &str, failure: anyhow::Error) -> ErrorResponse {
    error!(
        event_name = "downstream.ai_engine.archive_failed",
        correlation_id = %correlation_id,
        error = %format!("{failure:#}"),
        "conversation archive call failed"
    );
    error_response(InterfaceError::ServiceUnavailable {
        message: failure.to_string(),
        correlation_id: correlation_id.to_owned(),
    })
}

fn rejected(rejection: JsonRejection) -> ErrorResponse {
    let correlation_id = Uuid::new_v4().to_string();
    warn!(
        event_name = "chat.request.rejected",
        correlation_id = %correlation_id,
        error = %rejection.body_text(),
        "chat request body could not be read"
    );
    error_response(InterfaceError::BadRequest { message: rejection.body_text(), correlation_id })
}

fn error_response(error: InterfaceError) -> ErrorResponse {
    let (status, code) = match &error {
        InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
        InterfaceError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
        }
        InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    let body = ErrorBody {
        error: code,
        message: error.user_message(),
        correlation_id: error.correlation_id().to_owned(),
    };
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use arbot_agent::guardrails::ClassificationGuard;
    use arbot_agent::llm::{Answer, AnswerClient, AnswerRequest, ConversationArchive};
    use arbot_agent::runtime::AgentRuntime;
    use arbot_core::audit::InMemoryAuditSink;
    use arbot_core::flows::InMemorySessionStore;
    use arbot_core::render::UNCLASSIFIED_MESSAGE;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, CHAT_DATA_DELETED};

    struct DownAnswers;

    #[derive(Default)]
    struct RecordingArchive {
        fail: bool,
        histories: Mutex<Vec<String>>,
        deletions: Mutex<u32>,
    }

    #[async_trait]
    impl ConversationArchive for RecordingArchive {
        async fn history(&self, conversation_id: &str) -> Result<Value> {
            if self.fail {
                return Err(anyhow!("ai engine unreachable"));
            }
            self.histories.lock().unwrap().push(conversation_id.to_owned());
            Ok(json!([{"role": "user", "content": "show invoices"}]))
        }

        async fn delete_all(&self) -> Result<()> {
            if self.fail {
                return Err(anyhow!("ai engine unreachable"));
            }
            *self.deletions.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[async_trait]
    impl AnswerClient for DownAnswers {
        async fn answer(&self, _request: &AnswerRequest) -> Result<Answer> {
            Err(anyhow!("ai engine unreachable"))
        }
    }

    fn runtime() -> AgentRuntime {
        AgentRuntime::new(
            ClassificationGuard::heuristic_only(),
            Arc::new(InMemorySessionStore::default()),
            Arc::new(InMemoryAuditSink::default()),
        )
    }

    async fn post(app: Router, body: Value) -> (StatusCode, Value) {
        post_to(app, "/chat", body).await
    }

    async fn post_to(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unclassified_turn_returns_envelope() {
        let (status, body) = post(
            router(Arc::new(runtime()), None),
            json!({"conversationId": "c-1", "messageId": "m-1", "userQuery": "hello there"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "assistant");
        assert_eq!(body["content"], UNCLASSIFIED_MESSAGE);
        assert_eq!(body["messageId"], "m-1");
        assert_eq!(body["additionalContents"], "[]");
        assert!(body["messageTime"].is_string());
    }

    #[tokio::test]
    async fn blank_query_is_bad_request() {
        let (status, body) = post(
            router(Arc::new(runtime()), None),
            json!({"conversationId": "c-1", "messageId": "m-2", "userQuery": "   "}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
        assert_eq!(body["correlationId"], "m-2");
    }

    #[tokio::test]
    async fn unreadable_body_is_bad_request() {
        let (status, body) = post(router(Arc::new(runtime()), None), json!({"userQuery": 42})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
        assert!(body["correlationId"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn answer_failure_is_service_unavailable() {
        let app = router(Arc::new(runtime().with_answers(Arc::new(DownAnswers))), None);
        let (status, body) =
            post(app, json!({"conversationId": "c-1", "messageId": "m-3", "userQuery": "hello there"}))
                .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "service_unavailable");
        assert_eq!(body["message"], "The service is temporarily unavailable. Please retry shortly.");
        assert_eq!(body["correlationId"], "m-3");
    }

    #[tokio::test]
    async fn history_is_proxied_for_the_conversation() {
        let archive = Arc::new(RecordingArchive::default());
        let app = router(Arc::new(runtime()), Some(archive.clone()));

        let (status, body) = post_to(app, "/chat/history", json!({"conversationId": " c-7 "})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["content"], "show invoices");
        assert_eq!(*archive.histories.lock().unwrap(), vec!["c-7".to_owned()]);
    }

    #[tokio::test]
    async fn history_without_conversation_id_is_bad_request() {
        let archive = Arc::new(RecordingArchive::default());
        let app = router(Arc::new(runtime()), Some(archive.clone()));

        let (status, body) = post_to(app, "/chat/history", json!({})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
        assert!(archive.histories.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_all_reports_success() {
        let archive = Arc::new(RecordingArchive::default());
        let app = router(Arc::new(runtime()), Some(archive.clone()));

        let (status, body) = post_to(app, "/chat/delete-all", json!({})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], CHAT_DATA_DELETED);
        assert_eq!(*archive.deletions.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn archive_routes_are_unavailable_without_an_engine_or_on_failure() {
        let (status, body) =
            post_to(router(Arc::new(runtime()), None), "/chat/delete-all", json!({})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "service_unavailable");

        let failing = Arc::new(RecordingArchive { fail: true, ..RecordingArchive::default() });
        let (status, body) = post_to(
            router(Arc::new(runtime()), Some(failing)),
            "/chat/history",
            json!({"conversationId": "c-7"}),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["correlationId"], "c-7");
    }
}
