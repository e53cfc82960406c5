//! AI engine endpoints: classification, retrieval-augmented answers, usage
//! metering and the conversation archive.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use arbot_agent::llm::{Answer, AnswerClient, AnswerRequest, ClassifierClient, ConversationArchive};
use arbot_core::errors::IntegrationError;
use arbot_core::ports::{UsageLogger, UsageRecord};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{join_url, request_error};

const SERVICE: &str = "ai_engine";
const USAGE_SERVICE: &str = "ai_engine.usage";
const ARCHIVE_SERVICE: &str = "ai_engine.archive";

const TABLE_NAME: &str = "SAP_TISCE_DEMO_DOCUMENTCHUNK";
const EMBEDDING_COLUMN: &str = "EMBEDDING";
const CONTENT_COLUMN: &str = "TEXT_CHUNK";

#[derive(Serialize)]
struct ClassifyBody<'a> {
    user_query: &'a str,
    #[serde(rename = "systemPrompt")]
    system_prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryBody<'a> {
    conversation_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RagBody<'a> {
    conversation_id: &'a str,
    message_id: Option<&'a str>,
    #[serde(rename = "message_time")]
    message_time: Option<&'a str>,
    #[serde(rename = "user_id")]
    user_id: Option<&'a str>,
    user_query: &'a str,
    app_id: &'a str,
    table_name: &'a str,
    embedding_column: &'a str,
    content_column: &'a str,
    prompt: &'a str,
    top_k: u32,
}

/// The `completion` field arrives as a JSON string, an object, or not at
/// all, in which case the top-level `content` is the answer.
pub fn read_completion(body: &Value) -> (String, String) {
    let completion = match body.get("completion") {
        Some(Value::String(raw)) => {
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| json!({"content": raw}))
        }
        Some(object @ Value::Object(_)) => object.clone(),
        _ => json!({"content": body.get("content").cloned().unwrap_or(Value::Null)}),
    };

    let role = completion.get("role").and_then(Value::as_str).unwrap_or("assistant").to_owned();
    let content = match completion.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    (role, content)
}

/// `additionalContents` as an array, or a JSON string holding one. Anything
/// unreadable becomes empty.
pub fn read_additional_contents(body: &Value) -> Vec<Value> {
    match body.get("additionalContents") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

pub fn usage_payload(source_service: &str, record: &UsageRecord) -> Value {
    json!({
        "sourceService": source_service,
        "category": record.category,
        "isDeterministic": record.is_deterministic,
        "durationMs": record.duration_ms,
        "conversationId": record.conversation_id,
        "messageId": record.message_id,
        "userId": record.user_id,
        "tenantId": "",
    })
}

pub struct AiEngineClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    app_id: String,
    source_service: String,
    top_k: u32,
    timeout: Duration,
}

impl AiEngineClient {
    pub fn new(client: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: None,
            app_id: String::new(),
            source_service: String::new(),
            top_k: 5,
            timeout,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_app(mut self, app_id: impl Into<String>, source_service: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self.source_service = source_service.into();
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.client.post(join_url(&self.base_url, path)).timeout(self.timeout);
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }

    async fn post_json<B: Serialize + Sync>(&self, service: &str, path: &str, body: &B) -> Result<Value, IntegrationError> {
        self.read_json(service, self.post(path).json(body)).await
    }

    /// Sends the request; an empty success body reads as `Null`.
    async fn read_json(&self, service: &str, request: RequestBuilder) -> Result<Value, IntegrationError> {
        let response = request
            .send()
            .await
            .map_err(|error| request_error(service, self.timeout, error))?;
        if !response.status().is_success() {
            return Err(IntegrationError::Status {
                service: service.to_owned(),
                status: response.status().as_u16(),
            });
        }
        let text = response
            .text()
            .await
            .map_err(|error| IntegrationError::decode(service, error.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|error| IntegrationError::decode(service, error.to_string()))
    }
}

#[async_trait]
impl ClassifierClient for AiEngineClient {
    async fn classify(&self, user_text: &str, system_prompt: &str) -> Result<Value> {
        let body = ClassifyBody { user_query: user_text, system_prompt };
        let reply = self
            .post_json(SERVICE, "/classifyUserQuery", &body)
            .await
            .context("classifyUserQuery failed")?;
        debug!(event_name = "downstream.ai_engine.classified", "classifier replied");
        Ok(reply)
    }
}

#[async_trait]
impl AnswerClient for AiEngineClient {
    async fn answer(&self, request: &AnswerRequest) -> Result<Answer> {
        let body = RagBody {
            conversation_id: &request.conversation_id,
            message_id: request.message_id.as_deref(),
            message_time: request.message_time.as_deref(),
            user_id: request.user_id.as_deref(),
            user_query: &request.user_query,
            app_id: &self.app_id,
            table_name: TABLE_NAME,
            embedding_column: EMBEDDING_COLUMN,
            content_column: CONTENT_COLUMN,
            prompt: &request.prompt,
            top_k: self.top_k,
        };
        let reply = self.post_json(SERVICE, "/ragWithSdk", &body).await.context("ragWithSdk failed")?;
        if reply.is_null() {
            return Err(anyhow!("ragWithSdk returned an empty body"));
        }

        let (role, content) = read_completion(&reply);
        let additional_contents = read_additional_contents(&reply);
        info!(
            event_name = "downstream.ai_engine.answered",
            correlation_id = %request.conversation_id,
            category = %request.category,
            additional_contents = additional_contents.len(),
            "generic answer received"
        );
        Ok(Answer { role, content, additional_contents })
    }
}

#[async_trait]
impl UsageLogger for AiEngineClient {
    async fn log(&self, record: UsageRecord) -> Result<(), IntegrationError> {
        let payload = usage_payload(&self.source_service, &record);
        self.post_json(USAGE_SERVICE, "/logUsage", &payload).await.map(|_| ())
    }
}

#[async_trait]
impl ConversationArchive for AiEngineClient {
    async fn history(&self, conversation_id: &str) -> Result<Value> {
        let body = HistoryBody { conversation_id };
        let history = self
            .post_json(ARCHIVE_SERVICE, "/getConversationHistory", &body)
            .await
            .context("getConversationHistory failed")?;
        debug!(
            event_name = "downstream.ai_engine.history_read",
            correlation_id = %conversation_id,
            "conversation history read"
        );
        Ok(history)
    }

    async fn delete_all(&self) -> Result<()> {
        self.read_json(ARCHIVE_SERVICE, self.post("/deleteAllChatData"))
            .await
            .context("deleteAllChatData failed")?;
        info!(event_name = "downstream.ai_engine.chat_data_deleted", "all chat data deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use arbot_core::category::Category;
    use arbot_core::ports::UsageRecord;
    use serde_json::json;

    use super::{read_additional_contents, read_completion, usage_payload, HistoryBody, RagBody};

    #[test]
    fn completion_as_json_string() {
        let body = json!({"completion": "{\"role\":\"assistant\",\"content\":\"Use the portal.\"}"});
        assert_eq!(read_completion(&body), ("assistant".to_owned(), "Use the portal.".to_owned()));
    }

    #[test]
    fn completion_as_plain_string_object_or_missing() {
        let plain = json!({"completion": "Just text"});
        assert_eq!(read_completion(&plain).1, "Just text");

        let object = json!({"completion": {"role": "system", "content": "Object form"}});
        assert_eq!(read_completion(&object), ("system".to_owned(), "Object form".to_owned()));

        let missing = json!({"content": "Top level"});
        assert_eq!(read_completion(&missing), ("assistant".to_owned(), "Top level".to_owned()));
        assert_eq!(read_completion(&json!({})).1, "");
    }

    #[test]
    fn additional_contents_from_string_or_array() {
        let encoded = json!({"additionalContents": "[{\"page\":2}]"});
        assert_eq!(read_additional_contents(&encoded), vec![json!({"page": 2})]);

        let array = json!({"additionalContents": [{"page": 3}]});
        assert_eq!(read_additional_contents(&array).len(), 1);

        let broken = json!({"additionalContents": "[{"});
        assert!(read_additional_contents(&broken).is_empty());
        assert!(read_additional_contents(&json!({})).is_empty());
    }

    #[test]
    fn usage_payload_uses_wire_names() {
        let record = UsageRecord {
            category: Category::DownloadInvoice,
            is_deterministic: true,
            duration_ms: 42,
            conversation_id: "c-1".to_owned(),
            message_id: "m-1".to_owned(),
            user_id: None,
        };
        let payload = usage_payload("ar-chatbot", &record);
        assert_eq!(payload["sourceService"], "ar-chatbot");
        assert_eq!(payload["category"], "download-invoice");
        assert_eq!(payload["isDeterministic"], true);
        assert_eq!(payload["durationMs"], 42);
        assert_eq!(payload["tenantId"], "");
        assert!(payload["userId"].is_null());
    }

    #[test]
    fn rag_body_field_names() {
        let body = RagBody {
            conversation_id: "c-1",
            message_id: Some("m-1"),
            message_time: None,
            user_id: Some("u-1"),
            user_query: "how do I reset my password",
            app_id: "ar-bot",
            table_name: super::TABLE_NAME,
            embedding_column: super::EMBEDDING_COLUMN,
            content_column: super::CONTENT_COLUMN,
            prompt: "Answer briefly.",
            top_k: 5,
        };
        let encoded = serde_json::to_value(&body).unwrap();
        assert_eq!(encoded["conversationId"], "c-1");
        assert_eq!(encoded["messageId"], "m-1");
        assert!(encoded["message_time"].is_null());
        assert_eq!(encoded["user_id"], "u-1");
        assert_eq!(encoded["userQuery"], "how do I reset my password");
        assert_eq!(encoded["tableName"], "SAP_TISCE_DEMO_DOCUMENTCHUNK");
        assert_eq!(encoded["embeddingColumn"], "EMBEDDING");
        assert_eq!(encoded["contentColumn"], "TEXT_CHUNK");
        assert_eq!(encoded["topK"], 5);
    }

    #[test]
    fn history_body_field_name() {
        let encoded = serde_json::to_value(HistoryBody { conversation_id: "c-9" }).unwrap();
        assert_eq!(encoded, json!({"conversationId": "c-9"}));
    }
}
