use anyhow::Result;
use async_trait::async_trait;
use arbot_core::category::Category;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sends an utterance plus the classification prompt to the AI engine and
/// returns its raw JSON reply. Shape validation belongs to the guard.
#[async_trait]
pub trait ClassifierClient: Send + Sync {
    async fn classify(&self, user_text: &str, system_prompt: &str) -> Result<Value>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub conversation_id: String,
    pub message_id: Option<String>,
    pub message_time: Option<String>,
    pub user_id: Option<String>,
    pub user_query: String,
    pub category: Category,
    pub prompt: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub additional_contents: Vec<Value>,
}

/// Retrieval-augmented answer for categories without a deterministic flow.
#[async_trait]
pub trait AnswerClient: Send + Sync {
    async fn answer(&self, request: &AnswerRequest) -> Result<Answer>;
}

/// Conversation transcripts the AI engine keeps for its answers.
#[async_trait]
pub trait ConversationArchive: Send + Sync {
    /// Raw history for one conversation, as the engine returns it.
    async fn history(&self, conversation_id: &str) -> Result<Value>;
    /// Drops every stored conversation.
    async fn delete_all(&self) -> Result<()>;
}
