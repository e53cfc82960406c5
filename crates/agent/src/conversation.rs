use arbot_core::errors::DomainError;
use arbot_core::flows::ClassifierSeed;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One inbound user message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub conversation_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub message_time: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub user_query: String,
}

impl TurnRequest {
    pub fn new(conversation_id: impl Into<String>, user_query: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_query: user_query.into(),
            ..Self::default()
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// The caller's message id, or a fresh UUID when none was sent.
    pub fn correlation_id(&self) -> String {
        self.message_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.conversation_id.trim().is_empty() {
            return Err(DomainError::InvariantViolation("conversationId is required".to_string()));
        }
        if self.user_query.trim().is_empty() {
            return Err(DomainError::InvariantViolation("userQuery is required".to_string()));
        }
        Ok(())
    }
}

/// Structured fields the classifier attached to its category. Values may
/// arrive as strings or numbers; absent keys read as empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Determination(Map<String, Value>);

impl Determination {
    /// Parses the classifier's `determinationJson` string. Valid JSON that
    /// is not an object yields an empty determination.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let raw = if raw.trim().is_empty() { "{}" } else { raw };
        Ok(Self::from(serde_json::from_str::<Value>(raw)?))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First key holding a non-empty scalar, trimmed.
    pub fn text(&self, keys: &[&str]) -> String {
        keys.iter()
            .find_map(|key| match self.0.get(*key)? {
                Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn invoice_number(&self) -> String {
        self.text(&["invoiceNumber"])
    }

    pub fn company_code(&self) -> String {
        self.text(&["companyCode"])
    }

    pub fn customer_code(&self) -> String {
        self.text(&["customerCode"])
    }

    pub fn as_of_date(&self) -> String {
        self.text(&["asOfDate"])
    }

    pub fn analytics_query(&self) -> String {
        self.text(&["analyticsQuery"])
    }

    /// `Some` only for an explicit `"X"` or `""`.
    pub fn open_item(&self) -> Option<String> {
        match self.0.get("openItem") {
            Some(Value::String(flag)) if flag == "X" || flag.is_empty() => Some(flag.clone()),
            _ => None,
        }
    }

    /// First-turn hints for the invoice reducer.
    pub fn to_seed(&self) -> ClassifierSeed {
        ClassifierSeed {
            company_code: self.company_code(),
            fiscal_year: self.text(&["fiscalYear", "FiscalYear"]),
            open_item: self.open_item(),
            date_range: self.text(&["dateRange"]),
            date_from: self.text(&["dateFrom"]),
            date_to: self.text(&["dateTo"]),
            legacy_query: self.text(&["query"]),
        }
    }
}

impl From<Value> for Determination {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self(fields),
            _ => Self::default(),
        }
    }
}

/// Message produced by a handler or the answer client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub role: String,
    pub content: String,
    pub additional_contents: Vec<Value>,
}

impl Reply {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into(), additional_contents: Vec::new() }
    }
}

/// Wire response for a turn. `additionalContents` is a serialized JSON array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub role: String,
    pub content: String,
    pub message_time: String,
    pub message_id: Option<String>,
    pub additional_contents: String,
}

impl ResponseEnvelope {
    pub fn new(reply: Reply, message_id: Option<String>, now: DateTime<Utc>) -> Self {
        let additional_contents =
            serde_json::to_string(&reply.additional_contents).unwrap_or_else(|_| "[]".to_string());
        Self {
            role: reply.role,
            content: reply.content,
            message_time: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            message_id,
            additional_contents,
        }
    }
}
