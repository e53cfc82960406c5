//! Collaborator contracts consumed by the deterministic flows. Transports
//! live outside the core crate.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::category::Category;
use crate::errors::IntegrationError;

pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchOptions {
    pub top: u64,
    pub skip: u64,
    pub want_count: bool,
    pub timeout: Duration,
}

impl SearchOptions {
    pub fn page(top: u64, skip: u64) -> Self {
        Self { top, skip, want_count: true, timeout: DEFAULT_SEARCH_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One backend invoice row. Field names vary between backends, so lookups
/// go through alias lists.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceRecord(pub Map<String, Value>);

impl InvoiceRecord {
    /// First alias holding a non-empty scalar, rendered as text.
    pub fn field(&self, aliases: &[&str]) -> Option<String> {
        aliases.iter().find_map(|alias| match self.0.get(*alias)? {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        })
    }
}

impl From<Value> for InvoiceRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self(fields),
            _ => Self::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub items: Vec<InvoiceRecord>,
    pub total_count: Option<u64>,
}

#[async_trait]
pub trait InvoiceSearch: Send + Sync {
    async fn search(
        &self,
        legacy_filter: &str,
        user_text: &str,
        options: SearchOptions,
    ) -> Result<SearchPage, IntegrationError>;
}

/// Upstream business status. `S` success, `E` error, anything else unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EStatus {
    #[serde(rename = "S")]
    Success,
    #[serde(rename = "E")]
    Error,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

impl EStatus {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "S" => Self::Success,
            "E" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precheck {
    pub status: EStatus,
    pub message: String,
}

impl Precheck {
    pub fn error(message: impl Into<String>) -> Self {
        Self { status: EStatus::Error, message: message.into() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLink {
    pub url: String,
}

#[async_trait]
pub trait InvoiceDocuments: Send + Sync {
    async fn precheck(&self, invoice_number: &str) -> Result<Precheck, IntegrationError>;
    async fn link(&self, invoice_number: &str) -> Result<DocumentLink, IntegrationError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementRequest {
    pub company_code: String,
    pub customer_code: String,
    /// `YYYYMMDD`.
    pub as_of_date: String,
}

#[async_trait]
pub trait StatementDocuments: Send + Sync {
    async fn precheck(&self, request: &StatementRequest) -> Result<Precheck, IntegrationError>;
    async fn link(&self, request: &StatementRequest) -> Result<DocumentLink, IntegrationError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsResult {
    pub highlights: Vec<String>,
}

#[async_trait]
pub trait CustomerAnalytics: Send + Sync {
    async fn query(&self, question: &str) -> Result<AnalyticsResult, IntegrationError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub category: Category,
    pub is_deterministic: bool,
    pub duration_ms: u64,
    pub conversation_id: String,
    pub message_id: String,
    pub user_id: Option<String>,
}

#[async_trait]
pub trait UsageLogger: Send + Sync {
    async fn log(&self, record: UsageRecord) -> Result<(), IntegrationError>;
}
