use std::sync::Arc;
use std::time::Duration;

use arbot_core::category::Category;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::conversation::Determination;
use crate::llm::ClassifierClient;
use crate::prompts::{strict_system_prompt, CLASSIFIER_PROMPT};

/// Why the guard answered from the keyword heuristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    Unconfigured,
    Timeout,
    Transport,
    MissingCategory,
    UnknownCategory,
    PayloadNotString,
    PayloadNotJson,
}

impl FallbackReason {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Unconfigured => "classifier_unconfigured",
            Self::Timeout => "classifier_timeout",
            Self::Transport => "classifier_transport_failure",
            Self::MissingCategory => "classifier_missing_category",
            Self::UnknownCategory => "classifier_unknown_category",
            Self::PayloadNotString => "classifier_payload_not_string",
            Self::PayloadNotJson => "classifier_payload_not_json",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Classifier,
    Heuristic(FallbackReason),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub category: Category,
    pub determination: Determination,
    pub source: ClassificationSource,
}

impl Classification {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ClassificationSource::Heuristic(_))
    }

    fn heuristic(user_text: &str, reason: FallbackReason) -> Self {
        Self {
            category: heuristic_category(user_text),
            determination: Determination::default(),
            source: ClassificationSource::Heuristic(reason),
        }
    }
}

/// Checks a classifier reply against the strict contract: a known
/// `category` and a `determinationJson` string that parses as JSON.
pub fn validate_reply(reply: &Value) -> Result<(Category, Determination), FallbackReason> {
    let raw_category = reply
        .get("category")
        .and_then(Value::as_str)
        .filter(|category| !category.trim().is_empty())
        .ok_or(FallbackReason::MissingCategory)?;
    let category =
        raw_category.parse::<Category>().map_err(|_| FallbackReason::UnknownCategory)?;

    let payload = match reply.get("determinationJson") {
        Some(Value::String(payload)) => payload,
        _ => return Err(FallbackReason::PayloadNotString),
    };
    let determination =
        Determination::parse(payload).map_err(|_| FallbackReason::PayloadNotJson)?;

    Ok((category, determination))
}

/// Conservative keyword classifier. Always returns a category.
pub fn heuristic_category(user_text: &str) -> Category {
    let text = user_text.to_lowercase();
    let mentions_soa = text
        .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .any(|word| word == "soa");

    if text.contains("statement of account") || mentions_soa {
        Category::SoaRequest
    } else if text.contains("download") || text.contains("pdf") {
        Category::DownloadInvoice
    } else if text.contains("invoice") || text.contains("open items") {
        Category::InvoiceRequestQuery
    } else if text.contains("top") || text.contains("analytics") || text.contains("payment days") {
        Category::CustomerAnalytics
    } else {
        Category::GenericQuery
    }
}

/// Wraps the AI classifier so a turn always gets a valid category.
#[derive(Clone)]
pub struct ClassificationGuard {
    client: Option<Arc<dyn ClassifierClient>>,
    timeout: Duration,
    system_prompt: String,
}

impl ClassificationGuard {
    pub fn new(client: Arc<dyn ClassifierClient>, timeout: Duration) -> Self {
        Self {
            client: Some(client),
            timeout,
            system_prompt: strict_system_prompt(CLASSIFIER_PROMPT),
        }
    }

    pub fn heuristic_only() -> Self {
        Self {
            client: None,
            timeout: Duration::from_secs(30),
            system_prompt: strict_system_prompt(CLASSIFIER_PROMPT),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub async fn classify(&self, user_text: &str) -> Classification {
        let Some(client) = &self.client else {
            return Classification::heuristic(user_text, FallbackReason::Unconfigured);
        };

        let reply = match tokio::time::timeout(
            self.timeout,
            client.classify(user_text, &self.system_prompt),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(error)) => {
                warn!(
                    event_name = "classification.guard.transport_failed",
                    error = %error,
                    "classifier call failed, using keyword fallback"
                );
                return Classification::heuristic(user_text, FallbackReason::Transport);
            }
            Err(_) => {
                warn!(
                    event_name = "classification.guard.timeout",
                    timeout_ms = self.timeout.as_millis() as u64,
                    "classifier call timed out, using keyword fallback"
                );
                return Classification::heuristic(user_text, FallbackReason::Timeout);
            }
        };

        match validate_reply(&reply) {
            Ok((category, determination)) => {
                Classification { category, determination, source: ClassificationSource::Classifier }
            }
            Err(reason) => {
                let preview: String = reply.to_string().chars().take(200).collect();
                warn!(
                    event_name = "classification.guard.invalid_reply",
                    reason = reason.reason_code(),
                    reply_preview = %preview,
                    "classifier reply failed validation, using keyword fallback"
                );
                Classification::heuristic(user_text, reason)
            }
        }
    }
}
