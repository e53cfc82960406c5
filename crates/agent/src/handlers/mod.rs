//! Deterministic category handlers. A handler always produces a reply;
//! collaborator failures become fixed user messages here.

pub mod analytics;
pub mod download;
pub mod invoice;
pub mod statement;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arbot_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use arbot_core::category::Category;
use arbot_core::errors::IntegrationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::conversation::{Determination, Reply, TurnRequest};

pub use analytics::AnalyticsHandler;
pub use download::DownloadHandler;
pub use invoice::InvoiceHandler;
pub use statement::StatementHandler;

/// Everything a handler may read about the current turn.
#[derive(Clone, Copy, Debug)]
pub struct TurnContext<'a> {
    pub request: &'a TurnRequest,
    pub correlation_id: &'a str,
    pub determination: &'a Determination,
    pub now: DateTime<Utc>,
}

impl TurnContext<'_> {
    pub fn conversation_id(&self) -> &str {
        &self.request.conversation_id
    }

    pub fn user_text(&self) -> &str {
        &self.request.user_query
    }

    pub(crate) fn audit_event(
        &self,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent::new(self.conversation_id(), self.correlation_id, event_type, category, outcome)
    }
}

#[async_trait]
pub trait FlowHandler: Send + Sync {
    fn category(&self) -> Category;
    async fn handle(&self, turn: TurnContext<'_>) -> Reply;
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Category, Arc<dyn FlowHandler>>,
}

impl HandlerRegistry {
    pub fn register<H>(&mut self, handler: H)
    where
        H: FlowHandler + 'static,
    {
        self.handlers.insert(handler.category(), Arc::new(handler));
    }

    pub fn get(&self, category: Category) -> Option<Arc<dyn FlowHandler>> {
        self.handlers.get(&category).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Runs a collaborator call under a deadline.
pub(crate) async fn bounded<T, F>(
    service: &str,
    timeout: Duration,
    call: F,
) -> Result<T, IntegrationError>
where
    F: Future<Output = Result<T, IntegrationError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(IntegrationError::timeout(service, timeout)),
    }
}

/// Logs and audits a failed downstream call.
pub(crate) fn report_downstream_failure(
    audit: &dyn AuditSink,
    turn: &TurnContext<'_>,
    event_type: &str,
    error: &IntegrationError,
) {
    warn!(
        event_name = event_type,
        correlation_id = %turn.correlation_id,
        conversation_id = %turn.conversation_id(),
        service = %error.service(),
        error = %error,
        "downstream call failed"
    );
    audit.emit(
        turn.audit_event(event_type, AuditCategory::Downstream, AuditOutcome::Failed)
            .with_metadata("service", error.service())
            .with_metadata("error", error.to_string()),
    );
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use arbot_core::errors::IntegrationError;

    use super::bounded;

    #[tokio::test]
    async fn bounded_maps_elapsed_deadline_to_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, IntegrationError>(1)
        };
        let error = bounded("otc.search", Duration::from_millis(5), slow).await.err();
        assert_eq!(
            error,
            Some(IntegrationError::Timeout { service: "otc.search".to_string(), timeout_ms: 5 })
        );

        let fast = async { Ok::<_, IntegrationError>(7) };
        assert_eq!(bounded("otc.search", Duration::from_secs(1), fast).await, Ok(7));
    }
}
