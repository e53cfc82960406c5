use std::sync::Arc;
use std::time::Duration;

use arbot_core::audit::{AuditCategory, AuditOutcome, AuditSink};
use arbot_core::category::Category;
use arbot_core::ports::CustomerAnalytics;
use arbot_core::render::{analytics_message, ANALYTICS_UNAVAILABLE};
use async_trait::async_trait;
use tracing::info;

use super::{bounded, report_downstream_failure, FlowHandler, TurnContext};
use crate::conversation::Reply;

const ANALYTICS_SERVICE: &str = "datasphere.customer_analytics";

pub struct AnalyticsHandler {
    analytics: Arc<dyn CustomerAnalytics>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl AnalyticsHandler {
    pub fn new(analytics: Arc<dyn CustomerAnalytics>, audit: Arc<dyn AuditSink>, timeout: Duration) -> Self {
        Self { analytics, audit, timeout }
    }
}

#[async_trait]
impl FlowHandler for AnalyticsHandler {
    fn category(&self) -> Category {
        Category::CustomerAnalytics
    }

    async fn handle(&self, turn: TurnContext<'_>) -> Reply {
        let restated = turn.determination.analytics_query();
        let question = if restated.is_empty() { turn.user_text() } else { restated.as_str() };

        match bounded(ANALYTICS_SERVICE, self.timeout, self.analytics.query(question)).await {
            Ok(result) => {
                info!(
                    event_name = "downstream.analytics.completed",
                    correlation_id = %turn.correlation_id,
                    conversation_id = %turn.conversation_id(),
                    highlights = result.highlights.len(),
                    "customer analytics returned"
                );
                self.audit.emit(
                    turn.audit_event(
                        "downstream.analytics.completed",
                        AuditCategory::Downstream,
                        AuditOutcome::Success,
                    )
                    .with_metadata("highlights", result.highlights.len().to_string()),
                );
                Reply::assistant(analytics_message(&result.highlights))
            }
            Err(error) => {
                report_downstream_failure(
                    self.audit.as_ref(),
                    &turn,
                    "downstream.analytics.failed",
                    &error,
                );
                Reply::assistant(ANALYTICS_UNAVAILABLE)
            }
        }
    }
}
