use std::sync::Arc;
use std::time::Duration;

use arbot_core::audit::{AuditCategory, AuditOutcome, AuditSink};
use arbot_core::category::Category;
use arbot_core::extract::compact_date;
use arbot_core::ports::{EStatus, StatementDocuments, StatementRequest};
use arbot_core::render::{statement_message, DocumentOutcome};
use async_trait::async_trait;
use tracing::info;

use super::{bounded, report_downstream_failure, FlowHandler, TurnContext};
use crate::conversation::{Determination, Reply};

const PRECHECK_SERVICE: &str = "otc.soa_status";
const LINK_SERVICE: &str = "otc.soa_link";

/// Builds the statement request when company, customer and a parseable
/// as-of date are all present.
pub fn statement_request(determination: &Determination) -> Option<StatementRequest> {
    let company_code = determination.company_code();
    let customer_code = determination.customer_code();
    let as_of_date = compact_date(&determination.as_of_date());
    if company_code.is_empty() || customer_code.is_empty() || as_of_date.is_empty() {
        return None;
    }
    Some(StatementRequest { company_code, customer_code, as_of_date })
}

pub struct StatementHandler {
    statements: Arc<dyn StatementDocuments>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl StatementHandler {
    pub fn new(
        statements: Arc<dyn StatementDocuments>,
        audit: Arc<dyn AuditSink>,
        timeout: Duration,
    ) -> Self {
        Self { statements, audit, timeout }
    }

    async fn outcome(&self, turn: &TurnContext<'_>, request: &StatementRequest) -> DocumentOutcome {
        let precheck =
            match bounded(PRECHECK_SERVICE, self.timeout, self.statements.precheck(request)).await {
                Ok(precheck) => precheck,
                Err(error) => {
                    report_downstream_failure(self.audit.as_ref(), turn, "downstream.soa.failed", &error);
                    return DocumentOutcome::Unavailable;
                }
            };
        if precheck.status != EStatus::Success {
            return DocumentOutcome::from_precheck(&precheck, None);
        }

        match bounded(LINK_SERVICE, self.timeout, self.statements.link(request)).await {
            Ok(link) => DocumentOutcome::from_precheck(&precheck, Some(&link)),
            Err(error) => {
                report_downstream_failure(self.audit.as_ref(), turn, "downstream.soa.failed", &error);
                DocumentOutcome::Unavailable
            }
        }
    }
}

#[async_trait]
impl FlowHandler for StatementHandler {
    fn category(&self) -> Category {
        Category::SoaRequest
    }

    async fn handle(&self, turn: TurnContext<'_>) -> Reply {
        let request = statement_request(turn.determination);
        let outcome = match &request {
            Some(request) => self.outcome(&turn, request).await,
            None => DocumentOutcome::MissingDetails,
        };

        let (label, audit_outcome) = match outcome {
            DocumentOutcome::MissingDetails => ("missing_details", AuditOutcome::Rejected),
            DocumentOutcome::Rejected(_) => ("rejected", AuditOutcome::Rejected),
            DocumentOutcome::Ready { .. } => ("ready", AuditOutcome::Success),
            DocumentOutcome::Unavailable => ("unavailable", AuditOutcome::Failed),
        };
        let request = request.unwrap_or_default();
        info!(
            event_name = "flow.soa.resolved",
            correlation_id = %turn.correlation_id,
            conversation_id = %turn.conversation_id(),
            company_code = %request.company_code,
            customer_code = %request.customer_code,
            as_of_date = %request.as_of_date,
            outcome = label,
            "statement request resolved"
        );
        self.audit.emit(
            turn.audit_event("flow.soa.resolved", AuditCategory::Response, audit_outcome)
                .with_metadata("outcome", label),
        );

        Reply::assistant(statement_message(&outcome))
    }
}
