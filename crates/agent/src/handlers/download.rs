use std::sync::Arc;
use std::time::Duration;

use arbot_core::audit::{AuditCategory, AuditOutcome, AuditSink};
use arbot_core::category::Category;
use arbot_core::extract::{normalize_invoice_digits, pick_longest_digit_run};
use arbot_core::ports::{EStatus, InvoiceDocuments};
use arbot_core::render::{download_message, DocumentOutcome};
use async_trait::async_trait;
use tracing::info;

use super::{bounded, report_downstream_failure, FlowHandler, TurnContext};
use crate::conversation::Reply;

const PRECHECK_SERVICE: &str = "otc.invoice_pdf_status";
const LINK_SERVICE: &str = "otc.invoice_pdf_link";

/// Invoice number for a download turn: digits typed by the user win over
/// the classifier's field. Both are padded to ten digits.
pub fn resolve_invoice_number(user_text: &str, classified: &str) -> String {
    let typed = normalize_invoice_digits(&pick_longest_digit_run(user_text));
    if typed.is_empty() {
        normalize_invoice_digits(classified)
    } else {
        typed
    }
}

pub struct DownloadHandler {
    documents: Arc<dyn InvoiceDocuments>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl DownloadHandler {
    pub fn new(documents: Arc<dyn InvoiceDocuments>, audit: Arc<dyn AuditSink>, timeout: Duration) -> Self {
        Self { documents, audit, timeout }
    }

    async fn outcome(&self, turn: &TurnContext<'_>, invoice: &str) -> DocumentOutcome {
        let precheck =
            match bounded(PRECHECK_SERVICE, self.timeout, self.documents.precheck(invoice)).await {
                Ok(precheck) => precheck,
                Err(error) => {
                    report_downstream_failure(
                        self.audit.as_ref(),
                        turn,
                        "downstream.invoice_pdf.failed",
                        &error,
                    );
                    return DocumentOutcome::Unavailable;
                }
            };

        if precheck.status != EStatus::Success {
            return DocumentOutcome::from_precheck(&precheck, None);
        }

        match bounded(LINK_SERVICE, self.timeout, self.documents.link(invoice)).await {
            Ok(link) => DocumentOutcome::from_precheck(&precheck, Some(&link)),
            Err(error) => {
                report_downstream_failure(
                    self.audit.as_ref(),
                    turn,
                    "downstream.invoice_pdf.failed",
                    &error,
                );
                DocumentOutcome::Unavailable
            }
        }
    }
}

#[async_trait]
impl FlowHandler for DownloadHandler {
    fn category(&self) -> Category {
        Category::DownloadInvoice
    }

    async fn handle(&self, turn: TurnContext<'_>) -> Reply {
        let invoice =
            resolve_invoice_number(turn.user_text(), &turn.determination.invoice_number());
        let outcome = if invoice.is_empty() {
            DocumentOutcome::MissingDetails
        } else {
            self.outcome(&turn, &invoice).await
        };

        let outcome_label = match &outcome {
            DocumentOutcome::MissingDetails => "missing_details",
            DocumentOutcome::Rejected(_) => "rejected",
            DocumentOutcome::Ready { .. } => "ready",
            DocumentOutcome::Unavailable => "unavailable",
        };
        info!(
            event_name = "flow.download.resolved",
            correlation_id = %turn.correlation_id,
            conversation_id = %turn.conversation_id(),
            invoice_number = %invoice,
            outcome = outcome_label,
            "invoice download resolved"
        );
        let audit_outcome = match outcome {
            DocumentOutcome::Ready { .. } => AuditOutcome::Success,
            DocumentOutcome::MissingDetails | DocumentOutcome::Rejected(_) => AuditOutcome::Rejected,
            DocumentOutcome::Unavailable => AuditOutcome::Failed,
        };
        self.audit.emit(
            turn.audit_event("flow.download.resolved", AuditCategory::Response, audit_outcome)
                .with_metadata("invoice_number", invoice.clone())
                .with_metadata("outcome", outcome_label),
        );

        Reply::assistant(download_message(&invoice, &outcome))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use arbot_core::audit::InMemoryAuditSink;
    use arbot_core::ports::{DocumentLink, EStatus, Precheck};
    use chrono::Utc;
    use serde_json::json;

    use super::{resolve_invoice_number, DownloadHandler};
    use crate::conversation::{Determination, TurnRequest};
    use crate::fakes::FakeInvoiceDocuments;
    use crate::handlers::{FlowHandler, TurnContext};

    async fn run(handler: &DownloadHandler, text: &str, determination: Determination) -> String {
        let request = TurnRequest::new("conv-7", text).with_message_id("msg-7");
        let turn = TurnContext {
            request: &request,
            correlation_id: "msg-7",
            determination: &determination,
            now: Utc::now(),
        };
        handler.handle(turn).await.content
    }

    fn handler(documents: Arc<FakeInvoiceDocuments>) -> DownloadHandler {
        DownloadHandler::new(documents, Arc::new(InMemoryAuditSink::default()), Duration::from_secs(1))
    }

    #[test]
    fn typed_digits_win_over_classifier() {
        assert_eq!(resolve_invoice_number("Download invoice 123425231", "999"), "0123425231");
        assert_eq!(resolve_invoice_number("download that one", "248013075"), "0248013075");
        assert_eq!(resolve_invoice_number("download it", ""), "");
    }

    #[tokio::test]
    async fn ready_document_replies_with_link_markup() {
        let documents = Arc::new(FakeInvoiceDocuments::new(
            Precheck { status: EStatus::Success, message: String::new() },
            DocumentLink { url: "https://docs.example/0123425231".to_owned() },
        ));

        let content = run(&handler(documents.clone()), "Download invoice 123425231", Determination::default()).await;

        assert_eq!(documents.prechecks(), vec!["0123425231".to_owned()]);
        assert_eq!(documents.links(), vec!["0123425231".to_owned()]);
        assert_eq!(
            content,
            "<href>0123425231</href>\n\n<href-value>https://docs.example/0123425231</href-value>"
        );
    }

    #[tokio::test]
    async fn rejected_precheck_skips_link_and_echoes_message() {
        let documents = Arc::new(FakeInvoiceDocuments::new(
            Precheck::error("Invoice 0248013075 does not exist."),
            DocumentLink::default(),
        ));
        let determination = Determination::from(json!({"invoiceNumber": "248013075"}));

        let content = run(&handler(documents.clone()), "download the pdf", determination).await;

        assert_eq!(content, "Invoice 0248013075 does not exist.");
        assert!(documents.links().is_empty());
    }

    #[tokio::test]
    async fn missing_number_asks_for_it_without_calling_backend() {
        let documents = Arc::new(FakeInvoiceDocuments::new(Precheck::default(), DocumentLink::default()));

        let content = run(&handler(documents.clone()), "download my invoice", Determination::default()).await;

        assert_eq!(content, "Kindly provide the invoice number required for the download.");
        assert!(documents.prechecks().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_reported_as_unavailable() {
        let documents = Arc::new(FakeInvoiceDocuments::failing());

        let content = run(&handler(documents), "download 0248013075", Determination::default()).await;

        assert_eq!(
            content,
            "Invoice download service is temporarily unavailable. Please try again in a few minutes."
        );
    }
}
