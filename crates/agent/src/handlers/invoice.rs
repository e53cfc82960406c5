use std::sync::Arc;

use arbot_core::audit::{AuditCategory, AuditOutcome, AuditSink};
use arbot_core::category::Category;
use arbot_core::flows::{InvoiceStep, QueryStateReducer, SessionStore};
use arbot_core::ports::InvoiceSearch;
use arbot_core::render::{
    empty_result_message, missing_filters_prompt, result_page_message, INVOICE_SEARCH_UNAVAILABLE,
};
use async_trait::async_trait;
use tracing::info;

use super::{bounded, report_downstream_failure, FlowHandler, TurnContext};
use crate::conversation::Reply;

const SEARCH_SERVICE: &str = "otc.invoice_search";

/// Stateful invoice search with paging over the session store.
pub struct InvoiceHandler {
    sessions: Arc<dyn SessionStore>,
    search: Arc<dyn InvoiceSearch>,
    reducer: QueryStateReducer,
    audit: Arc<dyn AuditSink>,
}

impl InvoiceHandler {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        search: Arc<dyn InvoiceSearch>,
        reducer: QueryStateReducer,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { sessions, search, reducer, audit }
    }
}

#[async_trait]
impl FlowHandler for InvoiceHandler {
    fn category(&self) -> Category {
        Category::InvoiceRequestQuery
    }

    async fn handle(&self, turn: TurnContext<'_>) -> Reply {
        let seed = turn.determination.to_seed();
        let (reduction, step) = self
            .reducer
            .reduce_turn(
                self.sessions.as_ref(),
                turn.conversation_id(),
                turn.user_text(),
                &seed,
                turn.now,
            )
            .await;

        let state = step.state();
        info!(
            event_name = "flow.invoice.session_snapshot",
            correlation_id = %turn.correlation_id,
            conversation_id = %turn.conversation_id(),
            fingerprint = %state.fingerprint(),
            skip = state.skip,
            page_move = ?reduction.page_move,
            first_turn = reduction.first_turn,
            "invoice session reduced"
        );
        self.audit.emit(
            turn.audit_event("flow.invoice.session_snapshot", AuditCategory::Session, AuditOutcome::Success)
                .with_metadata("fingerprint", state.fingerprint())
                .with_metadata("skip", state.skip.to_string())
                .with_metadata("page_move", format!("{:?}", reduction.page_move)),
        );

        let (state, legacy_filter, options) = match step {
            InvoiceStep::NeedsFilters { state, missing } => {
                return Reply::assistant(missing_filters_prompt(&missing, &state));
            }
            InvoiceStep::Search { state, legacy_filter, options } => (state, legacy_filter, options),
        };

        let page = match bounded(
            SEARCH_SERVICE,
            options.timeout,
            self.search.search(&legacy_filter, turn.user_text(), options),
        )
        .await
        {
            Ok(page) => page,
            Err(error) => {
                report_downstream_failure(
                    self.audit.as_ref(),
                    &turn,
                    "downstream.invoice_search.failed",
                    &error,
                );
                return Reply::assistant(INVOICE_SEARCH_UNAVAILABLE);
            }
        };

        let window = self
            .reducer
            .record_results(
                self.sessions.as_ref(),
                turn.conversation_id(),
                state.clone(),
                page.items.len() as u64,
                page.total_count,
            )
            .await;
        info!(
            event_name = "downstream.invoice_search.completed",
            correlation_id = %turn.correlation_id,
            conversation_id = %turn.conversation_id(),
            skip = window.skip,
            returned = window.returned,
            total_count = window.total_count,
            "invoice search completed"
        );
        self.audit.emit(
            turn.audit_event(
                "downstream.invoice_search.completed",
                AuditCategory::Downstream,
                AuditOutcome::Success,
            )
            .with_metadata("returned", window.returned.to_string())
            .with_metadata("total_count", window.total_count.to_string()),
        );

        if page.items.is_empty() {
            return Reply::assistant(empty_result_message(&state));
        }
        Reply::assistant(result_page_message(&state, &page.items, &window))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arbot_core::audit::{AuditOutcome, InMemoryAuditSink};
    use arbot_core::flows::{ActiveIntent, FilterState, InMemorySessionStore, QueryStateReducer, SessionStore};
    use arbot_core::ports::SearchPage;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::InvoiceHandler;
    use crate::conversation::{Determination, TurnRequest};
    use crate::fakes::{invoice_rows, FakeInvoiceSearch};
    use crate::handlers::{FlowHandler, TurnContext};

    fn january_801() -> FilterState {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).single().expect("timestamp");
        let mut state = FilterState::new(ActiveIntent::Invoice, now);
        state.intent_locked = true;
        state.company_code = "801".to_owned();
        state.fiscal_year = "2024".to_owned();
        state.date_from = "01.01.2024".to_owned();
        state.date_to = "31.01.2024".to_owned();
        state.last_key = state.fingerprint();
        state
    }

    async fn run(
        handler: &InvoiceHandler,
        text: &str,
        determination: &Determination,
    ) -> String {
        let request = TurnRequest::new("conv-1", text).with_message_id("msg-1");
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 8, 5, 0).single().expect("timestamp");
        let turn = TurnContext { request: &request, correlation_id: "msg-1", determination, now };
        handler.handle(turn).await.content
    }

    #[tokio::test]
    async fn next_reply_pages_forward_and_queries_with_new_skip() {
        let sessions = Arc::new(InMemorySessionStore::default());
        sessions.set("conv-1", january_801()).await;
        let search = Arc::new(FakeInvoiceSearch::returning(SearchPage {
            items: invoice_rows(5),
            total_count: Some(12),
        }));
        let handler = InvoiceHandler::new(
            sessions.clone(),
            search.clone(),
            QueryStateReducer::default(),
            Arc::new(InMemoryAuditSink::default()),
        );

        let content = run(&handler, "next", &Determination::default()).await;

        let calls = search.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].options.skip, 5);
        assert_eq!(calls[0].options.top, 5);
        assert!(calls[0].options.want_count);
        assert_eq!(
            calls[0].legacy_filter,
            "InvoiceNo=''&InvoiceType='FI'&FiscalYear='2024'&DateFrom='01.01.2024'&DateTo='31.01.2024'&SalesOrder=''&CompanyCode='801'"
        );
        assert!(content.starts_with("Found 12 invoices. Showing 5.\n6. "));
        assert!(content.ends_with("Would you like to see the next 5 invoices? (Reply: \"next\")"));

        let stored = sessions.get("conv-1").await.expect("session persisted");
        assert_eq!(stored.skip, 5);
        assert_eq!(stored.total_count, Some(12));
    }

    #[tokio::test]
    async fn incomplete_filters_never_reach_the_backend() {
        let sessions = Arc::new(InMemorySessionStore::default());
        let search = Arc::new(FakeInvoiceSearch::returning(SearchPage::default()));
        let handler = InvoiceHandler::new(
            sessions.clone(),
            search.clone(),
            QueryStateReducer::default(),
            Arc::new(InMemoryAuditSink::default()),
        );

        let content = run(&handler, "show invoices for company code 898", &Determination::default()).await;

        assert!(search.calls().is_empty());
        assert_eq!(
            content,
            "I can help with that, but I need the following details:\n\
             - Fiscal Year (e.g., 2024)\n\
             - Date range (e.g., 01.01.2024 to 31.01.2024)\n\n\
             Current context: Company Code 898."
        );
        assert!(sessions.get("conv-1").await.is_some());
    }

    #[tokio::test]
    async fn first_turn_uses_classifier_legacy_query() {
        let sessions = Arc::new(InMemorySessionStore::default());
        let search = Arc::new(FakeInvoiceSearch::returning(SearchPage::default()));
        let handler = InvoiceHandler::new(
            sessions,
            search.clone(),
            QueryStateReducer::default(),
            Arc::new(InMemoryAuditSink::default()),
        );
        let determination = Determination::from(json!({
            "query": "InvoiceNo=''&InvoiceType='FI'&FiscalYear='2024'&DateFrom='01.03.2024'&DateTo='31.03.2024'&SalesOrder=''&CompanyCode='801'"
        }));

        let content = run(&handler, "invoices please", &determination).await;

        assert_eq!(search.calls().len(), 1);
        assert!(content.starts_with(
            "No invoices were found for the current criteria: Company Code 801, Fiscal Year 2024, Date 01.03.2024 to 31.03.2024."
        ));
    }

    #[tokio::test]
    async fn search_failure_degrades_to_unavailable_message() {
        let sessions = Arc::new(InMemorySessionStore::default());
        sessions.set("conv-1", january_801()).await;
        let audit = Arc::new(InMemoryAuditSink::default());
        let handler = InvoiceHandler::new(
            sessions,
            Arc::new(FakeInvoiceSearch::failing()),
            QueryStateReducer::default(),
            audit.clone(),
        );

        let content = run(&handler, "next", &Determination::default()).await;

        assert_eq!(
            content,
            "Invoice search service is temporarily unavailable. Please try again in a few minutes."
        );
        let failures = audit.events_of("downstream.invoice_search.failed");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].outcome, AuditOutcome::Failed);
        assert_eq!(failures[0].correlation_id, "msg-1");
    }
}
