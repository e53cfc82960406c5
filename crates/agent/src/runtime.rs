use std::sync::Arc;
use std::time::Instant;

use arbot_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use arbot_core::category::Category;
use arbot_core::errors::{ApplicationError, IntegrationError};
use arbot_core::flows::{IntentLockRouter, SessionStore};
use arbot_core::ports::{UsageLogger, UsageRecord};
use arbot_core::render::UNCLASSIFIED_MESSAGE;
use chrono::Utc;
use tracing::{info, warn};

use crate::conversation::{Reply, ResponseEnvelope, TurnRequest};
use crate::guardrails::{ClassificationGuard, ClassificationSource};
use crate::handlers::{FlowHandler, HandlerRegistry, TurnContext};
use crate::llm::{AnswerClient, AnswerRequest};
use crate::prompts::base_prompt;

/// Drives one conversational turn from classification to envelope.
pub struct AgentRuntime {
    guard: ClassificationGuard,
    router: IntentLockRouter,
    sessions: Arc<dyn SessionStore>,
    handlers: HandlerRegistry,
    answers: Option<Arc<dyn AnswerClient>>,
    usage: Option<Arc<dyn UsageLogger>>,
    audit: Arc<dyn AuditSink>,
}

impl AgentRuntime {
    pub fn new(
        guard: ClassificationGuard,
        sessions: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            guard,
            router: IntentLockRouter::default(),
            sessions,
            handlers: HandlerRegistry::default(),
            answers: None,
            usage: None,
            audit,
        }
    }

    pub fn with_router(mut self, router: IntentLockRouter) -> Self {
        self.router = router;
        self
    }

    pub fn with_handler<H>(mut self, handler: H) -> Self
    where
        H: FlowHandler + 'static,
    {
        self.handlers.register(handler);
        self
    }

    pub fn with_answers(mut self, answers: Arc<dyn AnswerClient>) -> Self {
        self.answers = Some(answers);
        self
    }

    pub fn with_usage(mut self, usage: Arc<dyn UsageLogger>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub async fn handle_turn(&self, request: TurnRequest) -> Result<ResponseEnvelope, ApplicationError> {
        request.validate()?;
        let started = Instant::now();
        let correlation_id = request.correlation_id();
        let conversation_id = request.conversation_id.clone();
        let now = Utc::now();

        let evicted = self.sessions.evict_expired(now).await;
        if evicted > 0 {
            info!(
                event_name = "session.sweep.evicted",
                correlation_id = %correlation_id,
                evicted,
                "expired sessions evicted"
            );
        }

        let classification = self.guard.classify(&request.user_query).await;
        let (source, outcome) = match classification.source {
            ClassificationSource::Classifier => ("classifier".to_owned(), AuditOutcome::Success),
            ClassificationSource::Heuristic(reason) => {
                (reason.reason_code().to_owned(), AuditOutcome::Fallback)
            }
        };
        info!(
            event_name = "chat.turn.classified",
            correlation_id = %correlation_id,
            conversation_id = %conversation_id,
            category = %classification.category,
            source = %source,
            "turn classified"
        );
        self.audit.emit(
            AuditEvent::new(
                &conversation_id,
                &correlation_id,
                "chat.turn.classified",
                AuditCategory::Classification,
                outcome,
            )
            .with_metadata("category", classification.category.as_str())
            .with_metadata("source", source),
        );

        let existing = self.sessions.get(&conversation_id).await;
        let routed =
            self.router.route(existing.as_ref(), &request.user_query, classification.category);
        if routed.overridden() {
            info!(
                event_name = "chat.turn.intent_locked",
                correlation_id = %correlation_id,
                conversation_id = %conversation_id,
                classified = %routed.classified,
                routed = %routed.category,
                reason = ?routed.decision.reason,
                "active flow kept the turn"
            );
            self.audit.emit(
                AuditEvent::new(
                    &conversation_id,
                    &correlation_id,
                    "chat.turn.intent_locked",
                    AuditCategory::Routing,
                    AuditOutcome::Success,
                )
                .with_metadata("classified", routed.classified.as_str())
                .with_metadata("routed", routed.category.as_str())
                .with_metadata("reason", format!("{:?}", routed.decision.reason)),
            );
        }

        let category = routed.category;
        let (reply, deterministic) = match self.handlers.get(category) {
            Some(handler) => {
                let turn = TurnContext {
                    request: &request,
                    correlation_id: &correlation_id,
                    determination: &classification.determination,
                    now,
                };
                (handler.handle(turn).await, true)
            }
            None => match &self.answers {
                Some(answers) => (self.answer(answers.as_ref(), &request, category).await?, false),
                None => {
                    warn!(
                        event_name = "chat.turn.unclassified",
                        correlation_id = %correlation_id,
                        conversation_id = %conversation_id,
                        category = %category,
                        "no handler or answer client for category"
                    );
                    return Ok(ResponseEnvelope::new(
                        Reply::assistant(UNCLASSIFIED_MESSAGE),
                        request.message_id.clone(),
                        Utc::now(),
                    ));
                }
            },
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.log_usage(&request, &correlation_id, category, deterministic, duration_ms).await;
        info!(
            event_name = "chat.turn.completed",
            correlation_id = %correlation_id,
            conversation_id = %conversation_id,
            category = %category,
            deterministic,
            duration_ms,
            "turn completed"
        );

        Ok(ResponseEnvelope::new(reply, request.message_id.clone(), Utc::now()))
    }

    async fn answer(
        &self,
        answers: &dyn AnswerClient,
        request: &TurnRequest,
        category: Category,
    ) -> Result<Reply, ApplicationError> {
        let answer_request = AnswerRequest {
            conversation_id: request.conversation_id.clone(),
            message_id: request.message_id.clone(),
            message_time: request.message_time.clone(),
            user_id: request.user_id.clone(),
            user_query: request.user_query.clone(),
            category,
            prompt: base_prompt(category).to_owned(),
        };
        let answer = answers.answer(&answer_request).await.map_err(|error| {
            ApplicationError::Integration(IntegrationError::transport("ai_engine", error.to_string()))
        })?;
        Ok(Reply {
            role: answer.role,
            content: answer.content,
            additional_contents: answer.additional_contents,
        })
    }

    async fn log_usage(
        &self,
        request: &TurnRequest,
        correlation_id: &str,
        category: Category,
        is_deterministic: bool,
        duration_ms: u64,
    ) {
        let Some(usage) = &self.usage else {
            return;
        };
        let record = UsageRecord {
            category,
            is_deterministic,
            duration_ms,
            conversation_id: request.conversation_id.clone(),
            message_id: correlation_id.to_owned(),
            user_id: request.user_id.clone(),
        };
        if let Err(error) = usage.log(record).await {
            warn!(
                event_name = "downstream.usage.failed",
                correlation_id = %correlation_id,
                error = %error,
                "usage logging failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use arbot_core::audit::{AuditOutcome, InMemoryAuditSink};
    use arbot_core::category::Category;
    use arbot_core::errors::ApplicationError;
    use arbot_core::flows::{
        ActiveIntent, FilterState, InMemorySessionStore, QueryStateReducer, SessionStore,
    };
    use arbot_core::ports::{DocumentLink, EStatus, Precheck, SearchPage};
    use chrono::{Datelike, Utc};
    use serde_json::json;

    use super::AgentRuntime;
    use crate::conversation::TurnRequest;
    use crate::fakes::{
        invoice_rows, CannedAnswers, FakeInvoiceDocuments, FakeInvoiceSearch, RecordingUsage,
        ScriptedClassifier,
    };
    use crate::guardrails::ClassificationGuard;
    use crate::handlers::{DownloadHandler, InvoiceHandler};

    struct Harness {
        runtime: AgentRuntime,
        sessions: Arc<InMemorySessionStore>,
        search: Arc<FakeInvoiceSearch>,
        documents: Arc<FakeInvoiceDocuments>,
        usage: Arc<RecordingUsage>,
        audit: Arc<InMemoryAuditSink>,
    }

    fn harness(classifier_reply: serde_json::Value, page: SearchPage) -> Harness {
        harness_with_search(classifier_reply, FakeInvoiceSearch::returning(page))
    }

    fn harness_with_search(classifier_reply: serde_json::Value, search: FakeInvoiceSearch) -> Harness {
        let sessions = Arc::new(InMemorySessionStore::default());
        let search = Arc::new(search);
        let documents = Arc::new(FakeInvoiceDocuments::new(
            Precheck { status: EStatus::Success, message: String::new() },
            DocumentLink { url: "https://docs.example/pdf".to_owned() },
        ));
        let usage = Arc::new(RecordingUsage::default());
        let audit = Arc::new(InMemoryAuditSink::default());
        let guard = ClassificationGuard::new(
            Arc::new(ScriptedClassifier::replying(classifier_reply)),
            Duration::from_secs(1),
        );

        let runtime = AgentRuntime::new(guard, sessions.clone(), audit.clone())
            .with_handler(InvoiceHandler::new(
                sessions.clone(),
                search.clone(),
                QueryStateReducer::default(),
                audit.clone(),
            ))
            .with_handler(DownloadHandler::new(
                documents.clone(),
                audit.clone(),
                Duration::from_secs(1),
            ))
            .with_usage(usage.clone());

        Harness { runtime, sessions, search, documents, usage, audit }
    }

    fn locked_january_801() -> FilterState {
        let mut state = FilterState::new(ActiveIntent::Invoice, Utc::now());
        state.company_code = "801".to_owned();
        state.fiscal_year = "2024".to_owned();
        state.date_from = "01.01.2024".to_owned();
        state.date_to = "31.01.2024".to_owned();
        state.last_key = state.fingerprint();
        state
    }

    fn generic() -> serde_json::Value {
        json!({"category": "generic-query", "determinationJson": "{}"})
    }

    #[tokio::test]
    async fn locked_session_reclaims_short_generic_follow_up() {
        let h = harness(generic(), SearchPage { items: invoice_rows(2), total_count: Some(2) });
        h.sessions.set("conv-1", locked_january_801()).await;

        let envelope = h
            .runtime
            .handle_turn(TurnRequest::new("conv-1", "open only").with_message_id("m-1"))
            .await
            .expect("turn succeeds");

        assert!(envelope.content.starts_with("Found 2 OPEN invoices. Showing 2."));
        let calls = h.search.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].options.skip, 0);
        assert!(calls[0].legacy_filter.contains("OpenItem='X'"));

        let routing = h.audit.events_of("chat.turn.intent_locked");
        assert_eq!(routing.len(), 1);
        assert_eq!(routing[0].metadata.get("routed").map(String::as_str), Some("invoice-request-query"));
    }

    #[tokio::test]
    async fn next_turn_moves_cursor_by_one_page() {
        let h = harness(generic(), SearchPage { items: invoice_rows(5), total_count: Some(20) });
        h.sessions.set("conv-1", locked_january_801()).await;

        h.runtime.handle_turn(TurnRequest::new("conv-1", "next")).await.expect("turn succeeds");

        assert_eq!(h.search.calls()[0].options.skip, 5);
        assert_eq!(h.sessions.get("conv-1").await.map(|state| state.skip), Some(5));
    }

    #[tokio::test]
    async fn failed_search_keeps_the_page_for_the_retry() {
        let h = harness_with_search(generic(), FakeInvoiceSearch::failing());
        h.sessions.set("conv-1", locked_january_801()).await;

        for _ in 0..2 {
            let envelope =
                h.runtime.handle_turn(TurnRequest::new("conv-1", "next")).await.expect("turn succeeds");
            assert_eq!(
                envelope.content,
                "Invoice search service is temporarily unavailable. Please try again in a few minutes."
            );
        }

        let skips: Vec<u64> = h.search.calls().iter().map(|call| call.options.skip).collect();
        assert_eq!(skips, vec![5, 5]);
        assert_eq!(h.sessions.get("conv-1").await.map(|state| state.skip), Some(0));
    }

    #[tokio::test]
    async fn malformed_classifier_payload_still_reaches_invoice_flow() {
        let h = harness(
            json!({"category": "generic-query", "determinationJson": "not json"}),
            SearchPage::default(),
        );

        let envelope = h
            .runtime
            .handle_turn(TurnRequest::new("conv-2", "show me invoices"))
            .await
            .expect("turn succeeds");

        assert!(envelope.content.starts_with("I can help with that, but I need the following details:"));
        assert!(h.search.calls().is_empty());
        let classified = h.audit.events_of("chat.turn.classified");
        assert_eq!(classified[0].outcome, AuditOutcome::Fallback);
    }

    #[tokio::test]
    async fn conversational_range_with_company_code_searches() {
        let h = harness(
            json!({"category": "invoice-request-query", "determinationJson": "{}"}),
            SearchPage::default(),
        );

        h.runtime
            .handle_turn(TurnRequest::new(
                "conv-3",
                "Can get invoices between January 1 to January 10 and company code 898",
            ))
            .await
            .expect("turn succeeds");

        let year = Utc::now().year();
        let calls = h.search.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].legacy_filter,
            format!(
                "InvoiceNo=''&InvoiceType='FI'&FiscalYear='{year}'&DateFrom='01.01.{year}'&DateTo='10.01.{year}'&SalesOrder=''&CompanyCode='898'"
            )
        );
    }

    #[tokio::test]
    async fn download_turn_prechecks_padded_number_and_logs_usage() {
        let h = harness(
            json!({"category": "download-invoice", "determinationJson": "{\"invoiceNumber\":\"123425231\"}"}),
            SearchPage::default(),
        );

        let envelope = h
            .runtime
            .handle_turn(TurnRequest::new("conv-4", "Download invoice 123425231").with_message_id("m-4"))
            .await
            .expect("turn succeeds");

        assert_eq!(h.documents.prechecks(), vec!["0123425231".to_owned()]);
        assert_eq!(
            envelope.content,
            "<href>0123425231</href>\n\n<href-value>https://docs.example/pdf</href-value>"
        );
        assert_eq!(envelope.message_id.as_deref(), Some("m-4"));

        let usage = h.usage.records();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].category, Category::DownloadInvoice);
        assert!(usage[0].is_deterministic);
        assert_eq!(usage[0].message_id, "m-4");
    }

    #[tokio::test]
    async fn generic_turn_without_answer_client_is_unclassified() {
        let h = harness(generic(), SearchPage::default());

        let envelope =
            h.runtime.handle_turn(TurnRequest::new("conv-5", "hello there")).await.expect("turn");

        assert_eq!(envelope.content, "I could not classify your request. Please rephrase.");
        assert!(h.usage.records().is_empty());
    }

    #[tokio::test]
    async fn generic_turn_uses_answer_client() {
        let answers = Arc::new(CannedAnswers::replying("Our office hours are 9 to 5."));
        let h = harness(generic(), SearchPage::default());
        let runtime = h.runtime.with_answers(answers.clone());

        let envelope = runtime
            .handle_turn(TurnRequest::new("conv-6", "when are you open for calls?"))
            .await
            .expect("turn");

        assert_eq!(envelope.content, "Our office hours are 9 to 5.");
        assert_eq!(envelope.additional_contents, r#"[{"page":1,"source":"kb"}]"#);
        let requests = answers.requests();
        assert_eq!(requests[0].category, Category::GenericQuery);
        assert!(!h.usage.records()[0].is_deterministic);
    }

    #[tokio::test]
    async fn answer_failures_and_invalid_requests_fail_the_turn() {
        let h = harness(generic(), SearchPage::default());
        let runtime = h.runtime.with_answers(Arc::new(CannedAnswers::failing()));

        let failed = runtime.handle_turn(TurnRequest::new("conv-7", "hello")).await;
        assert!(matches!(failed, Err(ApplicationError::Integration(_))));

        let invalid = runtime.handle_turn(TurnRequest::new("conv-7", "   ")).await;
        assert!(matches!(invalid, Err(ApplicationError::Domain(_))));
    }
}
