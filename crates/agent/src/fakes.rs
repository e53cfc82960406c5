//! Recording doubles for the collaborator ports.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use arbot_core::errors::IntegrationError;
use arbot_core::ports::{
    AnalyticsResult, CustomerAnalytics, DocumentLink, InvoiceDocuments, InvoiceRecord,
    InvoiceSearch, Precheck, SearchOptions, SearchPage, StatementDocuments, StatementRequest,
    UsageLogger, UsageRecord,
};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{Answer, AnswerClient, AnswerRequest, ClassifierClient};

fn snapshot<T: Clone>(calls: &Mutex<Vec<T>>) -> Vec<T> {
    match calls.lock() {
        Ok(calls) => calls.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn record<T>(calls: &Mutex<Vec<T>>, call: T) {
    match calls.lock() {
        Ok(mut calls) => calls.push(call),
        Err(poisoned) => poisoned.into_inner().push(call),
    }
}

#[derive(Clone)]
pub struct ScriptedClassifier {
    reply: Value,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedClassifier {
    pub fn replying(reply: Value) -> Self {
        Self { reply, prompts: Arc::default() }
    }

    pub fn prompts(&self) -> Vec<String> {
        snapshot(&self.prompts)
    }
}

#[async_trait]
impl ClassifierClient for ScriptedClassifier {
    async fn classify(&self, _user_text: &str, system_prompt: &str) -> Result<Value> {
        record(&self.prompts, system_prompt.to_owned());
        Ok(self.reply.clone())
    }
}

pub struct FailingClassifier;

#[async_trait]
impl ClassifierClient for FailingClassifier {
    async fn classify(&self, _user_text: &str, _system_prompt: &str) -> Result<Value> {
        Err(anyhow!("connection refused"))
    }
}

pub struct SlowClassifier(pub Duration);

#[async_trait]
impl ClassifierClient for SlowClassifier {
    async fn classify(&self, _user_text: &str, _system_prompt: &str) -> Result<Value> {
        tokio::time::sleep(self.0).await;
        Ok(json!({"category": "generic-query", "determinationJson": "{}"}))
    }
}

/// Rows with the fields the result formatter prints.
pub fn invoice_rows(count: usize) -> Vec<InvoiceRecord> {
    (0..count)
        .map(|index| {
            InvoiceRecord::from(json!({
                "AccountingDocument": format!("24801307{index}"),
                "PostingDate": "2024-01-15",
                "Customer": "Acme Corp",
                "Currency": "USD",
                "Amount": "1250.5"
            }))
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchCall {
    pub legacy_filter: String,
    pub user_text: String,
    pub options: SearchOptions,
}

pub struct FakeInvoiceSearch {
    page: Option<SearchPage>,
    calls: Mutex<Vec<SearchCall>>,
}

impl FakeInvoiceSearch {
    pub fn returning(page: SearchPage) -> Self {
        Self { page: Some(page), calls: Mutex::default() }
    }

    pub fn failing() -> Self {
        Self { page: None, calls: Mutex::default() }
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        snapshot(&self.calls)
    }
}

#[async_trait]
impl InvoiceSearch for FakeInvoiceSearch {
    async fn search(
        &self,
        legacy_filter: &str,
        user_text: &str,
        options: SearchOptions,
    ) -> Result<SearchPage, IntegrationError> {
        record(
            &self.calls,
            SearchCall {
                legacy_filter: legacy_filter.to_owned(),
                user_text: user_text.to_owned(),
                options,
            },
        );
        self.page
            .clone()
            .ok_or_else(|| IntegrationError::Status { service: "otc.invoice_search".to_owned(), status: 502 })
    }
}

pub struct FakeInvoiceDocuments {
    precheck: Option<Precheck>,
    link: DocumentLink,
    prechecks: Mutex<Vec<String>>,
    links: Mutex<Vec<String>>,
}

impl FakeInvoiceDocuments {
    pub fn new(precheck: Precheck, link: DocumentLink) -> Self {
        Self { precheck: Some(precheck), link, prechecks: Mutex::default(), links: Mutex::default() }
    }

    pub fn failing() -> Self {
        Self {
            precheck: None,
            link: DocumentLink::default(),
            prechecks: Mutex::default(),
            links: Mutex::default(),
        }
    }

    pub fn prechecks(&self) -> Vec<String> {
        snapshot(&self.prechecks)
    }

    pub fn links(&self) -> Vec<String> {
        snapshot(&self.links)
    }
}

#[async_trait]
impl InvoiceDocuments for FakeInvoiceDocuments {
    async fn precheck(&self, invoice_number: &str) -> Result<Precheck, IntegrationError> {
        record(&self.prechecks, invoice_number.to_owned());
        self.precheck
            .clone()
            .ok_or_else(|| IntegrationError::transport("otc.invoice_pdf_status", "connection reset"))
    }

    async fn link(&self, invoice_number: &str) -> Result<DocumentLink, IntegrationError> {
        record(&self.links, invoice_number.to_owned());
        Ok(self.link.clone())
    }
}

pub struct FakeStatementDocuments {
    precheck: Precheck,
    link: DocumentLink,
    prechecks: Mutex<Vec<StatementRequest>>,
    links: Mutex<Vec<StatementRequest>>,
}

impl FakeStatementDocuments {
    pub fn new(precheck: Precheck, link: DocumentLink) -> Self {
        Self { precheck, link, prechecks: Mutex::default(), links: Mutex::default() }
    }

    pub fn prechecks(&self) -> Vec<StatementRequest> {
        snapshot(&self.prechecks)
    }

    pub fn links(&self) -> Vec<StatementRequest> {
        snapshot(&self.links)
    }
}

#[async_trait]
impl StatementDocuments for FakeStatementDocuments {
    async fn precheck(&self, request: &StatementRequest) -> Result<Precheck, IntegrationError> {
        record(&self.prechecks, request.clone());
        Ok(self.precheck.clone())
    }

    async fn link(&self, request: &StatementRequest) -> Result<DocumentLink, IntegrationError> {
        record(&self.links, request.clone());
        Ok(self.link.clone())
    }
}

pub struct FakeAnalytics {
    result: Option<AnalyticsResult>,
    questions: Mutex<Vec<String>>,
}

impl FakeAnalytics {
    pub fn returning(result: AnalyticsResult) -> Self {
        Self { result: Some(result), questions: Mutex::default() }
    }

    pub fn failing() -> Self {
        Self { result: None, questions: Mutex::default() }
    }

    pub fn questions(&self) -> Vec<String> {
        snapshot(&self.questions)
    }
}

#[async_trait]
impl CustomerAnalytics for FakeAnalytics {
    async fn query(&self, question: &str) -> Result<AnalyticsResult, IntegrationError> {
        record(&self.questions, question.to_owned());
        self.result
            .clone()
            .ok_or_else(|| IntegrationError::decode("datasphere.customer_analytics", "unexpected body"))
    }
}

#[derive(Default)]
pub struct RecordingUsage {
    records: Mutex<Vec<UsageRecord>>,
}

impl RecordingUsage {
    pub fn records(&self) -> Vec<UsageRecord> {
        snapshot(&self.records)
    }
}

#[async_trait]
impl UsageLogger for RecordingUsage {
    async fn log(&self, usage: UsageRecord) -> Result<(), IntegrationError> {
        record(&self.records, usage);
        Ok(())
    }
}

pub struct CannedAnswers {
    content: Option<String>,
    requests: Mutex<Vec<AnswerRequest>>,
}

impl CannedAnswers {
    pub fn replying(content: &str) -> Self {
        Self { content: Some(content.to_owned()), requests: Mutex::default() }
    }

    pub fn failing() -> Self {
        Self { content: None, requests: Mutex::default() }
    }

    pub fn requests(&self) -> Vec<AnswerRequest> {
        snapshot(&self.requests)
    }
}

#[async_trait]
impl AnswerClient for CannedAnswers {
    async fn answer(&self, request: &AnswerRequest) -> Result<Answer> {
        record(&self.requests, request.clone());
        let content = self.content.clone().ok_or_else(|| anyhow!("ai engine returned 500"))?;
        Ok(Answer {
            role: "assistant".to_owned(),
            content,
            additional_contents: vec![json!({"source": "kb", "page": 1})],
        })
    }
}
