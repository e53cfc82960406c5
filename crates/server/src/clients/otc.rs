//! OTC invoice REST search and the OData PDF services for invoices and
//! statements of account.

use std::time::Duration;

use arbot_core::errors::IntegrationError;
use arbot_core::extract::{
    derive_from_invoice_number, extract_open_item_preference, OpenItemPreference,
};
use arbot_core::legacy_filter::LegacyFilter;
use arbot_core::ports::{
    DocumentLink, EStatus, InvoiceDocuments, InvoiceRecord, InvoiceSearch, Precheck,
    SearchOptions, SearchPage, StatementDocuments, StatementRequest,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use super::{join_url, request_error};

const SEARCH_SERVICE: &str = "otc.invoice_search";
const INVOICE_PDF_SERVICE: &str = "otc.invoice_pdf";
const SOA_SERVICE: &str = "otc.soa";

const INVOICE_PDF_ROOT: &str = "/sap/opu/odata/sap/ZFI_OTC_FORM_INVOICE_PDF_SRV";
const SOA_ROOT: &str = "/sap/opu/odata/sap/ZFI_AR_SOA_FORM_SRV";

pub const STATUS_UNREADABLE: &str = "Unable to process the validation response.";
pub const INVOICE_NOT_DERIVABLE: &str =
    "Unable to derive the required details from the provided invoice number.";

/// Filter values sent to the OTC invoice endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvoiceQuery {
    pub accounting_document: String,
    pub fiscal_year: String,
    pub company_code: String,
    pub date_from: String,
    pub date_to: String,
    pub open_items_only: bool,
}

impl InvoiceQuery {
    /// Reads the legacy filter string, repairing company code and fiscal
    /// year from the invoice number when they are malformed.
    pub fn from_legacy(legacy_filter: &str, user_text: &str) -> Self {
        let legacy = LegacyFilter::parse(legacy_filter);
        let mut query = Self {
            accounting_document: legacy.invoice_no,
            fiscal_year: legacy.fiscal_year,
            company_code: legacy.company_code,
            date_from: legacy.date_from,
            date_to: legacy.date_to,
            open_items_only: legacy.open_items_only,
        };

        if !query.accounting_document.is_empty() {
            let derived = derive_from_invoice_number(&query.accounting_document);
            if !is_digits(&query.company_code, 3) && !derived.company_code.is_empty() {
                query.company_code = derived.company_code;
            }
            if !is_digits(&query.fiscal_year, 4) && !derived.fiscal_year.is_empty() {
                query.fiscal_year = derived.fiscal_year;
            }
            if !derived.accounting_document.is_empty() {
                query.accounting_document = derived.accounting_document;
            }
        }

        if extract_open_item_preference(user_text) == Some(OpenItemPreference::OpenOnly) {
            query.open_items_only = true;
        }
        query
    }

    pub fn is_searchable(&self) -> bool {
        !self.fiscal_year.is_empty() && !self.company_code.is_empty()
    }
}

fn is_digits(value: &str, width: usize) -> bool {
    value.len() == width && value.bytes().all(|byte| byte.is_ascii_digit())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListCall {
    Count,
    Page { top: u64, skip: u64 },
}

pub const INVOICE_LIST_PATH: &str = "/otc/invoice";

/// Query parameters for `/otc/invoice`, with empty filters omitted.
pub fn invoice_params(query: &InvoiceQuery, system_alias: &str, call: ListCall) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    let mut push = |name: &'static str, value: &str| {
        if !value.is_empty() {
            params.push((name, value.to_owned()));
        }
    };
    push("AccountingDocument", &query.accounting_document);
    push("FiscalYear", &query.fiscal_year);
    push("CompanyCode", &query.company_code);
    push("DateFrom", &query.date_from);
    push("DateTo", &query.date_to);
    push("ISystemAlias", system_alias);
    if query.open_items_only {
        push("OpenItem", "X");
    }

    let (top, skip) = match call {
        ListCall::Count => {
            params.push(("count", "X".to_owned()));
            (0, 0)
        }
        ListCall::Page { top, skip } => (top, skip),
    };
    params.push(("top", top.to_string()));
    params.push(("skip", skip.to_string()));
    params
}

/// Total from a count response: body fields first, then the
/// `x-total-count` header, then the length of an array body.
pub fn read_total_count(body: &Value, total_header: Option<&str>) -> Option<u64> {
    ["count", "@odata.count", "totalCount", "TotalCount"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_u64))
        .or_else(|| total_header.and_then(|raw| raw.trim().parse::<u64>().ok()))
        .or_else(|| body.as_array().map(|rows| rows.len() as u64))
}

/// Rows from an array body, a `data` or `value` array, or a single object.
pub fn read_items(body: Value) -> Vec<InvoiceRecord> {
    let rows = match body {
        Value::Array(rows) => rows,
        Value::Object(mut fields) => match ["data", "value"]
            .iter()
            .find_map(|key| match fields.get(*key) {
                Some(Value::Array(_)) => Some(*key),
                _ => None,
            }) {
            Some(key) => match fields.remove(key) {
                Some(Value::Array(rows)) => rows,
                _ => Vec::new(),
            },
            None => vec![Value::Object(fields)],
        },
        _ => Vec::new(),
    };
    rows.into_iter().map(InvoiceRecord::from).collect()
}

pub struct OtcInvoiceSearch {
    client: Client,
    base_url: String,
    system_alias: String,
}

impl OtcInvoiceSearch {
    pub fn new(client: Client, base_url: impl Into<String>, system_alias: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into(), system_alias: system_alias.into() }
    }

    async fn fetch_count(&self, query: &InvoiceQuery, timeout: Duration) -> Option<u64> {
        let url = join_url(&self.base_url, INVOICE_LIST_PATH);
        let params = invoice_params(query, &self.system_alias, ListCall::Count);
        let response = match self.client.get(&url).query(&params).timeout(timeout).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    event_name = "downstream.otc.count_failed",
                    url = %url,
                    error = %request_error(SEARCH_SERVICE, timeout, error),
                    "invoice count call failed"
                );
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(
                event_name = "downstream.otc.count_failed",
                url = %url,
                status = response.status().as_u16(),
                "invoice count call rejected"
            );
            return None;
        }

        let header = response
            .headers()
            .get("x-total-count")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        let total = read_total_count(&body, header.as_deref());
        info!(event_name = "downstream.otc.count", url = %url, total_count = ?total, "invoice count read");
        total
    }
}

#[async_trait]
impl InvoiceSearch for OtcInvoiceSearch {
    async fn search(
        &self,
        legacy_filter: &str,
        user_text: &str,
        options: SearchOptions,
    ) -> Result<SearchPage, IntegrationError> {
        let query = InvoiceQuery::from_legacy(legacy_filter, user_text);
        if !query.is_searchable() {
            warn!(
                event_name = "downstream.otc.search_skipped",
                fiscal_year = %query.fiscal_year,
                company_code = %query.company_code,
                "invoice search needs fiscal year and company code"
            );
            return Ok(SearchPage::default());
        }

        let total_count =
            if options.want_count { self.fetch_count(&query, options.timeout).await } else { None };

        let params =
            invoice_params(&query, &self.system_alias, ListCall::Page { top: options.top, skip: options.skip });
        let url = join_url(&self.base_url, INVOICE_LIST_PATH);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|error| request_error(SEARCH_SERVICE, options.timeout, error))?;
        if !response.status().is_success() {
            return Err(IntegrationError::Status {
                service: SEARCH_SERVICE.to_owned(),
                status: response.status().as_u16(),
            });
        }
        let body = response
            .json::<Value>()
            .await
            .map_err(|error| IntegrationError::decode(SEARCH_SERVICE, error.to_string()))?;

        let items = read_items(body);
        info!(
            event_name = "downstream.otc.list",
            url = %url,
            returned = items.len(),
            "invoice page read"
        );
        Ok(SearchPage { items, total_count })
    }
}

/// Reads an OData status reply, JSON or XML. Anything without a status
/// becomes an `E` precheck.
pub fn parse_pdf_status(body: &str) -> Precheck {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
            let node = json.get("d").unwrap_or(&json);
            let field = |keys: &[&str]| {
                keys.iter()
                    .find_map(|key| node.get(*key).and_then(Value::as_str))
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_owned()
            };
            let status = field(&["EStatus", "status"]);
            if !status.is_empty() {
                return Precheck {
                    status: EStatus::from_code(&status),
                    message: field(&["EStatusMessage", "message"]),
                };
            }
        }
    }

    let status = xml_value(trimmed, "EStatus");
    let message = xml_value(trimmed, "EStatusMessage");
    if !status.is_empty() {
        return Precheck { status: EStatus::from_code(&status), message };
    }
    Precheck::error(if message.is_empty() { STATUS_UNREADABLE.to_owned() } else { message })
}

fn xml_value(xml: &str, tag: &str) -> String {
    let lowered = xml.to_ascii_lowercase();
    let open = format!("<d:{}>", tag.to_ascii_lowercase());
    let close = format!("</d:{}>", tag.to_ascii_lowercase());
    let Some(start) = lowered.find(&open).map(|index| index + open.len()) else {
        return String::new();
    };
    match lowered[start..].find(&close) {
        Some(length) => xml[start..start + length].trim().to_owned(),
        None => String::new(),
    }
}

/// Key of the invoice PDF entity set; `None` when the number is too short
/// to carry a fiscal year and company code.
pub fn invoice_pdf_key(invoice_number: &str, system_alias: &str) -> Option<String> {
    let invoice = invoice_number.trim();
    if invoice.len() < 6 || !invoice.is_ascii() {
        return None;
    }
    let fiscal_year = format!("20{}", invoice.get(1..3)?);
    let company_code = invoice.get(3..6)?;
    Some(format!(
        "(IBlart='RI',ICompany='{company_code}',IDocno='{invoice}',IFiscalYear='{fiscal_year}',ISystemAlias='{system_alias}')"
    ))
}

pub fn statement_key(request: &StatementRequest, system_alias: &str) -> String {
    format!(
        "(ICompany='{}',ICustomer='{}',IOpendate='{}',ISystemAlias='{system_alias}')",
        request.company_code.trim(),
        request.customer_code.trim(),
        request.as_of_date
    )
}

/// PDF status and download links for invoices and statements.
pub struct OtcDocuments {
    client: Client,
    base_url: String,
    system_alias: String,
    timeout: Duration,
}

impl OtcDocuments {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        system_alias: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self { client, base_url: base_url.into(), system_alias: system_alias.into(), timeout }
    }

    async fn fetch_status(&self, service: &str, path: &str) -> Result<Precheck, IntegrationError> {
        let url = join_url(&self.base_url, path);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|error| request_error(service, self.timeout, error))?;
        if !response.status().is_success() {
            return Err(IntegrationError::Status {
                service: service.to_owned(),
                status: response.status().as_u16(),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|error| IntegrationError::decode(service, error.to_string()))?;
        let precheck = parse_pdf_status(&body);
        info!(
            event_name = "downstream.otc.pdf_status",
            service,
            url = %url,
            status = ?precheck.status,
            "document status read"
        );
        Ok(precheck)
    }
}

#[async_trait]
impl InvoiceDocuments for OtcDocuments {
    async fn precheck(&self, invoice_number: &str) -> Result<Precheck, IntegrationError> {
        let Some(key) = invoice_pdf_key(invoice_number, &self.system_alias) else {
            return Ok(Precheck::error(INVOICE_NOT_DERIVABLE));
        };
        self.fetch_status(INVOICE_PDF_SERVICE, &format!("{INVOICE_PDF_ROOT}/get_pdfstatusSet{key}"))
            .await
    }

    async fn link(&self, invoice_number: &str) -> Result<DocumentLink, IntegrationError> {
        let key = invoice_pdf_key(invoice_number, &self.system_alias)
            .ok_or_else(|| IntegrationError::decode(INVOICE_PDF_SERVICE, INVOICE_NOT_DERIVABLE))?;
        let path = format!("{INVOICE_PDF_ROOT}/get_pdfSet{key}/$value");
        Ok(DocumentLink { url: join_url(&self.base_url, &path) })
    }
}

#[async_trait]
impl StatementDocuments for OtcDocuments {
    async fn precheck(&self, request: &StatementRequest) -> Result<Precheck, IntegrationError> {
        let key = statement_key(request, &self.system_alias);
        self.fetch_status(SOA_SERVICE, &format!("{SOA_ROOT}/get_pdfstatusSet{key}")).await
    }

    async fn link(&self, request: &StatementRequest) -> Result<DocumentLink, IntegrationError> {
        let path = format!("{SOA_ROOT}/get_pdfSet{}/$value", statement_key(request, &self.system_alias));
        Ok(DocumentLink { url: join_url(&self.base_url, &path) })
    }
}
