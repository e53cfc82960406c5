use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::errors::DomainError;
use crate::legacy_filter::LegacyFilter;

pub const PAGE_SIZE: u64 = 5;

/// Deterministic flow that currently owns a conversation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActiveIntent {
    Invoice,
    Soa,
    Download,
    #[default]
    None,
}

impl ActiveIntent {
    pub fn category(&self) -> Option<Category> {
        match self {
            Self::Invoice => Some(Category::InvoiceRequestQuery),
            Self::Soa => Some(Category::SoaRequest),
            Self::Download => Some(Category::DownloadInvoice),
            Self::None => None,
        }
    }
}

/// Filter fragment the invoice flow still needs before it can search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingFilter {
    CompanyCode,
    FiscalYear,
    DateRange,
}

impl MissingFilter {
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::CompanyCode => "Company Code (e.g., 801)",
            Self::FiscalYear => "Fiscal Year (e.g., 2024)",
            Self::DateRange => "Date range (e.g., 01.01.2024 to 31.01.2024)",
        }
    }
}

/// Per-conversation filter state. Empty strings mean "unset".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub active_intent: ActiveIntent,
    pub intent_locked: bool,
    pub company_code: String,
    pub fiscal_year: String,
    pub date_from: String,
    pub date_to: String,
    pub open_item: String,
    pub accounting_document: String,
    pub skip: u64,
    pub page_size: u64,
    pub last_key: String,
    pub last_touched: DateTime<Utc>,
    pub total_count: Option<u64>,
}

impl FilterState {
    pub fn new(active_intent: ActiveIntent, now: DateTime<Utc>) -> Self {
        Self {
            active_intent,
            intent_locked: active_intent != ActiveIntent::None,
            company_code: String::new(),
            fiscal_year: String::new(),
            date_from: String::new(),
            date_to: String::new(),
            open_item: String::new(),
            accounting_document: String::new(),
            skip: 0,
            page_size: PAGE_SIZE,
            last_key: String::new(),
            last_touched: now,
            total_count: None,
        }
    }

    pub fn open_items_only(&self) -> bool {
        self.open_item == "X"
    }

    pub fn has_date_range(&self) -> bool {
        !self.date_from.is_empty() && !self.date_to.is_empty()
    }

    /// Key over the filter fields; a change means earlier pages are stale.
    pub fn fingerprint(&self) -> String {
        format!(
            "FY={}|CC={}|DF={}|DT={}|OPEN={}",
            self.fiscal_year, self.company_code, self.date_from, self.date_to, self.open_item
        )
    }

    pub fn missing_filters(&self) -> Vec<MissingFilter> {
        let mut missing = Vec::new();
        if self.company_code.is_empty() {
            missing.push(MissingFilter::CompanyCode);
        }
        if self.fiscal_year.is_empty() {
            missing.push(MissingFilter::FiscalYear);
        }
        if !self.has_date_range() {
            missing.push(MissingFilter::DateRange);
        }
        missing
    }

    pub fn legacy_filter(&self) -> LegacyFilter {
        LegacyFilter {
            invoice_no: self.accounting_document.clone(),
            fiscal_year: self.fiscal_year.clone(),
            date_from: self.date_from.clone(),
            date_to: self.date_to.clone(),
            company_code: self.company_code.clone(),
            open_items_only: self.open_items_only(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.last_touched) > ttl
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.intent_locked && self.active_intent == ActiveIntent::None {
            return Err(DomainError::InvariantViolation(
                "intent lock set without an active intent".to_owned(),
            ));
        }
        if !self.accounting_document.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::InvariantViolation(format!(
                "accounting document `{}` is not numeric",
                self.accounting_document
            )));
        }
        for date in [&self.date_from, &self.date_to] {
            if !date.is_empty() && NaiveDate::parse_from_str(date, "%d.%m.%Y").is_err() {
                return Err(DomainError::InvariantViolation(format!(
                    "date `{date}` is not in DD.MM.YYYY form"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{ActiveIntent, FilterState, MissingFilter};
    use crate::category::Category;

    fn invoice_state() -> FilterState {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).single().expect("timestamp");
        FilterState::new(ActiveIntent::Invoice, now)
    }

    #[test]
    fn new_flow_state_is_locked_and_unpaged() {
        let state = invoice_state();
        assert!(state.intent_locked);
        assert_eq!(state.skip, 0);
        assert_eq!(state.page_size, 5);
        assert!(state.total_count.is_none());
        assert_eq!(ActiveIntent::Invoice.category(), Some(Category::InvoiceRequestQuery));
        assert!(!FilterState::new(ActiveIntent::None, state.last_touched).intent_locked);
    }

    #[test]
    fn fingerprint_covers_every_filter_field() {
        let mut state = invoice_state();
        state.company_code = "801".to_owned();
        state.fiscal_year = "2024".to_owned();
        state.date_from = "01.01.2024".to_owned();
        state.date_to = "31.01.2024".to_owned();
        assert_eq!(state.fingerprint(), "FY=2024|CC=801|DF=01.01.2024|DT=31.01.2024|OPEN=");

        let before = state.fingerprint();
        state.open_item = "X".to_owned();
        assert_ne!(state.fingerprint(), before);

        let before = state.fingerprint();
        state.accounting_document = "248013075".to_owned();
        assert_eq!(state.fingerprint(), before);
    }

    #[test]
    fn missing_filters_are_listed_in_prompt_order() {
        let mut state = invoice_state();
        assert_eq!(
            state.missing_filters(),
            vec![MissingFilter::CompanyCode, MissingFilter::FiscalYear, MissingFilter::DateRange]
        );

        state.company_code = "801".to_owned();
        state.date_from = "01.01.2024".to_owned();
        assert_eq!(state.missing_filters(), vec![MissingFilter::FiscalYear, MissingFilter::DateRange]);
    }

    #[test]
    fn expiry_is_strictly_after_ttl() {
        let state = invoice_state();
        let ttl = Duration::minutes(30);
        assert!(!state.is_expired(state.last_touched + ttl, ttl));
        assert!(state.is_expired(state.last_touched + ttl + Duration::seconds(1), ttl));
    }

    #[test]
    fn validation_rejects_broken_invariants() {
        let mut state = invoice_state();
        assert!(state.validate().is_ok());

        state.date_from = "2024-01-01".to_owned();
        assert!(state.validate().is_err());

        let mut unlocked = invoice_state();
        unlocked.active_intent = ActiveIntent::None;
        assert!(unlocked.validate().is_err());

        let mut lettered = invoice_state();
        lettered.accounting_document = "INV-1".to_owned();
        assert!(lettered.validate().is_err());
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let json = serde_json::to_value(invoice_state()).expect("serialize");
        assert_eq!(json["activeIntent"], "INVOICE");
        assert_eq!(json["intentLocked"], true);
        assert_eq!(json["pageSize"], 5);
    }
}
