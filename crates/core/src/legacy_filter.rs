//! The `Key='value'&...` filter string shared with the classifier prompt and
//! the invoice search backend.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extract::compile;

static INVOICE_NO: Lazy<Regex> = Lazy::new(|| compile(r"(?i)InvoiceNo\s*=\s*'([^']*)'"));
static FISCAL_YEAR: Lazy<Regex> = Lazy::new(|| compile(r"(?i)FiscalYear\s*=\s*'([^']*)'"));
static DATE_FROM: Lazy<Regex> = Lazy::new(|| compile(r"(?i)DateFrom\s*=\s*'([^']*)'"));
static DATE_TO: Lazy<Regex> = Lazy::new(|| compile(r"(?i)DateTo\s*=\s*'([^']*)'"));
static COMPANY_CODE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)CompanyCode\s*=\s*'([^']*)'"));
static OPEN_ITEM: Lazy<Regex> = Lazy::new(|| compile(r"(?i)OpenItem\s*=\s*'([^']*)'"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyField {
    InvoiceNo,
    FiscalYear,
    DateFrom,
    DateTo,
    CompanyCode,
    OpenItem,
}

impl LegacyField {
    fn pattern(self) -> &'static Regex {
        match self {
            Self::InvoiceNo => &INVOICE_NO,
            Self::FiscalYear => &FISCAL_YEAR,
            Self::DateFrom => &DATE_FROM,
            Self::DateTo => &DATE_TO,
            Self::CompanyCode => &COMPANY_CODE,
            Self::OpenItem => &OPEN_ITEM,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyFilter {
    pub invoice_no: String,
    pub fiscal_year: String,
    pub date_from: String,
    pub date_to: String,
    pub company_code: String,
    pub open_items_only: bool,
}

impl LegacyFilter {
    /// Reads the named sub-fields. Absent fields come back empty.
    pub fn parse(raw: &str) -> Self {
        Self {
            invoice_no: pick_field(raw, LegacyField::InvoiceNo).unwrap_or_default(),
            fiscal_year: pick_field(raw, LegacyField::FiscalYear).unwrap_or_default(),
            date_from: pick_field(raw, LegacyField::DateFrom).unwrap_or_default(),
            date_to: pick_field(raw, LegacyField::DateTo).unwrap_or_default(),
            company_code: pick_field(raw, LegacyField::CompanyCode).unwrap_or_default(),
            open_items_only: pick_field(raw, LegacyField::OpenItem).is_some_and(|flag| flag == "X"),
        }
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LegacyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open_item = if self.open_items_only { "OpenItem='X'&" } else { "" };
        write!(
            f,
            "InvoiceNo='{}'&InvoiceType='FI'&FiscalYear='{}'&DateFrom='{}'&DateTo='{}'&SalesOrder=''&{}CompanyCode='{}'",
            self.invoice_no, self.fiscal_year, self.date_from, self.date_to, open_item, self.company_code
        )
    }
}

/// Trimmed value of `name='...'`, matched case-insensitively. Empty values
/// count as absent.
pub fn pick_field(raw: &str, field: LegacyField) -> Option<String> {
    let value = field.pattern().captures(raw)?.get(1)?.as_str().trim();
    (!value.is_empty()).then(|| value.to_string())
}
