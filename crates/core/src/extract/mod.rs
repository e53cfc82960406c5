//! Rule-based extraction of filter fragments from a single utterance.
//!
//! Everything here is pure: the same text and context always produce the
//! same delta. Rules favour precision; ambiguous input yields nothing and
//! the flow asks the user instead.

pub mod control;
pub mod dates;
pub mod filters;
pub mod invoice;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use control::{detect_control_intent, ControlIntent};
pub use dates::{
    compact_date, extract_date_range, normalize_date_pair, normalize_date_token, DateRange,
};
pub use filters::{
    extract_company_code, extract_fiscal_year, extract_open_item_preference, wants_next_page,
    wants_reset, OpenItemPreference,
};
pub use invoice::{
    derive_from_invoice_number, normalize_invoice_digits, pick_longest_digit_run,
    InvoiceDerivation,
};

/// Built-in patterns are literals; a failure here is a programming error.
pub(crate) fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(error) => panic!("built-in extraction pattern `{pattern}` is invalid: {error}"),
    }
}

/// Prior state consulted while extracting, used only for year inference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractionContext<'a> {
    pub known_fiscal_year: &'a str,
    pub current_year: i32,
}

impl<'a> ExtractionContext<'a> {
    pub fn new(known_fiscal_year: &'a str, current_year: i32) -> Self {
        Self { known_fiscal_year, current_year }
    }
}

/// Candidate filter values found in one turn. `None` means the utterance
/// said nothing about that field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDelta {
    pub company_code: Option<String>,
    pub fiscal_year: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub open_item: Option<OpenItemPreference>,
    pub wants_next: bool,
    pub wants_previous: bool,
    pub wants_reset: bool,
}

pub fn extract_delta(text: &str, context: ExtractionContext<'_>) -> ExtractedDelta {
    let text = text.trim();
    let company_code = extract_company_code(text);
    let mut fiscal_year = extract_fiscal_year(text);

    let fallback_year = match (&fiscal_year, context.known_fiscal_year) {
        (Some(year), _) => year.clone(),
        (None, known) if !known.is_empty() => known.to_string(),
        (None, _) => context.current_year.to_string(),
    };

    let (date_from, date_to) = match extract_date_range(text, &fallback_year) {
        Some(range) => {
            if fiscal_year.is_none() {
                fiscal_year = Some(range.fiscal_year);
            }
            (Some(range.date_from), Some(range.date_to))
        }
        None => (None, None),
    };

    ExtractedDelta {
        company_code,
        fiscal_year,
        date_from,
        date_to,
        open_item: extract_open_item_preference(text),
        wants_next: wants_next_page(text),
        wants_previous: detect_control_intent(text) == ControlIntent::Prev,
        wants_reset: wants_reset(text),
    }
}
