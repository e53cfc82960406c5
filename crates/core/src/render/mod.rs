//! Fixed-text responses for the deterministic flows. Nothing in here calls
//! a model; identical inputs always render identical text.

pub mod analytics;
pub mod documents;
pub mod invoice;

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::flows::states::FilterState;

pub use analytics::{analytics_message, ANALYTICS_UNAVAILABLE};
pub use documents::{download_message, statement_message, DocumentOutcome};
pub use invoice::{
    empty_result_message, format_invoice_block, missing_filters_prompt, result_page_message,
    INVOICE_SEARCH_UNAVAILABLE,
};

pub const UNCLASSIFIED_MESSAGE: &str = "I could not classify your request. Please rephrase.";

/// One-line summary of the filters that are set, or `no filters`.
pub fn summarize_filters(state: &FilterState) -> String {
    let mut parts = Vec::new();
    if !state.company_code.is_empty() {
        parts.push(format!("Company Code {}", state.company_code));
    }
    if !state.fiscal_year.is_empty() {
        parts.push(format!("Fiscal Year {}", state.fiscal_year));
    }
    if state.has_date_range() {
        parts.push(format!("Date {} to {}", state.date_from, state.date_to));
    }
    if state.open_items_only() {
        parts.push("OPEN items only".to_owned());
    }

    if parts.is_empty() {
        "no filters".to_owned()
    } else {
        parts.join(", ")
    }
}

/// Two decimals with comma thousands separators. Non-numeric text is
/// returned as given.
pub fn format_amount(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let Some(amount) = parse_decimal(trimmed) else {
        return trimmed.to_string();
    };

    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let fixed = format!("{:.2}", rounded.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}{}.{fraction}", group_thousands(whole))
}

fn parse_decimal(value: &str) -> Option<Decimal> {
    Decimal::from_str(value).or_else(|_| Decimal::from_scientific(value)).ok()
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}
