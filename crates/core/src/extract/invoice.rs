//! Invoice number handling.
//!
//! Invoice numbers follow a fixed scheme: two digits of fiscal year, three
//! digits of company code, then the document sequence, zero-padded to ten
//! digits on the wire (`0248013075` is FY 2024, company code 801).

use serde::{Deserialize, Serialize};

pub const INVOICE_NUMBER_WIDTH: usize = 10;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDerivation {
    pub fiscal_year: String,
    pub company_code: String,
    pub accounting_document: String,
}

/// Strips non-digits, keeps the last ten digits, and left-pads with zeros.
pub fn normalize_invoice_digits(raw: &str) -> String {
    let digits = digits_only(raw);
    if digits.is_empty() {
        return String::new();
    }

    let tail = if digits.len() > INVOICE_NUMBER_WIDTH {
        &digits[digits.len() - INVOICE_NUMBER_WIDTH..]
    } else {
        digits.as_str()
    };
    format!("{tail:0>width$}", width = INVOICE_NUMBER_WIDTH)
}

/// Longest maximal run of ASCII digits; ties go to the earliest run.
pub fn pick_longest_digit_run(text: &str) -> String {
    let mut best = "";
    let mut run_start = None;

    for (index, character) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        match (character.is_ascii_digit(), run_start) {
            (true, None) => run_start = Some(index),
            (false, Some(start)) => {
                let run = &text[start..index];
                if run.len() > best.len() {
                    best = run;
                }
                run_start = None;
            }
            _ => {}
        }
    }

    best.to_string()
}

pub fn derive_from_invoice_number(raw: &str) -> InvoiceDerivation {
    let digits = digits_only(raw);

    match digits.len() {
        9 => InvoiceDerivation {
            fiscal_year: format!("20{}", &digits[0..2]),
            company_code: digits[2..5].to_string(),
            accounting_document: digits,
        },
        10 if digits.starts_with('0') => {
            let stripped = digits.trim_start_matches('0');
            let accounting_document =
                if stripped.is_empty() { digits.clone() } else { stripped.to_string() };
            InvoiceDerivation {
                fiscal_year: format!("20{}", &digits[1..3]),
                company_code: digits[3..6].to_string(),
                accounting_document,
            }
        }
        _ => InvoiceDerivation { accounting_document: digits, ..InvoiceDerivation::default() },
    }
}

pub(crate) fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}
