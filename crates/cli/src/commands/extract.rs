use arbot_core::extract::{
    derive_from_invoice_number, detect_control_intent, extract_delta, normalize_invoice_digits,
    pick_longest_digit_run, ControlIntent, ExtractedDelta, ExtractionContext, InvoiceDerivation,
};
use chrono::{Datelike, Utc};
use serde::Serialize;

use super::CommandResult;

#[derive(Debug, Serialize)]
pub struct ExtractReport {
    pub command: &'static str,
    pub status: &'static str,
    pub utterance: String,
    pub control_intent: ControlIntent,
    pub delta: ExtractedDelta,
    /// Longest digit run in the utterance, if any.
    pub invoice_digits: Option<String>,
    pub normalized_invoice: Option<String>,
    pub derivation: Option<InvoiceDerivation>,
}

/// Offline view of what the extraction rules read from one utterance.
pub fn run(utterance: &str, fiscal_year: Option<&str>) -> CommandResult {
    if utterance.trim().is_empty() {
        return CommandResult::failure("extract", "invalid_input", "utterance must not be empty", 2);
    }
    if let Some(year) = fiscal_year {
        if year.len() != 4 || !year.bytes().all(|byte| byte.is_ascii_digit()) {
            return CommandResult::failure(
                "extract",
                "invalid_input",
                format!("--fiscal-year must be four digits, got `{year}`"),
                2,
            );
        }
    }

    let report = build_report(utterance, fiscal_year.unwrap_or_default(), Utc::now().year());
    match serde_json::to_string_pretty(&report) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("extract", "serialization", error.to_string(), 1),
    }
}

pub fn build_report(utterance: &str, known_fiscal_year: &str, current_year: i32) -> ExtractReport {
    let delta = extract_delta(utterance, ExtractionContext::new(known_fiscal_year, current_year));
    let digits = pick_longest_digit_run(utterance);
    let (invoice_digits, normalized_invoice, derivation) = if digits.is_empty() {
        (None, None, None)
    } else {
        let normalized = normalize_invoice_digits(&digits);
        let derivation = derive_from_invoice_number(&normalized);
        (Some(digits), Some(normalized), Some(derivation))
    };

    ExtractReport {
        command: "extract",
        status: "ok",
        utterance: utterance.trim().to_string(),
        control_intent: detect_control_intent(utterance),
        delta,
        invoice_digits,
        normalized_invoice,
        derivation,
    }
}

#[cfg(test)]
mod tests {
    use arbot_core::extract::ControlIntent;

    use super::build_report;

    #[test]
    fn conversational_range_reports_dates_and_company_code() {
        let report = build_report(
            "Can get invoices between January 1 to January 10 and company code 898",
            "",
            2024,
        );

        assert_eq!(report.delta.company_code.as_deref(), Some("898"));
        assert_eq!(report.delta.date_from.as_deref(), Some("01.01.2024"));
        assert_eq!(report.delta.date_to.as_deref(), Some("10.01.2024"));
        assert_eq!(report.delta.fiscal_year.as_deref(), Some("2024"));
        assert_eq!(report.control_intent, ControlIntent::Refine);
        assert_eq!(report.invoice_digits.as_deref(), Some("898"));
    }

    #[test]
    fn bare_invoice_number_is_normalized_and_derived() {
        let report = build_report("248013075", "", 2026);

        assert_eq!(report.control_intent, ControlIntent::InvoiceNumberOnly);
        assert_eq!(report.invoice_digits.as_deref(), Some("248013075"));
        assert_eq!(report.normalized_invoice.as_deref(), Some("0248013075"));
        let derivation = report.derivation.expect("digits should derive");
        assert_eq!(derivation.fiscal_year, "2024");
        assert_eq!(derivation.company_code, "801");
    }

    #[test]
    fn control_words_have_no_digits() {
        let report = build_report("next", "2024", 2026);
        assert_eq!(report.control_intent, ControlIntent::Next);
        assert!(report.delta.wants_next);
        assert!(report.invoice_digits.is_none());
    }
}
