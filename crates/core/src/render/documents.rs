use serde::{Deserialize, Serialize};

use crate::ports::{DocumentLink, EStatus, Precheck};

pub const DOWNLOAD_NEEDS_INVOICE: &str =
    "Kindly provide the invoice number required for the download.";
pub const DOWNLOAD_NOT_FOUND: &str = "Invoice not found.";
pub const DOWNLOAD_UNAVAILABLE: &str =
    "Invoice download service is temporarily unavailable. Please try again in a few minutes.";

pub const STATEMENT_NEEDS_DETAILS: &str =
    "Kindly provide Company Code, Customer Code, and As-Of Date to generate the SOA.";
pub const STATEMENT_NOT_GENERATED: &str = "Unable to generate SOA at this time.";
pub const STATEMENT_UNAVAILABLE: &str =
    "SOA service is temporarily unavailable. Please try again later.";
pub const STATEMENT_LINK_LABEL: &str = "StatementOfAccount";

/// Resolved result of a precheck-then-link document request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentOutcome {
    MissingDetails,
    /// Upstream `E` status with its message, possibly empty.
    Rejected(String),
    Ready { url: String },
    Unavailable,
}

impl DocumentOutcome {
    /// Combines a precheck with the link lookup made after an `S` status.
    pub fn from_precheck(precheck: &Precheck, link: Option<&DocumentLink>) -> Self {
        match precheck.status {
            EStatus::Error => Self::Rejected(precheck.message.clone()),
            EStatus::Success => match link.map(|link| link.url.trim()) {
                Some(url) if !url.is_empty() => Self::Ready { url: url.to_string() },
                _ => Self::Unavailable,
            },
            EStatus::Unknown => Self::Unavailable,
        }
    }
}

pub fn download_message(invoice_number: &str, outcome: &DocumentOutcome) -> String {
    match outcome {
        DocumentOutcome::MissingDetails => DOWNLOAD_NEEDS_INVOICE.to_owned(),
        DocumentOutcome::Rejected(message) => verbatim_or(message, DOWNLOAD_NOT_FOUND),
        DocumentOutcome::Ready { url } => link_markup(invoice_number, url),
        DocumentOutcome::Unavailable => DOWNLOAD_UNAVAILABLE.to_owned(),
    }
}

pub fn statement_message(outcome: &DocumentOutcome) -> String {
    match outcome {
        DocumentOutcome::MissingDetails => STATEMENT_NEEDS_DETAILS.to_owned(),
        DocumentOutcome::Rejected(message) => verbatim_or(message, STATEMENT_NOT_GENERATED),
        DocumentOutcome::Ready { url } => link_markup(STATEMENT_LINK_LABEL, url),
        DocumentOutcome::Unavailable => STATEMENT_UNAVAILABLE.to_owned(),
    }
}

fn link_markup(label: &str, url: &str) -> String {
    format!("<href>{label}</href>\n\n<href-value>{url}</href-value>")
}

fn verbatim_or(message: &str, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_owned()
    } else {
        message.to_owned()
    }
}
