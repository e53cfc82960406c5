use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::compile;

/// Follow-up intent of a short in-flow reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlIntent {
    Next,
    Prev,
    OpenOnly,
    AllItems,
    ClearedOnly,
    Reset,
    Refine,
    InvoiceNumberOnly,
    None,
}

impl ControlIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Prev => "prev",
            Self::OpenOnly => "openOnly",
            Self::AllItems => "allItems",
            Self::ClearedOnly => "clearedOnly",
            Self::Reset => "reset",
            Self::Refine => "refine",
            Self::InvoiceNumberOnly => "invoiceNumberOnly",
            Self::None => "none",
        }
    }

    pub fn is_control(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for ControlIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ControlRule {
    intent: ControlIntent,
    pattern: Lazy<Regex>,
}

// Evaluated in order against the lowercased, trimmed utterance.
static CONTROL_RULES: [ControlRule; 8] = [
    ControlRule {
        intent: ControlIntent::Next,
        pattern: Lazy::new(|| compile(r"^(?:next|more|show more|continue|next page)$")),
    },
    ControlRule {
        intent: ControlIntent::Prev,
        pattern: Lazy::new(|| compile(r"^(?:prev|previous|back)$")),
    },
    ControlRule {
        intent: ControlIntent::OpenOnly,
        pattern: Lazy::new(|| {
            compile(r"open items only|open only|only open|show open|open invoices")
        }),
    },
    ControlRule {
        intent: ControlIntent::AllItems,
        pattern: Lazy::new(|| {
            compile(r"all items|all invoices|show all|include cleared|open and cleared")
        }),
    },
    ControlRule {
        intent: ControlIntent::ClearedOnly,
        pattern: Lazy::new(|| compile(r"cleared only|only cleared|show cleared")),
    },
    ControlRule {
        intent: ControlIntent::Reset,
        pattern: Lazy::new(|| compile(r"start over|reset|clear filters")),
    },
    ControlRule {
        intent: ControlIntent::Refine,
        pattern: Lazy::new(|| {
            compile(
                r"company\s*code|\bcc\b|fiscal\s*year|\bfy\b|\bfrom\b|\bto\b|\bbetween\b|\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)",
            )
        }),
    },
    ControlRule {
        intent: ControlIntent::InvoiceNumberOnly,
        pattern: Lazy::new(|| compile(r"^\d{6,12}$")),
    },
];

pub fn detect_control_intent(text: &str) -> ControlIntent {
    let normalized = text.trim().to_lowercase();
    CONTROL_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(&normalized))
        .map_or(ControlIntent::None, |rule| rule.intent)
}
