use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::compile;

static COMPANY_CODE: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\bcompany\s*code\s*[:=]?\s*(\d{3})\b"));
static COMPANY_CODE_SHORT: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bcc\s*[:=]?\s*(\d{3})\b"));
static FISCAL_YEAR: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\b(?:fy|fiscal\s*year)\s*[:=]?\s*(20\d{2})\b"));
static BARE_YEAR: Lazy<Regex> = Lazy::new(|| compile(r"\b(20\d{2})\b"));
static OPEN_ONLY: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bopen\s*items?\b|\bopen\s+only\b|\bonly\s+open\b"));
static ALL_ITEMS: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\ball\b|\binclude\s+cleared\b|\bopen\s+and\s+cleared\b"));
static NEXT_PAGE: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\b(?:next|more|show\s*more|next\s*\d+)\b|\bcontinue\b"));
static RESET: Lazy<Regex> = Lazy::new(|| compile(r"(?i)start\s+over|reset|clear\s+filters"));

/// Open-item filter requested by the user. `OpenOnly` maps to the `X` flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenItemPreference {
    OpenOnly,
    All,
}

impl OpenItemPreference {
    pub fn flag(&self) -> &'static str {
        match self {
            Self::OpenOnly => "X",
            Self::All => "",
        }
    }
}

pub fn extract_company_code(text: &str) -> Option<String> {
    COMPANY_CODE
        .captures(text)
        .or_else(|| COMPANY_CODE_SHORT.captures(text))
        .map(|captures| captures[1].to_string())
}

/// Explicit `fy`/`fiscal year` wins; otherwise the first bare `20xx` token.
/// The bare rule also fires on amounts such as `2050.00`.
pub fn extract_fiscal_year(text: &str) -> Option<String> {
    FISCAL_YEAR
        .captures(text)
        .or_else(|| BARE_YEAR.captures(text))
        .map(|captures| captures[1].to_string())
}

/// `All` wins when both kinds of phrase appear.
pub fn extract_open_item_preference(text: &str) -> Option<OpenItemPreference> {
    if ALL_ITEMS.is_match(text) {
        Some(OpenItemPreference::All)
    } else if OPEN_ONLY.is_match(text) {
        Some(OpenItemPreference::OpenOnly)
    } else {
        None
    }
}

pub fn wants_next_page(text: &str) -> bool {
    NEXT_PAGE.is_match(text)
}

pub fn wants_reset(text: &str) -> bool {
    RESET.is_match(text)
}
