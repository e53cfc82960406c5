//! Date range rules and date token normalization.
//!
//! Every date leaving this module is `DD.MM.YYYY`. Range rules are tried in
//! order and the first one that yields a valid calendar range wins.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::compile;

const MONTH_NAMES: &str = "january|february|march|april|may|june|july|august|september|october|november|december|sept|jan|feb|mar|apr|jun|jul|aug|sep|oct|nov|dec";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub date_from: String,
    pub date_to: String,
    pub fiscal_year: String,
}

struct DateRule {
    name: &'static str,
    pattern: &'static Lazy<Regex>,
    build: fn(&Captures<'_>, &str) -> Option<DateRange>,
}

static DAY_RANGE_WITH_YEAR: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(r"(?i)\b(\d{{1,2}})\s*[-–]\s*(\d{{1,2}})\s*({MONTH_NAMES})\s*(20\d{{2}})\b"))
});
static DAY_RANGE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(r"(?i)\b(\d{{1,2}})\s*[-–]\s*(\d{{1,2}})\s*({MONTH_NAMES})\b"))
});
static NUMERIC_RANGE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\b(\d{1,2})[./-](\d{1,2})[./-](20\d{2})\s*(?:to|[-–])\s*(\d{1,2})[./-](\d{1,2})[./-](20\d{2})\b",
    )
});
static WHOLE_MONTH: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"(?i)\b({MONTH_NAMES})\s*(20\d{{2}})\b")));
static MONTH_FIRST_RANGE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"(?i)\b({MONTH_NAMES})\s+(\d{{1,2}})(?:st|nd|rd|th)?\s*(?:to|until|till|[-–])\s*(?:({MONTH_NAMES})\s+)?(\d{{1,2}})(?:st|nd|rd|th)?(?:\s*,?\s*(20\d{{2}}))?\b"
    ))
});

static DATE_RULES: [DateRule; 5] = [
    DateRule { name: "day_range_with_year", pattern: &DAY_RANGE_WITH_YEAR, build: day_range_with_year },
    DateRule { name: "day_range", pattern: &DAY_RANGE, build: day_range },
    DateRule { name: "numeric_range", pattern: &NUMERIC_RANGE, build: numeric_range },
    DateRule { name: "whole_month", pattern: &WHOLE_MONTH, build: whole_month },
    DateRule { name: "month_first_range", pattern: &MONTH_FIRST_RANGE, build: month_first_range },
];

static ORDINAL_SUFFIX: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b"));
static COMPACT: Lazy<Regex> = Lazy::new(|| compile(r"^\d{8}$"));
static YEAR_FIRST: Lazy<Regex> = Lazy::new(|| compile(r"^(\d{4})[-/.](\d{2})[-/.](\d{2})$"));
static DAY_FIRST: Lazy<Regex> = Lazy::new(|| compile(r"^(\d{2})[-/.](\d{2})[-/.](\d{4})$"));

const LOOSE_DATE_FORMATS: [&str; 9] = [
    "%d %B %Y", "%d %b %Y", "%B %d, %Y", "%B %d %Y", "%b %d, %Y", "%b %d %Y", "%d.%m.%Y",
    "%d/%m/%Y", "%Y-%m-%d",
];
const LOOSE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Finds a date range in `text`. `fallback_year` fills in rules that carry
/// no explicit year.
pub fn extract_date_range(text: &str, fallback_year: &str) -> Option<DateRange> {
    DATE_RULES.iter().find_map(|rule| {
        let captures = rule.pattern.captures(text)?;
        let range = (rule.build)(&captures, fallback_year)?;
        tracing::debug!(
            event_name = "extract.date_range.matched",
            rule = rule.name,
            date_from = %range.date_from,
            date_to = %range.date_to,
            "date rule matched"
        );
        Some(range)
    })
}

/// Renders a date token as `DD.MM.YYYY`. Unrecognized input comes back
/// unchanged, so the function is idempotent.
pub fn normalize_date_token(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if COMPACT.is_match(trimmed) {
        return format!("{}.{}.{}", &trimmed[6..8], &trimmed[4..6], &trimmed[0..4]);
    }
    if let Some(captures) = YEAR_FIRST.captures(trimmed) {
        return format!("{}.{}.{}", &captures[3], &captures[2], &captures[1]);
    }
    if let Some(captures) = DAY_FIRST.captures(trimmed) {
        return format!("{}.{}.{}", &captures[1], &captures[2], &captures[3]);
    }

    match parse_loose_date(trimmed) {
        Some(date) => display(date),
        None => trimmed.to_string(),
    }
}

/// `YYYYMMDD` form of any value `normalize_date_token` understands, or an
/// empty string when the value is not a real calendar date.
pub fn compact_date(value: &str) -> String {
    let normalized = normalize_date_token(value);
    NaiveDate::parse_from_str(&normalized, "%d.%m.%Y")
        .map(|date| date.format("%Y%m%d").to_string())
        .unwrap_or_default()
}

/// Both ends of a seeded range in `DD.MM.YYYY`, or `None` unless each end
/// is a real calendar date. A range is never kept half normalized.
pub fn normalize_date_pair(from: &str, to: &str) -> Option<(String, String)> {
    let parse = |value: &str| NaiveDate::parse_from_str(&normalize_date_token(value), "%d.%m.%Y").ok();
    Some((display(parse(from)?), display(parse(to)?)))
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt().map(|date| date.day())
}

pub fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn parse_loose_date(value: &str) -> Option<NaiveDate> {
    if let Ok(timestamp) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.date_naive());
    }
    if let Some(date) = LOOSE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
    {
        return Some(date.date());
    }

    let cleaned = ORDINAL_SUFFIX.replace_all(value, "$1");
    LOOSE_DATE_FORMATS.iter().find_map(|format| NaiveDate::parse_from_str(&cleaned, format).ok())
}

fn display(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

fn calendar_date(day: &str, month: u32, year: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

fn range(from: NaiveDate, to: NaiveDate, fiscal_year: &str) -> Option<DateRange> {
    Some(DateRange { date_from: display(from), date_to: display(to), fiscal_year: fiscal_year.to_string() })
}

fn day_range_with_year(captures: &Captures<'_>, _fallback_year: &str) -> Option<DateRange> {
    let month = month_number(&captures[3])?;
    let year = &captures[4];
    range(calendar_date(&captures[1], month, year)?, calendar_date(&captures[2], month, year)?, year)
}

fn day_range(captures: &Captures<'_>, fallback_year: &str) -> Option<DateRange> {
    let month = month_number(&captures[3])?;
    range(
        calendar_date(&captures[1], month, fallback_year)?,
        calendar_date(&captures[2], month, fallback_year)?,
        fallback_year,
    )
}

fn numeric_range(captures: &Captures<'_>, _fallback_year: &str) -> Option<DateRange> {
    let from = calendar_date(&captures[1], captures[2].parse().ok()?, &captures[3])?;
    let to = calendar_date(&captures[4], captures[5].parse().ok()?, &captures[6])?;
    range(from, to, &captures[3])
}

fn whole_month(captures: &Captures<'_>, _fallback_year: &str) -> Option<DateRange> {
    let month = month_number(&captures[1])?;
    let year = &captures[2];
    let last_day = last_day_of_month(year.parse().ok()?, month)?;
    range(calendar_date("1", month, year)?, calendar_date(&last_day.to_string(), month, year)?, year)
}

fn month_first_range(captures: &Captures<'_>, fallback_year: &str) -> Option<DateRange> {
    let from_month = month_number(&captures[1])?;
    let to_month = match captures.get(3) {
        Some(name) => month_number(name.as_str())?,
        None => from_month,
    };
    let year = captures.get(5).map_or(fallback_year, |year| year.as_str());
    range(
        calendar_date(&captures[2], from_month, year)?,
        calendar_date(&captures[4], to_month, year)?,
        year,
    )
}
