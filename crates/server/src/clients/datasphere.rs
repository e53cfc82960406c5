//! Customer payment analytics from the Datasphere consumption API.

use std::time::Duration;

use arbot_core::errors::IntegrationError;
use arbot_core::ports::{AnalyticsResult, CustomerAnalytics};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::info;

use super::{join_url, request_error};

const SERVICE: &str = "datasphere.customer_analytics";
const DEFAULT_LIMIT: u32 = 5;
const UNKNOWN_CUSTOMER: &str = "Unknown Customer";

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(error) => panic!("built-in analytics pattern `{pattern}` is invalid: {error}"),
    }
}

static BOTTOM: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\b(?:bottom|worst|bad|delayed)\b"));
static RANKED_LIMIT: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)(?:top|bottom|best|worst|bad|delayed|on\s*-?time)\s*(\d{1,3})")
});
static CUSTOMER_LIMIT: Lazy<Regex> = Lazy::new(|| compile(r"(?i)(\d{1,3})\s*customers?"));
static CROSS_LOB: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)(cross[-\s]*lob|across\s+all\s+(?:lines?\s+of\s+business|lobs?)|across\s+lobs?)")
});
static ELECTRONICS: Lazy<Regex> = Lazy::new(|| compile(r"(?i)(\belect\b|electronics?\s*288)"));

const NAME_KEYS: [&str; 5] =
    ["CustomerName", "Customer", "Customer_Name", "CUSTOMER", "CustomerDescription"];
const DAYS_KEYS: [&str; 5] = [
    "Average_Customer_Payment_Days",
    "AverageCustomerPaymentDays",
    "AvgPaymentDays",
    "AveragePaymentDays",
    "Averagecustomerpaymentdays",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ranking {
    /// Fastest payers, ascending payment days.
    Top,
    /// Slowest payers, descending payment days.
    Bottom,
}

impl Ranking {
    fn order(self) -> &'static str {
        match self {
            Self::Top => "asc",
            Self::Bottom => "desc",
        }
    }
}

/// What the question asks for, read with fixed patterns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyticsQuery {
    pub ranking: Ranking,
    pub limit: u32,
    /// Empty means every line of business.
    pub client: String,
}

impl AnalyticsQuery {
    pub fn parse(question: &str, default_client: &str) -> Self {
        let ranking = if BOTTOM.is_match(question) { Ranking::Bottom } else { Ranking::Top };
        let limit = RANKED_LIMIT
            .captures(question)
            .or_else(|| CUSTOMER_LIMIT.captures(question))
            .and_then(|captures| captures[1].parse::<u32>().ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_LIMIT);
        let client = if CROSS_LOB.is_match(question) {
            String::new()
        } else if ELECTRONICS.is_match(question) {
            "Electronics 288".to_owned()
        } else {
            default_client.to_owned()
        };
        Self { ranking, limit, client }
    }

    /// OData system query options. Cross-LOB questions carry no `$filter`.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(5);
        if !self.client.is_empty() {
            params.push(("$filter", format!("Client eq '{}'", self.client)));
        }
        params.push(("$orderby", format!("Average_Customer_Payment_Days {}", self.ranking.order())));
        params.push(("$count", "true".to_owned()));
        params.push(("$top", self.limit.to_string()));
        params.push(("$skip", "0".to_owned()));
        params
    }
}

/// Rows from `value`, `d.results` or a bare array.
pub fn read_records(body: &Value) -> Vec<Value> {
    body.get("value")
        .and_then(Value::as_array)
        .or_else(|| body.pointer("/d/results").and_then(Value::as_array))
        .or_else(|| body.as_array())
        .cloned()
        .unwrap_or_default()
}

/// `"1. Acme - 12.5 days"`, or `N/A` when the row has no payment days.
pub fn highlight(position: usize, record: &Value) -> String {
    let name = NAME_KEYS
        .iter()
        .find_map(|key| record.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_CUSTOMER);
    let days = DAYS_KEYS.iter().find_map(|key| match record.get(*key)? {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        _ => None,
    });
    match days {
        Some(days) => format!("{position}. {name} - {days} days"),
        None => format!("{position}. {name} - N/A"),
    }
}

pub struct DatasphereAnalytics {
    client: Client,
    base_url: String,
    path: String,
    default_client: String,
    timeout: Duration,
}

impl DatasphereAnalytics {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        path: impl Into<String>,
        default_client: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            path: path.into(),
            default_client: default_client.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CustomerAnalytics for DatasphereAnalytics {
    async fn query(&self, question: &str) -> Result<AnalyticsResult, IntegrationError> {
        let query = AnalyticsQuery::parse(question, &self.default_client);
        let url = join_url(&self.base_url, &self.path);

        let response = self
            .client
            .get(&url)
            .query(&query.params())
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|error| request_error(SERVICE, self.timeout, error))?;
        if !response.status().is_success() {
            return Err(IntegrationError::Status {
                service: SERVICE.to_owned(),
                status: response.status().as_u16(),
            });
        }
        let body = response
            .json::<Value>()
            .await
            .map_err(|error| IntegrationError::decode(SERVICE, error.to_string()))?;

        let highlights: Vec<String> = read_records(&body)
            .iter()
            .enumerate()
            .map(|(index, record)| highlight(index + 1, record))
            .collect();
        info!(
            event_name = "downstream.datasphere.read",
            ranking = ?query.ranking,
            limit = query.limit,
            client = %query.client,
            returned = highlights.len(),
            "customer analytics read"
        );
        Ok(AnalyticsResult { highlights })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{highlight, read_records, AnalyticsQuery, Ranking};

    const PATH: &str = "/api/v1/dwc/consumption/relational/AR/Customer_Payments";

    #[test]
    fn slow_payers_rank_descending() {
        let query = AnalyticsQuery::parse("show the worst 10 customers by payment days", "Aerospace 288");
        assert_eq!(query.ranking, Ranking::Bottom);
        assert_eq!(query.limit, 10);
        assert_eq!(query.client, "Aerospace 288");
        assert_eq!(
            query.params(),
            vec![
                ("$filter", "Client eq 'Aerospace 288'".to_owned()),
                ("$orderby", "Average_Customer_Payment_Days desc".to_owned()),
                ("$count", "true".to_owned()),
                ("$top", "10".to_owned()),
                ("$skip", "0".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn filter_survives_url_encoding() {
        let query = AnalyticsQuery::parse("worst 3 customers", "Aerospace 288");
        let request = reqwest::Client::new()
            .get(format!("https://datasphere.example{PATH}"))
            .query(&query.params())
            .build()
            .expect("request builds");

        assert_eq!(request.url().path(), PATH);
        let pairs: Vec<(String, String)> = request.url().query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("$filter".to_owned(), "Client eq 'Aerospace 288'".to_owned()));
        assert_eq!(pairs[3], ("$top".to_owned(), "3".to_owned()));
    }

    #[test]
    fn limit_falls_back_to_customer_count_then_default() {
        assert_eq!(AnalyticsQuery::parse("list 7 customers paying fastest", "").limit, 7);
        assert_eq!(AnalyticsQuery::parse("who pays on time", "").limit, 5);
        assert_eq!(AnalyticsQuery::parse("top 0 customers", "").limit, 5);
        assert_eq!(AnalyticsQuery::parse("who pays on time", "").ranking, Ranking::Top);
    }

    #[test]
    fn line_of_business_selection() {
        let across = AnalyticsQuery::parse("top 3 payers across all lines of business", "Aerospace 288");
        assert!(across.client.is_empty());
        assert_eq!(across.params()[0].0, "$orderby");

        let electronics = AnalyticsQuery::parse("best payers in electronics 288", "Aerospace 288");
        assert_eq!(electronics.client, "Electronics 288");
    }

    #[test]
    fn records_and_highlights() {
        let body = json!({"value": [
            {"CustomerName": "Acme", "Average_Customer_Payment_Days": 12.5},
            {"Customer": "Globex", "AvgPaymentDays": "30"},
            {"Other": true}
        ]});
        let records = read_records(&body);
        assert_eq!(records.len(), 3);
        assert_eq!(highlight(1, &records[0]), "1. Acme - 12.5 days");
        assert_eq!(highlight(2, &records[1]), "2. Globex - 30 days");
        assert_eq!(highlight(3, &records[2]), "3. Unknown Customer - N/A");

        assert_eq!(read_records(&json!({"d": {"results": [{}]}})).len(), 1);
        assert_eq!(read_records(&json!([{}, {}])).len(), 2);
        assert!(read_records(&json!({"error": "x"})).is_empty());
    }
}
