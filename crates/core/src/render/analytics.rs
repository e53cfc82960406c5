pub const ANALYTICS_EMPTY: &str =
    "No customer analytics data was returned. Please refine your question (client, period, metric).";
pub const ANALYTICS_UNAVAILABLE: &str =
    "Unable to retrieve customer analytics at this time. Please try again later.";

pub fn analytics_message(highlights: &[String]) -> String {
    let lines: Vec<&str> =
        highlights.iter().map(|line| line.trim()).filter(|line| !line.is_empty()).collect();
    if lines.is_empty() {
        return ANALYTICS_EMPTY.to_owned();
    }
    format!("Customer analytics summary:\n{}", lines.join("\n"))
}
