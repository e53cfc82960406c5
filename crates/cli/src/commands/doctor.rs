use std::time::Duration;

use arbot_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report(AppConfig::load(LoadOptions::default()));

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

/// Unset collaborators are skipped, not failed: the server runs without
/// them and disables the matching flows.
pub fn build_report<E: std::fmt::Display>(loaded: Result<AppConfig, E>) -> DoctorReport {
    let mut checks = Vec::new();

    match loaded {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            let endpoints = [
                ("ai_engine_reachability", config.ai_engine.base_url.as_deref(), "keyword classification only"),
                ("otc_reachability", config.otc.base_url.as_deref(), "invoice, download and statement flows disabled"),
                ("otc_documents_reachability", config.otc.documents_base_url.as_deref(), "documents use otc.base_url"),
                ("analytics_reachability", config.analytics.base_url.as_deref(), "customer analytics flow disabled"),
            ];
            for (name, base_url, when_unset) in endpoints {
                checks.push(check_endpoint(name, base_url, when_unset));
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in [
                "ai_engine_reachability",
                "otc_reachability",
                "otc_documents_reachability",
                "analytics_reachability",
            ] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_endpoint(name: &'static str, base_url: Option<&str>, when_unset: &str) -> DoctorCheck {
    let Some(base_url) = base_url else {
        return DoctorCheck {
            name,
            status: CheckStatus::Skipped,
            details: format!("not configured; {when_unset}"),
        };
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name,
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    // Any HTTP answer counts: the probe checks DNS, TLS and routing only
    let result = runtime.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|error| format!("failed to build http client: {error}"))?;
        let response = client
            .get(base_url)
            .send()
            .await
            .map_err(|error| format!("`{base_url}` is unreachable: {error}"))?;
        Ok::<u16, String>(response.status().as_u16())
    });

    match result {
        Ok(status) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("`{base_url}` answered with HTTP {status}"),
        },
        Err(details) => DoctorCheck { name, status: CheckStatus::Fail, details },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
