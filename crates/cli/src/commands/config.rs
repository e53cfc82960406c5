use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use arbot_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// One effective setting. `env_key` is the variable that overrides it.
struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key_path: &'static str, env_keys: &'static [&'static str], value: impl Into<String>) -> Self {
        Self { key_path, env_keys, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let ai = &config.ai_engine;
    let otc = &config.otc;
    let analytics = &config.analytics;
    let flows = &config.flows;
    let server = &config.server;

    vec![
        Field::new("ai_engine.base_url", &["ARBOT_AI_ENGINE_BASE_URL"], unset_or(ai.base_url.as_deref())),
        Field::new(
            "ai_engine.api_key",
            &["ARBOT_AI_ENGINE_API_KEY"],
            if ai.api_key.is_some() { "<redacted>" } else { "<unset>" },
        ),
        Field::new("ai_engine.timeout_secs", &["ARBOT_AI_ENGINE_TIMEOUT_SECS"], ai.timeout_secs.to_string()),
        Field::new("ai_engine.app_id", &["ARBOT_AI_ENGINE_APP_ID"], ai.app_id.as_str()),
        Field::new("ai_engine.source_service", &["ARBOT_AI_ENGINE_SOURCE_SERVICE"], ai.source_service.as_str()),
        Field::new("ai_engine.rag_top_k", &["ARBOT_AI_ENGINE_RAG_TOP_K"], ai.rag_top_k.to_string()),
        Field::new("otc.base_url", &["ARBOT_OTC_BASE_URL"], unset_or(otc.base_url.as_deref())),
        Field::new(
            "otc.documents_base_url",
            &["ARBOT_OTC_DOCUMENTS_BASE_URL"],
            unset_or(otc.documents_base_url.as_deref()),
        ),
        Field::new("otc.system_alias", &["ARBOT_OTC_SYSTEM_ALIAS"], otc.system_alias.as_str()),
        Field::new("otc.timeout_secs", &["ARBOT_OTC_TIMEOUT_SECS"], otc.timeout_secs.to_string()),
        Field::new("analytics.base_url", &["ARBOT_ANALYTICS_BASE_URL"], unset_or(analytics.base_url.as_deref())),
        Field::new("analytics.path", &["ARBOT_ANALYTICS_PATH"], analytics.path.as_str()),
        Field::new("analytics.default_client", &["ARBOT_ANALYTICS_DEFAULT_CLIENT"], analytics.default_client.as_str()),
        Field::new("analytics.timeout_secs", &["ARBOT_ANALYTICS_TIMEOUT_SECS"], analytics.timeout_secs.to_string()),
        Field::new("flows.session_ttl_secs", &["ARBOT_FLOWS_SESSION_TTL_SECS"], flows.session_ttl_secs.to_string()),
        Field::new(
            "flows.short_followup_chars",
            &["ARBOT_FLOWS_SHORT_FOLLOWUP_CHARS"],
            flows.short_followup_chars.to_string(),
        ),
        Field::new("flows.refine_threshold", &["ARBOT_FLOWS_REFINE_THRESHOLD"], flows.refine_threshold.to_string()),
        Field::new("server.bind_address", &["ARBOT_SERVER_BIND_ADDRESS"], server.bind_address.as_str()),
        Field::new("server.port", &["ARBOT_SERVER_PORT"], server.port.to_string()),
        Field::new(
            "server.graceful_shutdown_secs",
            &["ARBOT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            server.graceful_shutdown_secs.to_string(),
        ),
        Field::new("logging.level", &["ARBOT_LOGGING_LEVEL", "ARBOT_LOG_LEVEL"], config.logging.level.as_str()),
        Field::new(
            "logging.format",
            &["ARBOT_LOGGING_FORMAT", "ARBOT_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn unset_or(value: Option<&str>) -> String {
    value.unwrap_or("<unset>").to_string()
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("arbot.toml"), PathBuf::from("config/arbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
