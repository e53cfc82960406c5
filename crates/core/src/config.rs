use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub ai_engine: AiEngineConfig,
    pub otc: OtcConfig,
    pub analytics: AnalyticsConfig,
    pub flows: FlowsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Classification, generic answers and usage metering. `base_url = None`
/// leaves the classifier unconfigured; the guard then relies on its
/// keyword heuristic alone.
#[derive(Clone, Debug)]
pub struct AiEngineConfig {
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
    pub app_id: String,
    pub source_service: String,
    pub rag_top_k: u32,
}

#[derive(Clone, Debug)]
pub struct OtcConfig {
    pub base_url: Option<String>,
    pub documents_base_url: Option<String>,
    pub system_alias: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AnalyticsConfig {
    pub base_url: Option<String>,
    pub path: String,
    pub default_client: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct FlowsConfig {
    pub session_ttl_secs: u64,
    pub short_followup_chars: usize,
    pub refine_threshold: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub ai_engine_base_url: Option<String>,
    pub ai_engine_api_key: Option<String>,
    pub otc_base_url: Option<String>,
    pub analytics_base_url: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_ANALYTICS_PATH: &str =
    "api/v1/datasphere/consumption/relational/GROUP_IT_SAP/4GV_FF_S_FI_OTCKPI_01/_4GV_FF_S_FI_OTCKPI_01";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ai_engine: AiEngineConfig {
                base_url: None,
                api_key: None,
                timeout_secs: 30,
                app_id: "OTC-CHATBOT".to_string(),
                source_service: "AR_ASSISTANT".to_string(),
                rag_top_k: 30,
            },
            otc: OtcConfig {
                base_url: None,
                documents_base_url: None,
                system_alias: "AERO288".to_string(),
                timeout_secs: 30,
            },
            analytics: AnalyticsConfig {
                base_url: None,
                path: DEFAULT_ANALYTICS_PATH.to_string(),
                default_client: "Aerospace 288".to_string(),
                timeout_secs: 30,
            },
            flows: FlowsConfig {
                session_ttl_secs: 1800,
                short_followup_chars: 25,
                refine_threshold: 50,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl OtcConfig {
    /// Host for the PDF and SOA OData services; falls back to the search host.
    pub fn documents_url(&self) -> Option<&str> {
        self.documents_base_url.as_deref().or(self.base_url.as_deref())
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("arbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(ai_engine) = patch.ai_engine {
            if let Some(base_url) = ai_engine.base_url {
                self.ai_engine.base_url = Some(base_url);
            }
            if let Some(api_key_value) = ai_engine.api_key {
                self.ai_engine.api_key = Some(secret_value(api_key_value));
            }
            if let Some(timeout_secs) = ai_engine.timeout_secs {
                self.ai_engine.timeout_secs = timeout_secs;
            }
            if let Some(app_id) = ai_engine.app_id {
                self.ai_engine.app_id = app_id;
            }
            if let Some(source_service) = ai_engine.source_service {
                self.ai_engine.source_service = source_service;
            }
            if let Some(rag_top_k) = ai_engine.rag_top_k {
                self.ai_engine.rag_top_k = rag_top_k;
            }
        }

        if let Some(otc) = patch.otc {
            if let Some(base_url) = otc.base_url {
                self.otc.base_url = Some(base_url);
            }
            if let Some(documents_base_url) = otc.documents_base_url {
                self.otc.documents_base_url = Some(documents_base_url);
            }
            if let Some(system_alias) = otc.system_alias {
                self.otc.system_alias = system_alias;
            }
            if let Some(timeout_secs) = otc.timeout_secs {
                self.otc.timeout_secs = timeout_secs;
            }
        }

        if let Some(analytics) = patch.analytics {
            if let Some(base_url) = analytics.base_url {
                self.analytics.base_url = Some(base_url);
            }
            if let Some(path) = analytics.path {
                self.analytics.path = path;
            }
            if let Some(default_client) = analytics.default_client {
                self.analytics.default_client = default_client;
            }
            if let Some(timeout_secs) = analytics.timeout_secs {
                self.analytics.timeout_secs = timeout_secs;
            }
        }

        if let Some(flows) = patch.flows {
            if let Some(session_ttl_secs) = flows.session_ttl_secs {
                self.flows.session_ttl_secs = session_ttl_secs;
            }
            if let Some(short_followup_chars) = flows.short_followup_chars {
                self.flows.short_followup_chars = short_followup_chars;
            }
            if let Some(refine_threshold) = flows.refine_threshold {
                self.flows.refine_threshold = refine_threshold;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ARBOT_AI_ENGINE_BASE_URL") {
            self.ai_engine.base_url = Some(value);
        }
        if let Some(value) = read_env("ARBOT_AI_ENGINE_API_KEY") {
            self.ai_engine.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ARBOT_AI_ENGINE_TIMEOUT_SECS") {
            self.ai_engine.timeout_secs = parse_u64("ARBOT_AI_ENGINE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ARBOT_AI_ENGINE_APP_ID") {
            self.ai_engine.app_id = value;
        }
        if let Some(value) = read_env("ARBOT_AI_ENGINE_SOURCE_SERVICE") {
            self.ai_engine.source_service = value;
        }
        if let Some(value) = read_env("ARBOT_AI_ENGINE_RAG_TOP_K") {
            self.ai_engine.rag_top_k = parse_u32("ARBOT_AI_ENGINE_RAG_TOP_K", &value)?;
        }

        if let Some(value) = read_env("ARBOT_OTC_BASE_URL") {
            self.otc.base_url = Some(value);
        }
        if let Some(value) = read_env("ARBOT_OTC_DOCUMENTS_BASE_URL") {
            self.otc.documents_base_url = Some(value);
        }
        if let Some(value) = read_env("ARBOT_OTC_SYSTEM_ALIAS") {
            self.otc.system_alias = value;
        }
        if let Some(value) = read_env("ARBOT_OTC_TIMEOUT_SECS") {
            self.otc.timeout_secs = parse_u64("ARBOT_OTC_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ARBOT_ANALYTICS_BASE_URL") {
            self.analytics.base_url = Some(value);
        }
        if let Some(value) = read_env("ARBOT_ANALYTICS_PATH") {
            self.analytics.path = value;
        }
        if let Some(value) = read_env("ARBOT_ANALYTICS_DEFAULT_CLIENT") {
            self.analytics.default_client = value;
        }
        if let Some(value) = read_env("ARBOT_ANALYTICS_TIMEOUT_SECS") {
            self.analytics.timeout_secs = parse_u64("ARBOT_ANALYTICS_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ARBOT_FLOWS_SESSION_TTL_SECS") {
            self.flows.session_ttl_secs = parse_u64("ARBOT_FLOWS_SESSION_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("ARBOT_FLOWS_SHORT_FOLLOWUP_CHARS") {
            self.flows.short_followup_chars =
                parse_usize("ARBOT_FLOWS_SHORT_FOLLOWUP_CHARS", &value)?;
        }
        if let Some(value) = read_env("ARBOT_FLOWS_REFINE_THRESHOLD") {
            self.flows.refine_threshold = parse_u64("ARBOT_FLOWS_REFINE_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("ARBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ARBOT_SERVER_PORT") {
            self.server.port = parse_u16("ARBOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ARBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ARBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("ARBOT_LOGGING_LEVEL").or_else(|| read_env("ARBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("ARBOT_LOGGING_FORMAT").or_else(|| read_env("ARBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(base_url) = overrides.ai_engine_base_url {
            self.ai_engine.base_url = Some(base_url);
        }
        if let Some(api_key) = overrides.ai_engine_api_key {
            self.ai_engine.api_key = Some(secret_value(api_key));
        }
        if let Some(base_url) = overrides.otc_base_url {
            self.otc.base_url = Some(base_url);
        }
        if let Some(base_url) = overrides.analytics_base_url {
            self.analytics.base_url = Some(base_url);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_ai_engine(&self.ai_engine)?;
        validate_otc(&self.otc)?;
        validate_analytics(&self.analytics)?;
        validate_flows(&self.flows)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("arbot.toml"), PathBuf::from("config/arbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_base_url(field: &str, value: Option<&str>) -> Result<(), ConfigError> {
    let Some(url) = value else {
        return Ok(());
    };
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{field} must start with http:// or https://")));
    }
    Ok(())
}

fn validate_timeout(field: &str, timeout_secs: u64) -> Result<(), ConfigError> {
    if timeout_secs == 0 || timeout_secs > 300 {
        return Err(ConfigError::Validation(format!("{field} must be in range 1..=300")));
    }
    Ok(())
}

fn validate_ai_engine(ai_engine: &AiEngineConfig) -> Result<(), ConfigError> {
    validate_base_url("ai_engine.base_url", ai_engine.base_url.as_deref())?;
    validate_timeout("ai_engine.timeout_secs", ai_engine.timeout_secs)?;

    if let Some(api_key) = &ai_engine.api_key {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "ai_engine.api_key is set but empty; remove it or provide a key".to_string(),
            ));
        }
    }

    if ai_engine.app_id.trim().is_empty() {
        return Err(ConfigError::Validation("ai_engine.app_id must not be empty".to_string()));
    }
    if ai_engine.rag_top_k == 0 {
        return Err(ConfigError::Validation(
            "ai_engine.rag_top_k must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_otc(otc: &OtcConfig) -> Result<(), ConfigError> {
    validate_base_url("otc.base_url", otc.base_url.as_deref())?;
    validate_base_url("otc.documents_base_url", otc.documents_base_url.as_deref())?;
    validate_timeout("otc.timeout_secs", otc.timeout_secs)?;

    if otc.system_alias.trim().is_empty() {
        return Err(ConfigError::Validation(
            "otc.system_alias must not be empty (the OData services require ISystemAlias)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_analytics(analytics: &AnalyticsConfig) -> Result<(), ConfigError> {
    validate_base_url("analytics.base_url", analytics.base_url.as_deref())?;
    validate_timeout("analytics.timeout_secs", analytics.timeout_secs)?;

    if analytics.path.trim().is_empty() {
        return Err(ConfigError::Validation("analytics.path must not be empty".to_string()));
    }

    Ok(())
}

fn validate_flows(flows: &FlowsConfig) -> Result<(), ConfigError> {
    if flows.session_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "flows.session_ttl_secs must be greater than zero".to_string(),
        ));
    }
    if flows.short_followup_chars == 0 || flows.short_followup_chars > 200 {
        return Err(ConfigError::Validation(
            "flows.short_followup_chars must be in range 1..=200".to_string(),
        ));
    }
    if flows.refine_threshold == 0 {
        return Err(ConfigError::Validation(
            "flows.refine_threshold must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    ai_engine: Option<AiEnginePatch>,
    otc: Option<OtcPatch>,
    analytics: Option<AnalyticsPatch>,
    flows: Option<FlowsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AiEnginePatch {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    app_id: Option<String>,
    source_service: Option<String>,
    rag_top_k: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct OtcPatch {
    base_url: Option<String>,
    documents_base_url: Option<String>,
    system_alias: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyticsPatch {
    base_url: Option<String>,
    path: Option<String>,
    default_client: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FlowsPatch {
    session_ttl_secs: Option<u64>,
    short_followup_chars: Option<usize>,
    refine_threshold: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
