use std::sync::Arc;
use std::time::Duration;

use arbot_agent::guardrails::ClassificationGuard;
use arbot_agent::handlers::{AnalyticsHandler, DownloadHandler, InvoiceHandler, StatementHandler};
use arbot_agent::llm::ConversationArchive;
use arbot_agent::runtime::AgentRuntime;
use arbot_core::audit::{AuditSink, TracingAuditSink};
use arbot_core::config::{AppConfig, ConfigError};
use arbot_core::flows::{InMemorySessionStore, IntentLockRouter, QueryStateReducer, SessionStore};
use thiserror::Error;
use tracing::{info, warn};

use crate::clients::{
    http_client, AiEngineClient, DatasphereAnalytics, OtcDocuments, OtcInvoiceSearch,
};

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
    pub archive: Option<Arc<dyn ConversationArchive>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let sessions: Arc<dyn SessionStore> =
        Arc::new(InMemorySessionStore::with_ttl_secs(config.flows.session_ttl_secs));

    let ai_timeout = Duration::from_secs(config.ai_engine.timeout_secs);
    let ai_engine = match config.ai_engine.base_url.as_deref() {
        Some(base_url) => {
            let client = http_client(ai_timeout).map_err(BootstrapError::HttpClient)?;
            Some(Arc::new(
                AiEngineClient::new(client, base_url, ai_timeout)
                    .with_api_key(config.ai_engine.api_key.clone())
                    .with_app(&config.ai_engine.app_id, &config.ai_engine.source_service)
                    .with_top_k(config.ai_engine.rag_top_k),
            ))
        }
        None => None,
    };

    let guard = match &ai_engine {
        Some(engine) => ClassificationGuard::new(engine.clone(), ai_timeout),
        None => {
            warn!(
                event_name = "system.bootstrap.classifier_unconfigured",
                correlation_id = "bootstrap",
                "ai_engine.base_url is unset; classifying with keywords only"
            );
            ClassificationGuard::heuristic_only()
        }
    };

    let mut runtime = AgentRuntime::new(guard, sessions.clone(), audit.clone())
        .with_router(IntentLockRouter::new(config.flows.short_followup_chars));
    let mut archive: Option<Arc<dyn ConversationArchive>> = None;
    if let Some(engine) = ai_engine {
        runtime = runtime.with_answers(engine.clone()).with_usage(engine.clone());
        archive = Some(engine);
    }

    let otc_timeout = Duration::from_secs(config.otc.timeout_secs);
    if let Some(base_url) = config.otc.base_url.as_deref() {
        let client = http_client(otc_timeout).map_err(BootstrapError::HttpClient)?;
        let search = OtcInvoiceSearch::new(client.clone(), base_url, &config.otc.system_alias);
        let reducer = QueryStateReducer::new(config.flows.refine_threshold, otc_timeout);
        runtime = runtime.with_handler(InvoiceHandler::new(
            sessions.clone(),
            Arc::new(search),
            reducer,
            audit.clone(),
        ));

        let documents = Arc::new(OtcDocuments::new(
            client,
            config.otc.documents_url().unwrap_or(base_url),
            &config.otc.system_alias,
            otc_timeout,
        ));
        runtime = runtime
            .with_handler(DownloadHandler::new(documents.clone(), audit.clone(), otc_timeout))
            .with_handler(StatementHandler::new(documents, audit.clone(), otc_timeout));
    } else {
        warn!(
            event_name = "system.bootstrap.otc_unconfigured",
            correlation_id = "bootstrap",
            "otc.base_url is unset; invoice, download and statement flows are disabled"
        );
    }

    if let Some(base_url) = config.analytics.base_url.as_deref() {
        let timeout = Duration::from_secs(config.analytics.timeout_secs);
        let client = http_client(timeout).map_err(BootstrapError::HttpClient)?;
        let analytics = DatasphereAnalytics::new(
            client,
            base_url,
            &config.analytics.path,
            &config.analytics.default_client,
            timeout,
        );
        runtime = runtime.with_handler(AnalyticsHandler::new(Arc::new(analytics), audit, timeout));
    }

    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        handlers = runtime.handler_count(),
        "agent runtime assembled"
    );

    Ok(Application { config, runtime: Arc::new(runtime), archive })
}

#[cfg(test)]
mod tests {
    use arbot_core::config::AppConfig;

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    #[test]
    fn unconfigured_collaborators_leave_only_the_fallback_path() {
        let app = bootstrap_with_config(AppConfig::default()).expect("defaults should bootstrap");
        assert_eq!(app.runtime.handler_count(), 0);
        assert!(app.archive.is_none());
    }

    #[test]
    fn configured_backends_register_every_flow() {
        let mut config = AppConfig::default();
        config.otc.base_url = Some("https://otc.example".to_string());
        config.analytics.base_url = Some("https://datasphere.example".to_string());
        config.ai_engine.base_url = Some("https://ai.example".to_string());

        let app = bootstrap_with_config(config).expect("configured backends should bootstrap");
        assert_eq!(app.runtime.handler_count(), 4);
        assert!(app.archive.is_some());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.otc.base_url = Some("ftp://otc.example".to_string());

        let result = bootstrap_with_config(config);
        assert!(matches!(result, Err(BootstrapError::Config(_))));
    }
}
