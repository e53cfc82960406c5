mod bootstrap;
mod chat;
mod clients;
mod health;

use std::time::Duration;

use anyhow::Result;
use arbot_core::config::{AppConfig, LoadOptions};
use axum::Router;

fn init_logging(config: &AppConfig) {
    use arbot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the config, so load it before bootstrapping
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let routes: Router = chat::router(app.runtime.clone(), app.archive.clone())
        .merge(health::router(app.runtime.clone()));

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        handlers = app.runtime.handler_count(),
        "arbot-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let (stopping_tx, mut stopping_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, routes).with_graceful_shutdown(async move {
        if let Err(error) = wait_for_shutdown().await {
            tracing::error!(
                event_name = "system.server.signal_error",
                correlation_id = "shutdown",
                error = %error,
                "failed to listen for shutdown signal"
            );
        }
        tracing::info!(
            event_name = "system.server.stopping",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "arbot-server stopping"
        );
        let _ = stopping_tx.send(true);
    });

    let mut serving = tokio::spawn(async move { server.await });
    tokio::select! {
        joined = &mut serving => joined??,
        _ = async {
            let _ = stopping_rx.wait_for(|stopping| *stopping).await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "in-flight turns did not finish within the grace period"
            );
            serving.abort();
        }
    }

    tracing::info!(event_name = "system.server.stopped", correlation_id = "shutdown", "arbot-server stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
