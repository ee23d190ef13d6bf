mod bootstrap;
mod health;
mod ingress;
mod intel_http;
mod slack_web;

use anyhow::Result;
use intelbot_core::config::{AppConfig, LoadOptions};
use tracing::{error, info};

fn init_logging(config: &AppConfig) {
    use intelbot_core::config::LogFormat::*;
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
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.registry.clone(),
    )
    .await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let ingress = app.ingress;
    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, ingress).await {
            error!(
                event_name = "system.ingress.error",
                correlation_id = "bootstrap",
                error = %error,
                "slack ingress server terminated unexpectedly"
            );
        }
    });

    let runner = app.runner;
    tokio::spawn(async move { runner.start().await });

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        command = %app.config.search.command,
        payload_ttl_secs = app.payloads.ttl().as_secs(),
        "intelbot-server started"
    );
    wait_for_shutdown().await?;
    info!(event_name = "system.server.stopping", correlation_id = "shutdown", "intelbot-server stopping");

    app.sweeper.abort();
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
