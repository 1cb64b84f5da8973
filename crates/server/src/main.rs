mod bootstrap;
mod health;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use trout_core::config::{AppConfig, LoadOptions};
use trout_slack::events::dispatcher_for;
use trout_slack::socket::{ReconnectPolicy, SocketModeRunner, SocketModeTransport};

fn init_logging(config: &AppConfig) {
    use trout_core::config::LogFormat::*;
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
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let bot_user = app.resolve_bot_user().await?;
    let service = app.trout_service(bot_user);

    let transport = SocketModeTransport::new(
        app.config.slack.api_base_url.clone(),
        app.config.slack.app_token.clone(),
    );
    let runner = SocketModeRunner::new(
        Arc::new(transport),
        dispatcher_for(service.clone()),
        ReconnectPolicy::default(),
    );
    let slack_task = tokio::spawn(async move {
        if let Err(error) = runner.start().await {
            tracing::error!(
                event_name = "system.server.slack_runner_failed",
                correlation_id = "runtime",
                error = %error,
                "slack runner stopped with an error"
            );
        }
    });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "trout-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "trout-server stopping"
    );

    slack_task.abort();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, service.release_idle()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.release_interrupted",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "release still running at shutdown; unreleased records stay pending"
        );
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
