//! mention-bot: answers Slack mentions and direct messages with commands.
//!
//! Reads the bot token from `SLACK_BOT_TOKEN`, connects to the realtime
//! API, and runs until interrupted.

use std::sync::Arc;

use anyhow::Context;
use mention_bot::commands::CommandTable;
use mention_bot::config::{BotConfig, LoopSettings};
use mention_bot::runner::Runner;
use mention_bot::slack_client::SlackClient;
use mention_bot::socket::RtmConnector;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with env filter
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mention_bot=info".parse()?),
        )
        .init();

    let config = BotConfig::from_env().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    let slack = Arc::new(SlackClient::new(config.bot_token.clone()));
    let connector = Arc::new(RtmConnector::new(slack.clone()));
    let commands = Arc::new(CommandTable::builder().build());
    info!(commands = ?commands.names(), "Command table ready");

    // Setup shutdown on SIGINT/SIGTERM
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                    ctrl_c.await.ok();
                    let _ = shutdown_tx.send(true);
                    return;
                }
            };

        #[cfg(unix)]
        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT, shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT, shutting down...");
        }

        let _ = shutdown_tx.send(true);
    });

    let runner = Runner::new(slack, connector, commands, LoopSettings::default());
    info!("Starting realtime connection...");
    runner.run(shutdown_rx).await;

    info!("Bot shut down");
    Ok(())
}
