//! The connection loop.
//!
//! [`Runner::run`] keeps the bot alive: it connects, resolves who the bot is
//! and which direct-message channels it has, greets those channels, then
//! polls the realtime stream and dispatches at most one command per poll.
//! Any failure or panic restarts the whole sequence after a fixed pause;
//! only the shutdown signal ends it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::commands::CommandTable;
use crate::config::LoopSettings;
use crate::dispatch::Dispatcher;
use crate::error::BotError;
use crate::events::scan_events;
use crate::slack_client::{CHAT_POST_MESSAGE, Params, SlackApi, is_ok, params};
use crate::socket::Connector;

/// The bot's own user, as reported by `auth.test`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    /// User id mentions must target.
    pub user_id: String,
    /// Display name used in the greeting.
    pub name: String,
}

/// Why a single pass of the loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The realtime session could not be opened.
    ConnectFailed,
    /// The direct-message channel list could not be fetched.
    NoDirectChannels,
    /// Shutdown was requested.
    Shutdown,
}

/// Drives the connect, greet, poll and dispatch cycle.
pub struct Runner {
    slack: Arc<dyn SlackApi>,
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    settings: LoopSettings,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("dispatcher", &self.dispatcher)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Creates a runner. `slack` is shared with every dispatched command.
    pub fn new(
        slack: Arc<dyn SlackApi>,
        connector: Arc<dyn Connector>,
        commands: Arc<CommandTable>,
        settings: LoopSettings,
    ) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&slack), commands, settings.escalation_after);
        Self {
            slack,
            connector,
            dispatcher,
            settings,
        }
    }

    /// Runs the loop until `shutdown` becomes `true`.
    ///
    /// Each pass that ends for any reason other than shutdown (including an
    /// error or a panic) is followed by `restart_backoff` and a fresh pass.
    /// Commands still running at shutdown are not awaited.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, exiting bot loop");
                break;
            }

            let outcome = std::panic::AssertUnwindSafe(self.run_once(&mut shutdown))
                .catch_unwind()
                .await;

            let backoff_secs = self.settings.restart_backoff.as_secs();
            match outcome {
                Ok(Ok(LoopExit::Shutdown)) => {
                    info!("Shutdown signal received, closing connection");
                    break;
                }
                Ok(Ok(exit)) => {
                    info!(?exit, backoff_secs, "Bot loop ended, restarting after backoff");
                }
                Ok(Err(e)) => {
                    error!(error = ?e, backoff_secs, "Bot loop failed, restarting after backoff");
                }
                Err(panic_info) => {
                    let panic_msg = panic_info
                        .downcast_ref::<String>()
                        .map(String::as_str)
                        .or_else(|| panic_info.downcast_ref::<&str>().copied())
                        .unwrap_or("unknown panic");
                    error!(
                        error = panic_msg,
                        backoff_secs, "Bot loop panicked, restarting after backoff"
                    );
                }
            }

            if pause(&mut shutdown, self.settings.restart_backoff).await {
                info!("Shutdown during backoff, exiting");
                break;
            }
        }
    }

    /// Runs one pass: connect, resolve, greet, then poll until failure.
    ///
    /// # Errors
    ///
    /// Returns `BotError` if identity resolution, a greeting, or the event
    /// stream fails after connecting.
    pub async fn run_once(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<LoopExit, BotError> {
        let mut stream = match self.connector.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Connection failed");
                return Ok(LoopExit::ConnectFailed);
            }
        };
        info!("Bot connected and running");

        let identity = self.resolve_identity().await?;
        let Some(direct_channels) = self.direct_channels().await? else {
            return Ok(LoopExit::NoDirectChannels);
        };
        info!(
            user_id = identity.user_id,
            name = identity.name,
            direct_channels = direct_channels.len(),
            "Resolved bot identity"
        );

        self.greet(&identity, &direct_channels).await?;
        let direct_channels: HashSet<String> = direct_channels.into_iter().collect();

        loop {
            let events = stream.read()?;
            if let Some((command, event)) = scan_events(events, &identity.user_id, &direct_channels)
            {
                drop(self.dispatcher.dispatch(&command, event));
            }

            if pause(shutdown, self.settings.poll_interval).await {
                return Ok(LoopExit::Shutdown);
            }
        }
    }

    /// Looks up the bot's own user via `auth.test`.
    async fn resolve_identity(&self) -> Result<BotIdentity, BotError> {
        let resp = self.slack.api_call("auth.test", Params::new()).await?;
        if !is_ok(&resp) {
            return Err(BotError::Connection(format!(
                "auth.test error: {}",
                resp.get("error").and_then(Value::as_str).unwrap_or("unknown")
            )));
        }
        let field = |name: &str| {
            resp.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| BotError::Connection(format!("auth.test response missing '{name}'")))
        };
        Ok(BotIdentity {
            user_id: field("user_id")?,
            name: field("user")?,
        })
    }

    /// Fetches the direct-message channel ids, or `None` if Slack refuses.
    async fn direct_channels(&self) -> Result<Option<Vec<String>>, BotError> {
        let request = params(serde_json::json!({
            "types": "im",
            "limit": self.settings.dm_list_limit,
        }));
        let resp = self.slack.api_call("conversations.list", request).await?;

        let channels = resp
            .get("channels")
            .and_then(Value::as_array)
            .filter(|_| is_ok(&resp));
        let Some(channels) = channels else {
            warn!(response = %resp, "Can't get direct messages list");
            return Ok(None);
        };

        Ok(Some(
            channels
                .iter()
                .filter_map(|c| c.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
        ))
    }

    /// Posts the presence greeting to every direct-message channel.
    async fn greet(&self, identity: &BotIdentity, channels: &[String]) -> Result<(), BotError> {
        let text = format!("Hello I am {}, ready to help you", identity.name);
        for channel in channels {
            let greeting = params(serde_json::json!({
                "channel": channel,
                "text": text,
            }));
            let resp = self.slack.api_call(CHAT_POST_MESSAGE, greeting).await?;
            if !is_ok(&resp) {
                warn!(channel, response = %resp, "Greeting was not delivered");
            }
        }
        Ok(())
    }
}

/// Sleeps for `duration`. Returns `true` as soon as shutdown is requested.
///
/// Once every sender is gone no shutdown can arrive, so the rest of the
/// pause is slept out in full.
async fn pause(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return false,
            changed = shutdown.changed() => match changed {
                Ok(()) if *shutdown.borrow() => return true,
                Ok(()) => {}
                Err(_) => {
                    sleep.await;
                    return false;
                }
            }
        }
    }
}
