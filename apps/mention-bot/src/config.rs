//! Bot configuration types and loading.
//!
//! [`BotConfig`] carries the only user-facing setting, the Slack bot token,
//! read from `SLACK_BOT_TOKEN`. [`LoopSettings`] holds the timings of the
//! connection loop and dispatcher.

use std::time::Duration;

use tracing::info;

use crate::error::BotError;

/// Environment variable holding the Bot User OAuth Token.
pub const BOT_TOKEN_VAR: &str = "SLACK_BOT_TOKEN";

/// Delay between two reads of the realtime event stream.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Pause before the whole loop is restarted after a crash.
pub const RESTART_BACKOFF: Duration = Duration::from_secs(10);

/// Commands running longer than this get a channel-wide mention on output.
pub const ESCALATION_AFTER: Duration = Duration::from_secs(20);

/// Maximum number of direct-message channels fetched on connect.
pub const DM_LIST_LIMIT: u32 = 1000;

/// Top-level bot configuration.
///
/// # Examples
///
/// ```
/// use mention_bot::config::BotConfig;
///
/// let config = BotConfig::from_lookup(|_| Some("xoxb-test".into())).unwrap();
/// assert_eq!(config.bot_token, "xoxb-test");
/// ```
#[derive(Clone)]
pub struct BotConfig {
    /// Bot User OAuth Token for Web API and realtime calls.
    pub bot_token: String,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

impl BotConfig {
    /// Loads configuration from the process environment.
    ///
    /// A `.env` file in the working directory is applied first when present.
    ///
    /// # Errors
    ///
    /// Returns `BotError::Config` if the token is missing or blank.
    pub fn from_env() -> Result<Self, BotError> {
        if let Ok(path) = dotenvy::dotenv() {
            info!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `BotError::Config` if the token is missing or blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BotError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup(BOT_TOKEN_VAR)
            .ok_or_else(|| BotError::Config(format!("{BOT_TOKEN_VAR} is not set")))?;
        let config = Self { bot_token };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), BotError> {
        if self.bot_token.trim().is_empty() {
            return Err(BotError::Config(format!("{BOT_TOKEN_VAR} must not be empty")));
        }
        Ok(())
    }
}

/// Timings used by the connection loop and the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Sleep between two polls of the event stream.
    pub poll_interval: Duration,
    /// Pause before restarting after a loop failure.
    pub restart_backoff: Duration,
    /// Elapsed time after which replies mention the whole channel.
    pub escalation_after: Duration,
    /// `limit` passed when listing direct-message channels.
    pub dm_list_limit: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            restart_backoff: RESTART_BACKOFF,
            escalation_after: ESCALATION_AFTER,
            dm_list_limit: DM_LIST_LIMIT,
        }
    }
}
