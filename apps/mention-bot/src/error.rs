//! Error types for the mention-bot application.
//!
//! Defines [`BotError`] as the error type for configuration, Slack Web API
//! calls, and the realtime connection. Command handlers report their own
//! failures with `anyhow` so any error can be echoed back into the thread.

use thiserror::Error;

/// Error type for mention-bot operations.
///
/// Variants are grouped by subsystem: configuration, Slack API communication,
/// WebSocket transport, connection setup, and response decoding.
///
/// # Examples
///
/// ```
/// use mention_bot::error::BotError;
///
/// let err = BotError::Config("SLACK_BOT_TOKEN is not set".into());
/// assert!(err.to_string().contains("SLACK_BOT_TOKEN"));
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BotError {
    /// A configuration error (missing or invalid environment values).
    #[error("Config error: {0}")]
    Config(String),

    /// A Slack Web API call could not be completed.
    #[error("Slack API error: {0}")]
    SlackApi(String),

    /// A WebSocket transport error (connect, read, write, closed stream).
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The session could not be brought up (identity or channel lookup).
    #[error("Connection error: {0}")]
    Connection(String),

    /// A Web API response body that is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
