//! Realtime event model and the per-poll event scanner.
//!
//! Each poll of the realtime stream yields a batch of [`RtmEvent`]s.
//! [`scan_events`] walks the batch in order and returns the first plain
//! message addressed to the bot together with its command text. Anything
//! after the first match in the same batch is dropped.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::mention::parse_direct_mention;

/// Inline link markup `<url|label>`.
static LINK_MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^<>|]+)\|([^<>]+)>").expect("link markup pattern"));

/// An event received over the realtime connection.
///
/// Only `message` events are modelled; every other type is kept as
/// [`RtmEvent::Other`] so a batch still preserves arrival order.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum RtmEvent {
    /// A message posted in a channel, group, or DM.
    #[serde(rename = "message")]
    Message(MessageEvent),

    /// Any other event type.
    #[serde(other)]
    Other,
}

/// A message event from the realtime stream.
///
/// # Examples
///
/// ```
/// use mention_bot::events::{MessageEvent, RtmEvent};
///
/// let json = serde_json::json!({
///     "type": "message",
///     "channel": "C123",
///     "user": "U456",
///     "text": "hello",
///     "ts": "1234567890.123456"
/// });
/// let event: RtmEvent = serde_json::from_value(json).unwrap();
/// assert!(matches!(event, RtmEvent::Message(ref m) if m.text == "hello"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    /// Channel where the message was posted.
    pub channel: String,

    /// User ID of the message author (absent for some bot messages).
    #[serde(default)]
    pub user: Option<String>,

    /// Raw message text. Missing or `null` text reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub text: String,

    /// Timestamp of this message; replies are threaded under it.
    pub ts: String,

    /// Thread parent timestamp (present only for thread replies).
    #[serde(default)]
    pub thread_ts: Option<String>,

    /// Message subtype (e.g. `"message_changed"`, `"channel_join"`).
    /// Plain user messages have none.
    #[serde(default)]
    pub subtype: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl MessageEvent {
    /// Creates a plain user message with no author, thread, or subtype.
    pub fn new(channel: &str, ts: &str, text: &str) -> Self {
        Self {
            channel: channel.to_string(),
            user: None,
            text: text.to_string(),
            ts: ts.to_string(),
            thread_ts: None,
            subtype: None,
        }
    }
}

/// Replaces the first inline link `<url|label>` in `text` with its label.
///
/// # Examples
///
/// ```
/// use mention_bot::events::strip_link_markup;
///
/// assert_eq!(strip_link_markup("see <http://x|here> now"), "see here now");
/// assert_eq!(strip_link_markup("no links"), "no links");
/// ```
pub fn strip_link_markup(text: &str) -> Cow<'_, str> {
    LINK_MARKUP.replacen(text, 1, "${2}")
}

/// Returns the first command addressed to `bot_id` in a batch of events.
///
/// Non-message events, messages with a subtype, and messages written by the
/// bot itself are skipped. For the first remaining message whose mention
/// target is `bot_id`, link markup is stripped from the command and the
/// `(command, event)` pair is returned without looking at later events.
pub fn scan_events(
    events: Vec<RtmEvent>,
    bot_id: &str,
    direct_channels: &HashSet<String>,
) -> Option<(String, MessageEvent)> {
    for event in events {
        let RtmEvent::Message(msg) = event else {
            continue;
        };

        if msg.subtype.is_some() {
            debug!(
                channel = msg.channel,
                subtype = ?msg.subtype,
                "Skipping message with subtype"
            );
            continue;
        }

        if msg.user.as_deref() == Some(bot_id) {
            debug!(channel = msg.channel, ts = msg.ts, "Skipping own message");
            continue;
        }

        let Some(mention) = parse_direct_mention(&msg.text, &msg, direct_channels, bot_id) else {
            continue;
        };

        if mention.target == bot_id {
            let command = strip_link_markup(&mention.command).into_owned();
            return Some((command, msg));
        }
    }
    None
}
