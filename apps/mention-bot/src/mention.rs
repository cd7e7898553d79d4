//! Detection of messages addressed to the bot.
//!
//! A message is addressed to the bot when it starts with a mention, when it
//! mentions someone anywhere in the text, or when it was posted in one of
//! the bot's direct-message channels. The caller compares the returned
//! target against the bot's own user id.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::events::MessageEvent;

/// Mention at the very start of the text, followed by the command.
static LEADING_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<@(|[WU].+?)>(.*)").expect("leading mention pattern"));

/// Mention anywhere in the text.
static EMBEDDED_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*<@(|[WU].+?)>.*").expect("embedded mention pattern"));

/// Who a message is addressed to and what it asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    /// User id the message is addressed to (may be empty for `<@>`).
    pub target: String,
    /// Command text extracted from the message.
    pub command: String,
}

impl Mention {
    fn new(target: &str, command: &str) -> Self {
        Self {
            target: target.to_string(),
            command: command.to_string(),
        }
    }
}

/// Finds who `text` is addressed to.
///
/// Tries, in order:
/// 1. a leading mention: target is the mentioned id, command is the rest of
///    the line with surrounding whitespace trimmed;
/// 2. a mention anywhere: target is the mentioned id, command is empty;
/// 3. a direct-message channel: target is `bot_id`, command is the raw text.
///
/// Returns `None` when the message is addressed to nobody.
///
/// # Examples
///
/// ```
/// use std::collections::HashSet;
/// use mention_bot::events::MessageEvent;
/// use mention_bot::mention::parse_direct_mention;
///
/// let event = MessageEvent::new("C1", "1.0", "<@U123> help");
/// let mention = parse_direct_mention(&event.text, &event, &HashSet::new(), "U123").unwrap();
/// assert_eq!(mention.target, "U123");
/// assert_eq!(mention.command, "help");
/// ```
pub fn parse_direct_mention(
    text: &str,
    event: &MessageEvent,
    direct_channels: &HashSet<String>,
    bot_id: &str,
) -> Option<Mention> {
    debug!(channel = event.channel, text, "Processing message");

    if let Some(caps) = LEADING_MENTION.captures(text) {
        let target = caps.get(1).map_or("", |m| m.as_str());
        let rest = caps.get(2).map_or("", |m| m.as_str());
        return Some(Mention::new(target, rest.trim()));
    }

    if let Some(caps) = EMBEDDED_MENTION.captures(text) {
        let target = caps.get(1).map_or("", |m| m.as_str());
        return Some(Mention::new(target, ""));
    }

    if direct_channels.contains(&event.channel) {
        return Some(Mention::new(bot_id, text));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dms(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn parse(text: &str, channel: &str, direct: &HashSet<String>) -> Option<Mention> {
        let event = MessageEvent::new(channel, "1700000000.000100", text);
        parse_direct_mention(text, &event, direct, "U123")
    }

    #[test]
    fn test_should_parse_leading_mention_with_command() {
        let mention = parse("<@U123> help", "C1", &dms(&[])).expect("mention");
        assert_eq!(mention, Mention::new("U123", "help"));
    }

    #[test]
    fn test_should_trim_command_after_leading_mention() {
        let mention = parse("<@U123>    deploy  prod   ", "C1", &dms(&[])).expect("mention");
        assert_eq!(mention.command, "deploy  prod");
    }

    #[test]
    fn test_should_parse_workspace_style_id() {
        let mention = parse("<@W999>status", "C1", &dms(&[])).expect("mention");
        assert_eq!(mention, Mention::new("W999", "status"));
    }

    #[test]
    fn test_should_return_other_user_for_leading_mention_of_someone_else() {
        let mention = parse("<@U555> help", "C1", &dms(&[])).expect("mention");
        assert_eq!(mention.target, "U555");
    }

    #[test]
    fn test_should_accept_empty_leading_mention() {
        let mention = parse("<@> hi", "C1", &dms(&[])).expect("mention");
        assert_eq!(mention, Mention::new("", "hi"));
    }

    #[test]
    fn test_should_return_empty_command_for_embedded_mention() {
        let mention = parse("hey <@U123> are you there?", "C1", &dms(&[])).expect("mention");
        assert_eq!(mention, Mention::new("U123", ""));
    }

    #[test]
    fn test_should_find_embedded_mention_on_later_line() {
        let mention = parse("first line\nping <@U123>", "C1", &dms(&[])).expect("mention");
        assert_eq!(mention, Mention::new("U123", ""));
    }

    #[test]
    fn test_should_keep_only_first_line_after_leading_mention() {
        let mention = parse("<@U123> run\nsecond line", "C1", &dms(&[])).expect("mention");
        assert_eq!(mention.command, "run");
    }

    #[test]
    fn test_should_fall_back_to_direct_message_channel() {
        let mention = parse("  list things ", "D42", &dms(&["D42"])).expect("mention");
        assert_eq!(mention, Mention::new("U123", "  list things "));
    }

    #[test]
    fn test_should_prefer_mention_over_direct_channel() {
        let mention = parse("<@U555> help", "D42", &dms(&["D42"])).expect("mention");
        assert_eq!(mention.target, "U555");
    }

    #[test]
    fn test_should_ignore_unaddressed_channel_message() {
        assert!(parse("just chatting", "C1", &dms(&["D42"])).is_none());
    }

    #[test]
    fn test_should_not_treat_channel_mention_as_user_mention() {
        assert!(parse("<!channel> lunch", "C1", &dms(&[])).is_none());
    }
}
