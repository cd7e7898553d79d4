//! The built-in `help` command.

use async_trait::async_trait;

use crate::commands::CommandHandler;
use crate::dispatch::Responder;
use crate::events::MessageEvent;
use crate::slack_client::params;

/// Description of `help` itself.
pub const DESCRIPTION: &str = "list all commands and print help";

/// Lists every registered command with its description.
///
/// The listing is captured when the table is built, so it always matches
/// the registry exactly.
#[derive(Debug)]
pub struct HelpCommand {
    listing: Vec<(String, String)>,
}

impl HelpCommand {
    pub(crate) fn new(listing: Vec<(String, String)>) -> Self {
        Self { listing }
    }

    /// Renders the help text: `` `name` `` then its description, per command.
    pub fn text(&self) -> String {
        self.listing
            .iter()
            .map(|(name, description)| format!("`{name}`\n{description}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn run(
        &self,
        _args: Vec<String>,
        responder: &Responder,
        event: &MessageEvent,
    ) -> anyhow::Result<()> {
        let extra = params(serde_json::json!({
            "thread_ts": event.ts,
            "reply_broadcast": true,
        }));
        responder.reply_with(&self.text(), None, extra).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::commands::CommandTable;
    use crate::testing::{MockSlack, Noop};

    #[test]
    fn test_should_render_listing_in_order() {
        let help = HelpCommand::new(vec![
            ("help".into(), DESCRIPTION.into()),
            ("deploy".into(), "deploy a service".into()),
        ]);
        assert_eq!(
            help.text(),
            "`help`\nlist all commands and print help\n`deploy`\ndeploy a service"
        );
    }

    #[tokio::test]
    async fn test_should_send_single_broadcast_reply_listing_registry() {
        let slack = Arc::new(MockSlack::new());
        let table = CommandTable::builder()
            .command("deploy", "deploy a service", Noop)
            .command("status", "show status", Noop)
            .build();
        let event = MessageEvent::new("C1", "1700000000.000100", "<@U1>");
        let responder = Responder::for_event(slack.clone(), &event, crate::config::ESCALATION_AFTER);

        let resolved = table.resolve("");
        resolved
            .handler
            .run(resolved.args, &responder, &event)
            .await
            .expect("help");

        let calls = slack.calls();
        assert_eq!(calls.len(), 1);
        let (method, params) = &calls[0];
        assert_eq!(method, "chat.postMessage");
        assert_eq!(params["reply_broadcast"], true);
        assert_eq!(params["channel"], "C1");
        assert_eq!(params["thread_ts"], "1700000000.000100");

        let text = params["text"].as_str().expect("text");
        for name in table.names() {
            assert!(text.contains(&format!("`{name}`")), "missing {name}");
        }
        assert!(text.contains("deploy a service"));
        assert!(text.contains("show status"));
        assert_eq!(text.matches('`').count(), 2 * table.names().len());
    }
}
