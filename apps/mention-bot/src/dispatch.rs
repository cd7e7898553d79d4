//! Command dispatch and threaded replies.
//!
//! [`Dispatcher::dispatch`] resolves a command string against the
//! [`CommandTable`] and runs the handler on its own detached task. The
//! handler talks back through a [`Responder`], which pins every outgoing
//! call to the originating channel and thread and mentions the whole
//! channel once the command has been running for too long.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, info, instrument, warn};

use crate::commands::{CommandHandler, CommandTable};
use crate::error::BotError;
use crate::events::MessageEvent;
use crate::slack_client::{CHAT_POST_MESSAGE, FILES_UPLOAD, Params, SlackApi, is_ok, params};

/// Prefix that notifies every member of the channel.
pub const ESCALATION_MARKER: &str = "<!channel> \n";

/// Placeholder sent instead of an empty reply.
const EMPTY_REPLY: &str = "`Empty`";

/// Reply channel for one command invocation.
///
/// Bound to the channel and timestamp of the triggering message and to the
/// moment the command was dispatched. Cheap to clone; clones share nothing
/// mutable.
#[derive(Clone)]
pub struct Responder {
    slack: Arc<dyn SlackApi>,
    channel: String,
    thread_ts: String,
    started: Instant,
    escalate_after: Duration,
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("channel", &self.channel)
            .field("thread_ts", &self.thread_ts)
            .field("started", &self.started)
            .field("escalate_after", &self.escalate_after)
            .finish_non_exhaustive()
    }
}

impl Responder {
    /// Creates a responder for `event`, starting its clock now.
    pub fn for_event(
        slack: Arc<dyn SlackApi>,
        event: &MessageEvent,
        escalate_after: Duration,
    ) -> Self {
        Self {
            slack,
            channel: event.channel.clone(),
            thread_ts: event.ts.clone(),
            started: Instant::now(),
            escalate_after,
        }
    }

    /// Channel the command was issued in.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Timestamp of the triggering message; replies are threaded under it.
    pub fn thread_ts(&self) -> &str {
        &self.thread_ts
    }

    /// Time since the command was dispatched.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Calls a Web API method in the context of the originating thread.
    ///
    /// After the escalation threshold the `text` parameter is prefixed with
    /// [`ESCALATION_MARKER`] (an absent `text` becomes the bare marker). The
    /// target channel is forced (`channels` for `files.upload`, `channel`
    /// for `chat.postMessage`) and `thread_ts` is always set. A response
    /// without `"ok": true` is logged and returned as is.
    ///
    /// # Errors
    ///
    /// Returns `BotError` only if the call could not be made or its response
    /// could not be decoded.
    pub async fn api_call(&self, method: &str, mut params: Params) -> Result<Value, BotError> {
        if self.elapsed() > self.escalate_after {
            let escalated = format!(
                "{ESCALATION_MARKER}{}",
                params.get("text").and_then(Value::as_str).unwrap_or("")
            );
            params.insert("text".into(), Value::String(escalated));
        }

        match method {
            FILES_UPLOAD => {
                params.insert("channels".into(), Value::String(self.channel.clone()));
            }
            CHAT_POST_MESSAGE => {
                params.insert("channel".into(), Value::String(self.channel.clone()));
            }
            _ => {}
        }
        params.insert("thread_ts".into(), Value::String(self.thread_ts.clone()));

        let response = self.slack.api_call(method, params.clone()).await?;
        if !is_ok(&response) {
            let sent = Value::Object(params);
            warn!(
                method,
                params = %sent,
                response = %serde_json::to_string_pretty(&response).unwrap_or_default(),
                "Slack API call was not ok"
            );
        }
        Ok(response)
    }

    /// Posts `text` in the thread, optionally under a bold title.
    ///
    /// # Errors
    ///
    /// See [`api_call`](Self::api_call).
    pub async fn reply(&self, text: &str, title: Option<&str>) -> Result<Value, BotError> {
        self.reply_with(text, title, Params::new()).await
    }

    /// Like [`reply`](Self::reply) with extra `chat.postMessage` parameters,
    /// e.g. `reply_broadcast`.
    ///
    /// # Errors
    ///
    /// See [`api_call`](Self::api_call).
    pub async fn reply_with(
        &self,
        text: &str,
        title: Option<&str>,
        mut extra: Params,
    ) -> Result<Value, BotError> {
        let mut text = match title {
            Some(title) if !title.is_empty() => format!("*{title}*\n{text}"),
            _ => text.to_string(),
        };
        if text.is_empty() {
            text = EMPTY_REPLY.to_string();
        }
        extra.insert("text".into(), Value::String(text));
        self.api_call(CHAT_POST_MESSAGE, extra).await
    }

    /// Uploads `content` as a file snippet into the thread.
    ///
    /// # Errors
    ///
    /// See [`api_call`](Self::api_call).
    pub async fn upload_file(
        &self,
        content: &str,
        title: &str,
        filetype: &str,
    ) -> Result<Value, BotError> {
        let upload = params(serde_json::json!({
            "content": content,
            "title": title,
            "filetype": filetype,
        }));
        self.api_call(FILES_UPLOAD, upload).await
    }
}

/// Runs resolved commands on detached tasks.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use mention_bot::commands::CommandTable;
/// use mention_bot::config::ESCALATION_AFTER;
/// use mention_bot::dispatch::Dispatcher;
/// use mention_bot::events::MessageEvent;
/// use mention_bot::slack_client::SlackClient;
///
/// # async fn example() {
/// let slack = Arc::new(SlackClient::new("xoxb-token".into()));
/// let commands = Arc::new(CommandTable::builder().build());
/// let dispatcher = Dispatcher::new(slack, commands, ESCALATION_AFTER);
/// dispatcher.dispatch("help", MessageEvent::new("C1", "1.0", "<@U1> help"));
/// # }
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    slack: Arc<dyn SlackApi>,
    commands: Arc<CommandTable>,
    escalate_after: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("commands", &self.commands.names())
            .field("escalate_after", &self.escalate_after)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher sharing `slack` with every command it starts.
    pub fn new(
        slack: Arc<dyn SlackApi>,
        commands: Arc<CommandTable>,
        escalate_after: Duration,
    ) -> Self {
        Self {
            slack,
            commands,
            escalate_after,
        }
    }

    /// Starts `command` for `event` on a new task and returns immediately.
    ///
    /// The task is not tracked: callers may drop the handle, and there is no
    /// limit on how many commands run at once. Failures are reported in the
    /// originating thread and never reach the caller.
    #[instrument(skip(self, event), fields(channel = %event.channel, ts = %event.ts))]
    pub fn dispatch(&self, command: &str, event: MessageEvent) -> JoinHandle<()> {
        let responder = Responder::for_event(Arc::clone(&self.slack), &event, self.escalate_after);
        let resolved = self.commands.resolve(command);
        info!(command = resolved.name, args = ?resolved.args, "Dispatching command");

        tokio::spawn(
            run_command(resolved.handler, resolved.args, responder, event).in_current_span(),
        )
    }
}

/// Runs one handler, reporting errors and panics back into the thread.
async fn run_command(
    handler: Arc<dyn CommandHandler>,
    args: Vec<String>,
    responder: Responder,
    event: MessageEvent,
) {
    let outcome = std::panic::AssertUnwindSafe(handler.run(args, &responder, &event))
        .catch_unwind()
        .await;

    let failure = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => format!("{e:?}"),
        Err(panic_info) => panic_info
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| panic_info.downcast_ref::<&str>().copied())
            .unwrap_or("unknown panic")
            .to_string(),
    };

    warn!(error = failure, "Command failed");
    if let Err(e) = responder
        .reply(&format!("```\n{failure}\n```"), Some("Error"))
        .await
    {
        warn!(error = %e, "Failed to report command error");
    }
}
