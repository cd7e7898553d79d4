//! Test doubles shared by the unit tests of several modules.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::commands::CommandHandler;
use crate::dispatch::Responder;
use crate::error::BotError;
use crate::events::MessageEvent;
use crate::slack_client::{Params, SlackApi};

/// Records every call and answers with canned responses.
///
/// Methods without a canned response answer `{"ok": true}`.
#[derive(Debug, Default)]
pub(crate) struct MockSlack {
    calls: Mutex<Vec<(String, Params)>>,
    responses: HashMap<String, Value>,
    failing: HashSet<String>,
}

impl MockSlack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_response(mut self, method: &str, response: Value) -> Self {
        self.responses.insert(method.to_string(), response);
        self
    }

    /// Makes `method` fail at the transport level.
    pub(crate) fn with_failure(mut self, method: &str) -> Self {
        self.failing.insert(method.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<(String, Params)> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn calls_to(&self, method: &str) -> Vec<Params> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p)
            .collect()
    }
}

#[async_trait]
impl SlackApi for MockSlack {
    async fn api_call(&self, method: &str, params: Params) -> Result<Value, BotError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((method.to_string(), params));
        if self.failing.contains(method) {
            return Err(BotError::SlackApi(format!("{method} request failed: mock")));
        }
        Ok(self
            .responses
            .get(method)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({"ok": true})))
    }
}

/// Command that succeeds without output.
pub(crate) struct Noop;

#[async_trait]
impl CommandHandler for Noop {
    async fn run(&self, _: Vec<String>, _: &Responder, _: &MessageEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
