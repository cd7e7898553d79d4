//! Slack bot that turns mentions and direct messages into commands.
//!
//! The bot keeps a realtime (RTM) connection open, scans each polled batch
//! of events for the first message addressed to it, and runs the matching
//! command from a static [`CommandTable`](commands::CommandTable) on its own
//! task. Replies are threaded under the triggering message.

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod mention;
pub mod runner;
pub mod slack_client;
pub mod socket;

#[cfg(test)]
pub(crate) mod testing;
