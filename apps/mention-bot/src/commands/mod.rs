//! Command registry and lookup.
//!
//! Commands are declared once at startup through [`CommandTable::builder`]
//! as an ordered list of name, description and handler. The table always
//! contains the built-in [`help`] command, which lists every registered
//! entry and is the fallback for empty or unknown commands.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::dispatch::Responder;
use crate::events::MessageEvent;

pub mod help;

/// Name of the built-in help command.
pub const HELP: &str = "help";

/// A bot command.
///
/// Handlers receive the positional arguments (the raw words after the
/// command name), a [`Responder`] bound to the originating thread, and the
/// message that triggered them. Any error returned is posted back to the
/// thread by the dispatcher.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Runs the command.
    ///
    /// # Errors
    ///
    /// Any failure; it is reported to the user as an `Error` reply.
    async fn run(
        &self,
        args: Vec<String>,
        responder: &Responder,
        event: &MessageEvent,
    ) -> anyhow::Result<()>;
}

/// One registry entry.
#[derive(Clone)]
pub struct Command {
    name: String,
    description: String,
    handler: Arc<dyn CommandHandler>,
}

impl Command {
    /// Returns the command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description shown by `help`.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A command resolved from a command string.
#[derive(Clone)]
pub struct Resolved {
    /// Name of the command that will run.
    pub name: String,
    /// Handler to invoke.
    pub handler: Arc<dyn CommandHandler>,
    /// Positional arguments.
    pub args: Vec<String>,
}

/// The fixed, ordered set of commands the bot understands.
///
/// # Examples
///
/// ```
/// use mention_bot::commands::CommandTable;
///
/// let table = CommandTable::builder().build();
/// assert_eq!(table.names(), vec!["help"]);
///
/// let resolved = table.resolve("nonsense arg");
/// assert_eq!(resolved.name, "help");
/// assert!(resolved.args.is_empty());
/// ```
#[derive(Debug)]
pub struct CommandTable {
    commands: Vec<Command>,
}

impl CommandTable {
    /// Starts declaring a command table.
    pub fn builder() -> CommandTableBuilder {
        CommandTableBuilder::default()
    }

    /// Returns the registered commands in declaration order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Returns the registered command names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(Command::name).collect()
    }

    fn get(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }

    fn help(&self) -> &Command {
        // The builder always registers `help` first.
        &self.commands[0]
    }

    /// Resolves a command string to a handler and its arguments.
    ///
    /// The string is split on single spaces: the first word names the
    /// command and the remaining words are its arguments, unmodified. An
    /// empty string or an unregistered name resolves to `help` with no
    /// arguments; the unknown word is dropped.
    pub fn resolve(&self, command: &str) -> Resolved {
        let mut words = command.split(' ');
        let name = words.next().unwrap_or("");

        match self.get(name) {
            Some(cmd) if !command.is_empty() => Resolved {
                name: cmd.name.clone(),
                handler: Arc::clone(&cmd.handler),
                args: words.map(str::to_string).collect(),
            },
            _ => {
                let help = self.help();
                Resolved {
                    name: help.name.clone(),
                    handler: Arc::clone(&help.handler),
                    args: Vec::new(),
                }
            }
        }
    }
}

/// Declares the commands of a [`CommandTable`].
#[derive(Default)]
pub struct CommandTableBuilder {
    commands: Vec<Command>,
}

impl CommandTableBuilder {
    /// Registers a command.
    ///
    /// Names must be unique and contain no spaces; a duplicate name (or
    /// `help`) is ignored with a warning.
    pub fn command<H>(mut self, name: &str, description: &str, handler: H) -> Self
    where
        H: CommandHandler + 'static,
    {
        if name == HELP || self.commands.iter().any(|c| c.name == name) {
            warn!(name, "Ignoring duplicate command registration");
            return self;
        }
        self.commands.push(Command {
            name: name.to_string(),
            description: description.to_string(),
            handler: Arc::new(handler),
        });
        self
    }

    /// Finishes the table, adding the built-in `help` command first.
    pub fn build(self) -> CommandTable {
        let mut listing = vec![(HELP.to_string(), help::DESCRIPTION.to_string())];
        listing.extend(
            self.commands
                .iter()
                .map(|c| (c.name.clone(), c.description.clone())),
        );

        let mut commands = Vec::with_capacity(self.commands.len() + 1);
        commands.push(Command {
            name: HELP.to_string(),
            description: help::DESCRIPTION.to_string(),
            handler: Arc::new(help::HelpCommand::new(listing)),
        });
        commands.extend(self.commands);
        CommandTable { commands }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Noop;

    fn table() -> CommandTable {
        CommandTable::builder()
            .command("deploy", "deploy a service", Noop)
            .command("status", "show status", Noop)
            .build()
    }

    #[test]
    fn test_should_register_help_first() {
        assert_eq!(table().names(), vec!["help", "deploy", "status"]);
    }

    #[test]
    fn test_should_resolve_command_with_args() {
        let resolved = table().resolve("deploy api prod");
        assert_eq!(resolved.name, "deploy");
        assert_eq!(resolved.args, vec!["api", "prod"]);
    }

    #[test]
    fn test_should_split_on_single_spaces() {
        let resolved = table().resolve("deploy  api");
        assert_eq!(resolved.args, vec!["", "api"]);
    }

    #[test]
    fn test_should_resolve_empty_command_to_help() {
        let resolved = table().resolve("");
        assert_eq!(resolved.name, "help");
        assert!(resolved.args.is_empty());
    }

    #[test]
    fn test_should_drop_unknown_command_when_falling_back_to_help() {
        let resolved = table().resolve("frobnicate now");
        assert_eq!(resolved.name, "help");
        assert!(resolved.args.is_empty());
    }

    #[test]
    fn test_should_pass_args_to_explicit_help() {
        let resolved = table().resolve("help deploy");
        assert_eq!(resolved.name, "help");
        assert_eq!(resolved.args, vec!["deploy"]);
    }

    #[test]
    fn test_should_be_case_sensitive() {
        assert_eq!(table().resolve("Deploy").name, "help");
    }

    #[test]
    fn test_should_ignore_duplicate_registration() {
        let table = CommandTable::builder()
            .command("status", "first", Noop)
            .command("status", "second", Noop)
            .command("help", "override", Noop)
            .build();
        assert_eq!(table.names(), vec!["help", "status"]);
        assert_eq!(table.commands()[1].description(), "first");
        assert_eq!(table.commands()[0].description(), help::DESCRIPTION);
    }
}
