use super::{CommandContext, CommandResult};

pub type CommandHandler = fn(&CommandContext, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub input: &'a str,
    pub args: &'a str,
}

impl<'a> CommandInvocation<'a> {
    pub fn arg_parts(&self) -> Vec<&'a str> {
        self.args.split_whitespace().collect()
    }
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

pub fn matching_commands(prefix: &str) -> Vec<&'static Command> {
    let prefix = prefix.to_ascii_lowercase();
    all_commands()
        .iter()
        .filter(|command| command.name.starts_with(&prefix))
        .collect()
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show available commands.",
        handler: super::handle_help,
    },
    Command {
        name: "attach",
        usage: "/attach <path> [media-type]",
        help: "Stage a file for the next message. Audio files are transcribed.",
        handler: super::handle_attach,
    },
    Command {
        name: "retry",
        usage: "/retry [id]",
        help: "Resend the message behind a failed chat request.",
        handler: super::handle_retry,
    },
    Command {
        name: "cancel",
        usage: "/cancel",
        help: "Cancel the pending request and finish the current reply.",
        handler: super::handle_cancel,
    },
    Command {
        name: "ack",
        usage: "/ack",
        help: "Dismiss the last error.",
        handler: super::handle_ack,
    },
    Command {
        name: "clear",
        usage: "/clear",
        help: "Clear the transcript. The conversation id is kept.",
        handler: super::handle_clear,
    },
    Command {
        name: "model",
        usage: "/model [id]",
        help: "Select the model for this session, or reset to the default.",
        handler: super::handle_model,
    },
    Command {
        name: "models",
        usage: "/models [category]",
        help: "List the models offered by the backend.",
        handler: super::handle_models,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Leave the chat.",
        handler: super::handle_quit,
    },
];
