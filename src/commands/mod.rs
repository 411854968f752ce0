//! Slash commands for the chat REPL.
//!
//! Commands never touch the session directly. They translate input into
//! orchestrator actions or into local effects the REPL performs.

mod registry;

pub use registry::{all_commands, matching_commands, CommandInvocation};

use std::path::PathBuf;

use crate::core::orchestrator::ChatAction;

/// What the REPL knows about the session when a command runs.
#[derive(Debug, Default, Clone)]
pub struct CommandContext {
    pub last_retryable: Option<u64>,
}

pub enum CommandResult {
    ProcessAsMessage(String),
    Dispatch(ChatAction),
    AttachFile {
        path: PathBuf,
        media_type: Option<String>,
    },
    ListModels {
        category: Option<String>,
    },
    Status(String),
    Quit,
}

pub fn process_input(context: &CommandContext, input: &str) -> CommandResult {
    let trimmed = input.trim();

    let Some(rest) = trimmed.strip_prefix('/') else {
        return CommandResult::ProcessAsMessage(input.to_string());
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    if let Some(command) = registry::find_command(command_name) {
        let invocation = CommandInvocation {
            input: trimmed,
            args,
        };
        return (command.handler)(context, invocation);
    }

    let suggestions: Vec<String> = matching_commands(command_name)
        .iter()
        .map(|command| format!("/{}", command.name))
        .collect();
    if suggestions.is_empty() {
        CommandResult::Status(format!(
            "Unknown command /{command_name}. Type /help for a list."
        ))
    } else {
        CommandResult::Status(format!(
            "Unknown command /{command_name}. Did you mean {}?",
            suggestions.join(", ")
        ))
    }
}

pub fn help_text() -> String {
    let mut help = String::from("Type a message and press Enter to send it.\n\nCommands:\n");
    let width = all_commands()
        .iter()
        .map(|command| command.usage.len())
        .max()
        .unwrap_or(0);
    for command in all_commands() {
        help.push_str(&format!(
            "  {:width$}  {}\n",
            command.usage,
            command.help,
            width = width
        ));
    }
    help
}

pub(super) fn handle_help(_: &CommandContext, _: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Status(help_text())
}

pub(super) fn handle_attach(_: &CommandContext, invocation: CommandInvocation<'_>) -> CommandResult {
    match invocation.arg_parts().as_slice() {
        [path] => CommandResult::AttachFile {
            path: PathBuf::from(path),
            media_type: None,
        },
        [path, media_type] => CommandResult::AttachFile {
            path: PathBuf::from(path),
            media_type: Some(media_type.to_string()),
        },
        _ => CommandResult::Status("Usage: /attach <path> [media-type]".to_string()),
    }
}

pub(super) fn handle_retry(
    context: &CommandContext,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    match invocation.arg_parts().as_slice() {
        [] => match context.last_retryable {
            Some(message_id) => CommandResult::Dispatch(ChatAction::Retry { message_id }),
            None => CommandResult::Status("Nothing to retry".to_string()),
        },
        [id] => match id.parse::<u64>() {
            Ok(message_id) => CommandResult::Dispatch(ChatAction::Retry { message_id }),
            Err(_) => CommandResult::Status(format!("Not a message id: {id}")),
        },
        _ => CommandResult::Status("Usage: /retry [id]".to_string()),
    }
}

pub(super) fn handle_cancel(_: &CommandContext, _: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Dispatch(ChatAction::Cancel)
}

pub(super) fn handle_ack(_: &CommandContext, _: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Dispatch(ChatAction::Acknowledge)
}

pub(super) fn handle_clear(_: &CommandContext, _: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Dispatch(ChatAction::Clear)
}

pub(super) fn handle_model(_: &CommandContext, invocation: CommandInvocation<'_>) -> CommandResult {
    match invocation.arg_parts().as_slice() {
        [] => CommandResult::Dispatch(ChatAction::SelectModel { model_id: None }),
        [id] => CommandResult::Dispatch(ChatAction::SelectModel {
            model_id: Some(id.to_string()),
        }),
        _ => CommandResult::Status("Usage: /model [id]".to_string()),
    }
}

pub(super) fn handle_models(
    _: &CommandContext,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let category = Some(invocation.args)
        .filter(|args| !args.is_empty())
        .map(str::to_string);
    CommandResult::ListModels { category }
}

pub(super) fn handle_quit(_: &CommandContext, _: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Quit
}
