//! Slash command parser
//!
//! Parses REPL lines starting with "/" into structured commands.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during slash command parsing
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Empty command (just "/")
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: /{0}")]
    UnknownCommand(String),

    /// Missing required argument
    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    /// Invalid argument format
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// A parsed REPL command. Message indices are zero-based.
#[derive(Debug, Clone, PartialEq)]
pub enum SlashCommand {
    Help,
    New,
    List,
    Open { id: String },
    Delete { id: String },
    ClearAll,
    Title { title: String },
    /// Regenerate the reply at `index`, or the last reply
    Regenerate { index: Option<usize> },
    Edit { index: usize, text: String },
    Models,
    Model { name: String },
    Provider { name: String },
    Status,
    Set { key: String, value: String },
    Settings,
    ResetSettings,
    Pull { name: String },
    Remove { name: String },
    History,
    Export { scope: ExportScope, path: PathBuf },
    Import { path: PathBuf },
    Quit,
}

/// What `/export` writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportScope {
    /// Every chat as a JSON document
    All,
    /// The active chat as text
    Active,
}

/// Usage line and description for `/help`
pub struct CommandHelp {
    pub usage: &'static str,
    pub description: &'static str,
}

pub const COMMANDS: &[CommandHelp] = &[
    CommandHelp { usage: "/help", description: "Show this help" },
    CommandHelp { usage: "/new", description: "Start a new chat" },
    CommandHelp { usage: "/list", description: "List stored chats" },
    CommandHelp { usage: "/open <id>", description: "Open a chat (id prefix is enough)" },
    CommandHelp { usage: "/delete <id>", description: "Delete a chat" },
    CommandHelp { usage: "/clear-all", description: "Delete every chat" },
    CommandHelp { usage: "/title <text>", description: "Rename the active chat" },
    CommandHelp { usage: "/regen [n]", description: "Regenerate reply n (default: the last one)" },
    CommandHelp { usage: "/edit <n> <text>", description: "Edit message n; user edits replay the chat" },
    CommandHelp { usage: "/models", description: "List models of the current provider" },
    CommandHelp { usage: "/model <name>", description: "Select a model" },
    CommandHelp { usage: "/provider <name>", description: "Switch provider (ollama, deepseek)" },
    CommandHelp { usage: "/status", description: "Check provider connectivity" },
    CommandHelp { usage: "/set <key> <value>", description: "Change a setting" },
    CommandHelp { usage: "/settings", description: "Show current settings" },
    CommandHelp { usage: "/reset-settings", description: "Return to configured defaults" },
    CommandHelp { usage: "/pull <name>", description: "Download an Ollama model" },
    CommandHelp { usage: "/rm <name>", description: "Delete an Ollama model" },
    CommandHelp { usage: "/history", description: "Show the active chat" },
    CommandHelp { usage: "/export all <path>", description: "Export every chat as JSON" },
    CommandHelp { usage: "/export chat <path>", description: "Export the active chat as text" },
    CommandHelp { usage: "/import <path>", description: "Import chats from a JSON export" },
    CommandHelp { usage: "/quit", description: "Exit" },
];

/// Parse a line into a slash command.
///
/// Returns `None` if the line doesn't start with "/".
pub fn parse(input: &str) -> Option<Result<SlashCommand, ParseError>> {
    let trimmed = input.trim();
    let body = trimmed.strip_prefix('/')?;
    Some(parse_command(body))
}

fn parse_command(input: &str) -> Result<SlashCommand, ParseError> {
    let (cmd, rest) = match input.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (input, ""),
    };
    if cmd.is_empty() {
        return Err(ParseError::Empty);
    }

    match cmd.to_lowercase().as_str() {
        "help" | "h" | "?" => Ok(SlashCommand::Help),
        "new" => Ok(SlashCommand::New),
        "list" | "ls" => Ok(SlashCommand::List),
        "open" => Ok(SlashCommand::Open { id: word(rest, "chat id")? }),
        "delete" | "del" => Ok(SlashCommand::Delete { id: word(rest, "chat id")? }),
        "clear-all" => Ok(SlashCommand::ClearAll),
        "title" | "rename" => Ok(SlashCommand::Title { title: text(rest, "title")? }),
        "regen" | "regenerate" => {
            let index = match rest {
                "" => None,
                n => Some(index(n)?),
            };
            Ok(SlashCommand::Regenerate { index })
        }
        "edit" => {
            let (n, body) = rest
                .split_once(char::is_whitespace)
                .ok_or(ParseError::MissingArgument("message text"))?;
            Ok(SlashCommand::Edit {
                index: index(n)?,
                text: text(body, "message text")?,
            })
        }
        "models" => Ok(SlashCommand::Models),
        "model" | "m" => Ok(SlashCommand::Model { name: word(rest, "model name")? }),
        "provider" => Ok(SlashCommand::Provider { name: word(rest, "provider name")? }),
        "status" => Ok(SlashCommand::Status),
        "set" => {
            let (key, value) = rest
                .split_once(char::is_whitespace)
                .ok_or(ParseError::MissingArgument("setting value"))?;
            Ok(SlashCommand::Set {
                key: key.to_string(),
                value: value.trim().to_string(),
            })
        }
        "settings" | "config" => Ok(SlashCommand::Settings),
        "reset-settings" => Ok(SlashCommand::ResetSettings),
        "pull" => Ok(SlashCommand::Pull { name: word(rest, "model name")? }),
        "rm" => Ok(SlashCommand::Remove { name: word(rest, "model name")? }),
        "history" => Ok(SlashCommand::History),
        "export" => parse_export(rest),
        "import" => Ok(SlashCommand::Import {
            path: PathBuf::from(text(rest, "file path")?),
        }),
        "quit" | "exit" | "q" => Ok(SlashCommand::Quit),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

fn parse_export(rest: &str) -> Result<SlashCommand, ParseError> {
    let (scope, path) = match rest.split_once(char::is_whitespace) {
        Some((scope, path)) => (scope, path),
        None => (rest, ""),
    };
    let scope = match scope.to_lowercase().as_str() {
        "all" => ExportScope::All,
        "chat" => ExportScope::Active,
        "" => return Err(ParseError::MissingArgument("export scope (all or chat)")),
        other => return Err(ParseError::UnknownCommand(format!("export {}", other))),
    };
    Ok(SlashCommand::Export {
        scope,
        path: PathBuf::from(text(path, "file path")?),
    })
}

/// Single-word argument
fn word(rest: &str, what: &'static str) -> Result<String, ParseError> {
    match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
        [] => Err(ParseError::MissingArgument(what)),
        [one] => Ok(one.to_string()),
        _ => Err(ParseError::InvalidArgument(format!("{} must be one word", what))),
    }
}

/// Free text argument, kept as typed
fn text(rest: &str, what: &'static str) -> Result<String, ParseError> {
    let rest = rest.trim();
    if rest.is_empty() {
        Err(ParseError::MissingArgument(what))
    } else {
        Ok(rest.to_string())
    }
}

/// One-based index as shown by `/history`, returned zero-based
fn index(raw: &str) -> Result<usize, ParseError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(ParseError::InvalidArgument(format!(
            "'{}' is not a message number",
            raw.trim()
        ))),
    }
}
