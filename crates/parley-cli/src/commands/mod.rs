//! Slash commands for interactive mode

mod history;
mod status;

pub use history::{HistoryCommand, parse_index};
pub use status::StatusCommand;

use parley_session::ChatSession;

/// Result of executing a slash command
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Start a fresh conversation
    NewConversation,
    /// Reload and print the history list
    ListHistory,
    /// Open the conversation at this index of the history list
    Open(usize),
    /// Load the page before the oldest message shown
    LoadMore,
    /// Delete the conversation at this index of the history list
    Delete(usize),
    /// Save the open conversation
    Save,
    /// Transcribe an audio file and send the text
    Transcribe {
        path: String,
        language: Option<String>,
    },
    /// Show a message to the user (not sent to the assistant)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(
    input: &str,
    session: &ChatSession,
    base_url: &str,
) -> Option<CommandResult> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let parts: Vec<&str> = input[1..].splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "new" | "n" => CommandResult::NewConversation,

        "history" | "ls" => CommandResult::ListHistory,

        "open" | "o" => match parse_index(args, session.conversations().len()) {
            Ok(index) => CommandResult::Open(index),
            Err(msg) => CommandResult::Message(msg),
        },

        "more" => CommandResult::LoadMore,

        "delete" | "rm" => match parse_index(args, session.conversations().len()) {
            Ok(index) => CommandResult::Delete(index),
            Err(msg) => CommandResult::Message(msg),
        },

        "save" => CommandResult::Save,

        "transcribe" | "voice" => {
            let mut words = args.split_whitespace();
            match words.next() {
                Some(path) => CommandResult::Transcribe {
                    path: path.to_string(),
                    language: words.next().map(str::to_string),
                },
                None => CommandResult::Message("Usage: /transcribe <file> [language]".to_string()),
            }
        }

        "status" | "s" => StatusCommand::execute(session, base_url),

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?               Show this help message
  /new, /n                    Start a new conversation
  /history, /ls               List saved conversations
  /open, /o <n>               Open conversation n from the list
  /more                       Load older messages of the open conversation
  /delete, /rm <n>            Delete conversation n from the list
  /save                       Save the open conversation to history
  /transcribe <file> [lang]   Transcribe an audio file and send it
  /status, /s                 Show session status
  /quit, /exit, /q            Exit parley

Press Ctrl-C while waiting for a reply to abort the request, or at the
prompt to exit."#
        .to_string()
}
