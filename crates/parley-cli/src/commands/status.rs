//! /status command - show session state

use super::CommandResult;
use parley_session::{ChatSession, SessionStatus};

pub struct StatusCommand;

impl StatusCommand {
    pub fn execute(session: &ChatSession, base_url: &str) -> CommandResult {
        let mut output = String::from("Session Status\n");
        output.push_str(&"-".repeat(40));
        output.push('\n');

        output.push_str(&format!("Backend:      {}\n", base_url));
        output.push_str(&format!(
            "Status:       {}\n",
            match session.status() {
                SessionStatus::Idle => "idle".to_string(),
                SessionStatus::Sending => "sending".to_string(),
                SessionStatus::LoadingPage => "loading".to_string(),
                SessionStatus::Error(e) => format!("error ({})", e),
            }
        ));
        output.push_str(&format!(
            "Thread:       {}\n",
            session.thread_id().unwrap_or("(new)")
        ));
        output.push_str(&format!(
            "Conversation: {}\n",
            session.selected_conversation_id().unwrap_or("(unsaved)")
        ));
        output.push('\n');

        let messages = session.messages();
        let user = messages.iter().filter(|m| m.is_user()).count();
        output.push_str(&format!("Messages:     {} total\n", messages.len()));
        output.push_str(&format!(
            "              {} user, {} assistant\n",
            user,
            messages.len() - user
        ));
        if session.cursor().has_more {
            output.push_str("              older messages available (/more)\n");
        }
        output.push_str(&format!(
            "History:      {} conversation(s) loaded\n",
            session.conversations().len()
        ));

        if let Some(e) = session.last_error() {
            output.push_str(&format!("\nLast error:   {}\n", e));
        }

        CommandResult::Message(output)
    }
}
