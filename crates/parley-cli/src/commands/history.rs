//! /history listing and list index parsing

use parley_api::ConversationSummary;

use crate::utils::{display_iso, truncate_chars};

pub struct HistoryCommand;

impl HistoryCommand {
    /// Numbered table of saved conversations, newest first
    pub fn list_text(conversations: &[ConversationSummary], selected: Option<&str>) -> String {
        if conversations.is_empty() {
            return "No saved conversations.".to_string();
        }

        let mut output = format!("{:<4} {:<42} {:<17} Last message\n", "#", "Title", "Updated");
        output.push_str(&"-".repeat(90));
        output.push('\n');
        for (i, c) in conversations.iter().enumerate() {
            let marker = if selected == Some(c.id.as_str()) { "*" } else { " " };
            let preview = c
                .last_message_preview
                .as_deref()
                .map(|p| truncate_chars(&p.replace('\n', " "), 40))
                .unwrap_or_default();
            output.push_str(&format!(
                "{:<4} {:<42} {:<17} {}\n",
                format!("{}{}", i + 1, marker),
                truncate_chars(&c.title, 40),
                display_iso(c.updated_at.as_deref().or(c.created_at.as_deref())),
                preview
            ));
        }
        output.push_str("\nOpen with: /open <n>");
        output
    }
}

/// Parse a 1-based list position into an index
pub fn parse_index(args: &str, len: usize) -> Result<usize, String> {
    if len == 0 {
        return Err("No conversations loaded. Run /history first.".to_string());
    }
    match args.parse::<usize>() {
        Ok(n) if (1..=len).contains(&n) => Ok(n - 1),
        _ => Err(format!("Expected a number between 1 and {}", len)),
    }
}
