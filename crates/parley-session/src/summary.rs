//! Titles and previews for newly saved conversations.

use parley_api::NewConversation;

use crate::message::{Message, Sender};

/// Characters of the first user message kept in a title
pub const TITLE_MAX_CHARS: usize = 40;

/// Characters kept in first/last message previews
pub const PREVIEW_MAX_CHARS: usize = 100;

const FALLBACK_TITLE: &str = "New conversation";

/// Collapse whitespace and cut to `max` characters, appending `...` when cut.
pub fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

/// Title derived from the first user message
pub fn conversation_title(first_user_text: &str) -> String {
    let title = truncate_with_ellipsis(first_user_text, TITLE_MAX_CHARS);
    if title.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        title
    }
}

/// Build the save request for a conversation's first exchange.
///
/// Returns `None` when there is no user message to derive a title from.
pub fn draft_conversation(
    messages: &[Message],
    thread_id: &str,
    model_label: &str,
) -> Option<NewConversation> {
    let first_user = messages.iter().find(|m| m.sender == Sender::User)?;
    let last_assistant = messages
        .iter()
        .rev()
        .find(|m| m.sender == Sender::Assistant)
        .map(|m| m.text.as_str())
        .unwrap_or_default();

    Some(NewConversation {
        thread_id: thread_id.to_string(),
        title: conversation_title(&first_user.text),
        first_message_preview: truncate_with_ellipsis(&first_user.text, PREVIEW_MAX_CHARS),
        last_message_preview: truncate_with_ellipsis(last_assistant, PREVIEW_MAX_CHARS),
        model_used: model_label.to_string(),
    })
}
