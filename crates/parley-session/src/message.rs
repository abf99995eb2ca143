//! Displayed messages and the pagination cursor

use std::collections::HashSet;

use parley_api::{Pagination, StoredMessage};
use serde::{Deserialize, Serialize};

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// A message shown in the chat view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// History-assigned for persisted messages, `local-<uuid>` otherwise
    pub id: String,
    pub sender: Sender,
    pub text: String,
    /// Milliseconds since the Unix epoch; absent for just-sent messages
    pub timestamp: Option<i64>,
}

impl Message {
    /// A transient user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::local(Sender::User, text)
    }

    /// A transient assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::local(Sender::Assistant, text)
    }

    fn local(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: format!("local-{}", uuid::Uuid::new_v4()),
            sender,
            text: text.into(),
            timestamp: None,
        }
    }

    /// Map a persisted message; role `"user"` is the caller, anything else the assistant.
    pub fn from_stored(stored: StoredMessage) -> Self {
        let sender = if stored.role == "user" {
            Sender::User
        } else {
            Sender::Assistant
        };
        Self {
            id: stored.id,
            sender,
            text: stored.text,
            timestamp: stored.created_at,
        }
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }

    pub fn is_assistant(&self) -> bool {
        self.sender == Sender::Assistant
    }

    /// Whether the id was synthesized on this side
    pub fn is_local(&self) -> bool {
        self.id.starts_with("local-")
    }
}

/// Where the next older page starts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationCursor {
    pub has_more: bool,
    pub next_page_after: Option<String>,
}

impl From<Pagination> for PaginationCursor {
    fn from(p: Pagination) -> Self {
        Self {
            has_more: p.has_more,
            next_page_after: p.next_page_after,
        }
    }
}

/// Append assistant texts that are not already on screen.
///
/// The assistant backend answers with every assistant text it knows for the
/// thread, so the reply is diffed by text against what is displayed rather
/// than sliced by index. Blank texts and repeats within `texts` are dropped.
/// Returns the number of messages appended.
pub fn merge_assistant_texts(messages: &mut Vec<Message>, texts: Vec<String>) -> usize {
    let mut seen: HashSet<String> = messages
        .iter()
        .filter(|m| m.is_assistant())
        .map(|m| m.text.clone())
        .collect();

    let before = messages.len();
    for text in texts {
        if text.trim().is_empty() {
            continue;
        }
        if seen.insert(text.clone()) {
            messages.push(Message::assistant(text));
        }
    }
    messages.len() - before
}
