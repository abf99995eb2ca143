//! Session state: displayed messages, thread, selection, and paging.

use parley_api::ConversationSummary;

use crate::{
    error::SessionError,
    events::ScrollAnchor,
    message::{Message, PaginationCursor},
};

/// What the session is doing right now
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Idle,
    Sending,
    LoadingPage,
    /// The last operation failed; new operations may start
    Error(SessionError),
}

impl SessionStatus {
    /// Whether a send or a page fetch is in flight
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionStatus::Sending | SessionStatus::LoadingPage)
    }
}

/// State of one open chat view
#[derive(Debug, Default)]
pub struct Conversation {
    /// Displayed messages, oldest first
    pub messages: Vec<Message>,
    /// Assistant thread of the open conversation, `None` until the first exchange
    pub thread_id: Option<String>,
    /// Saved conversation currently shown, `None` for an unsaved one
    pub selected_conversation_id: Option<String>,
    /// Paging position for older messages
    pub cursor: PaginationCursor,
    /// Cached history list, newest first
    pub conversations: Vec<ConversationSummary>,
    /// Pending input text
    pub input: String,
    pub status: SessionStatus,
    /// Last error surfaced to the user
    pub last_error: Option<SessionError>,
    /// Where the view should scroll after the last change
    pub scroll_anchor: Option<ScrollAnchor>,
}

impl Conversation {
    /// Forget everything about the open conversation; the history list stays.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.thread_id = None;
        self.selected_conversation_id = None;
        self.cursor = PaginationCursor::default();
        self.input.clear();
        self.status = SessionStatus::Idle;
        self.last_error = None;
        self.scroll_anchor = None;
    }

    /// Whether the open conversation has been saved to history
    pub fn is_saved(&self) -> bool {
        self.selected_conversation_id.is_some()
    }

    /// Add a summary to the front of the history list, replacing a stale copy
    pub fn upsert_summary(&mut self, summary: ConversationSummary) {
        self.conversations.retain(|c| c.id != summary.id);
        self.conversations.insert(0, summary);
    }

    /// Find a cached summary by id
    pub fn summary(&self, id: &str) -> Option<&ConversationSummary> {
        self.conversations.iter().find(|c| c.id == id)
    }
}
