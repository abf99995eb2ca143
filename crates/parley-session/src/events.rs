//! Session event types

use parley_api::ConversationSummary;

use crate::{conversation::SessionStatus, error::SessionError};

/// Where the message view should be scrolled to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollAnchor {
    /// Follow the newest message (fresh load, new send)
    Newest,
    /// Keep this message at the top edge (older page was prepended)
    Message(String),
}

/// Events emitted by a [`ChatSession`](crate::ChatSession)
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session status changed
    StatusChanged { status: SessionStatus },

    /// The displayed message list changed
    MessagesChanged { count: usize },

    /// The view should move to this anchor
    ScrollTo { anchor: ScrollAnchor },

    /// The assistant thread changed
    ThreadChanged {
        previous: Option<String>,
        current: String,
    },

    /// A new conversation was saved to history
    ConversationSaved { summary: ConversationSummary },

    /// The history list was reloaded
    ConversationsLoaded { count: usize },

    /// A conversation was removed from history
    ConversationDeleted { id: String },

    /// The open conversation was cleared
    Reset,

    /// A response arrived for a conversation that is no longer open
    StaleResponse { operation: &'static str },

    /// An operation failed
    Error { error: SessionError },
}

impl SessionEvent {
    /// Check if this event reports a failure
    pub fn is_error(&self) -> bool {
        matches!(self, SessionEvent::Error { .. })
    }
}
