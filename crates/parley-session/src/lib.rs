//! parley-session: chat session runtime
//!
//! [`ChatSession`] owns the message list of one chat view. It sends user
//! input through an [`AssistantTransport`], merges assistant replies without
//! duplicating them, saves new conversations through a [`HistoryStore`], and
//! pages older messages in without disturbing the reader's position.

pub mod conversation;
pub mod error;
pub mod events;
pub mod handle;
pub mod history;
pub mod message;
pub mod session;
pub mod summary;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use conversation::{Conversation, SessionStatus};
pub use error::{ErrorKind, RequestFailure, SessionError};
pub use events::{ScrollAnchor, SessionEvent};
pub use handle::SessionHandle;
pub use history::HistoryStore;
pub use message::{Message, PaginationCursor, Sender};
pub use session::{
    ChatSession, PageOutcome, PendingPage, PendingSave, PendingSend, SaveOutcome, SendOutcome,
    SessionConfig, SessionContext, ThreadChangePolicy,
};
pub use transport::AssistantTransport;
