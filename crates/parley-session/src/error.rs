//! Error types for parley-session
//!
//! Every failure that reaches the session boundary is turned into a
//! [`SessionError`] value. Nothing is rethrown to the display layer.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using parley-session Error
pub type Result<T> = std::result::Result<T, SessionError>;

/// Why a remote call did not produce a result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    /// The backend or the network reported an error
    #[error("{0}")]
    Remote(String),

    /// No answer within the configured timeout
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The request was aborted or superseded
    #[error("request cancelled")]
    Cancelled,
}

/// User-displayable session errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("Message is empty")]
    EmptyInput,

    #[error("Another request is still in progress")]
    Busy,

    #[error("Conversation {0} is not the selected conversation")]
    NotSelected(String),

    #[error("Failed to send message: {0}")]
    Send(RequestFailure),

    /// The assistant answered on a different thread than the one in use
    #[error("Assistant replied on thread {received}, expected {expected}")]
    ThreadMismatch { expected: String, received: String },

    #[error("Conversation could not be saved: {0}")]
    Persist(RequestFailure),

    #[error("Failed to load messages: {0}")]
    Page(RequestFailure),

    #[error("Failed to delete conversation: {0}")]
    Delete(RequestFailure),

    #[error("Failed to load conversations: {0}")]
    List(RequestFailure),
}

/// Coarse error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any network call
    Precondition,
    /// Sending failed; the optimistic message was rolled back
    Transport,
    /// Saving a new conversation failed; the exchange stays visible
    Persistence,
    /// Loading a page of messages failed
    Pagination,
    /// Deleting a conversation failed; the local list is unchanged
    Delete,
    /// Listing conversations failed
    History,
}

impl SessionError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotAuthenticated
            | SessionError::EmptyInput
            | SessionError::Busy
            | SessionError::NotSelected(_) => ErrorKind::Precondition,
            SessionError::Send(_) | SessionError::ThreadMismatch { .. } => ErrorKind::Transport,
            SessionError::Persist(_) => ErrorKind::Persistence,
            SessionError::Page(_) => ErrorKind::Pagination,
            SessionError::Delete(_) => ErrorKind::Delete,
            SessionError::List(_) => ErrorKind::History,
        }
    }

    /// Whether the request behind this error timed out
    pub fn is_timeout(&self) -> bool {
        matches!(self.failure(), Some(RequestFailure::TimedOut(_)))
    }

    /// Whether the request behind this error was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self.failure(), Some(RequestFailure::Cancelled))
    }

    fn failure(&self) -> Option<&RequestFailure> {
        match self {
            SessionError::Send(f)
            | SessionError::Persist(f)
            | SessionError::Page(f)
            | SessionError::Delete(f)
            | SessionError::List(f) => Some(f),
            _ => None,
        }
    }
}

/// The operation a remote call belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Send,
    Persist,
    Page,
    Delete,
    List,
}

/// Raw outcome of a guarded remote call, before it is attributed to an operation
#[derive(Debug)]
pub(crate) enum Failure {
    Api(parley_api::Error),
    TimedOut(Duration),
    Cancelled,
}

impl Failure {
    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, Failure::Api(e) if e.is_not_found())
    }

    pub(crate) fn into_session_error(self, op: Operation) -> SessionError {
        let failure = match self {
            Failure::Api(e) if e.is_auth() => return SessionError::NotAuthenticated,
            Failure::Api(e) => RequestFailure::Remote(e.to_string()),
            Failure::TimedOut(d) => RequestFailure::TimedOut(d),
            Failure::Cancelled => RequestFailure::Cancelled,
        };
        match op {
            Operation::Send => SessionError::Send(failure),
            Operation::Persist => SessionError::Persist(failure),
            Operation::Page => SessionError::Page(failure),
            Operation::Delete => SessionError::Delete(failure),
            Operation::List => SessionError::List(failure),
        }
    }
}
