//! Error types for parley-api

use thiserror::Error;

/// Result type alias using parley-api Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No usable credential; raised before any request is sent
    #[error("User not authenticated")]
    NotAuthenticated,

    /// Backend returned a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Backend returned 404 for the requested resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend answered 2xx but the envelope reported `success: false`
    #[error("{0}")]
    Rejected(String),

    /// Success envelope without the expected payload
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether the backend reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Api { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// Whether this error stems from a missing or rejected credential
    pub fn is_auth(&self) -> bool {
        match self {
            Error::NotAuthenticated => true,
            Error::Api { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}
