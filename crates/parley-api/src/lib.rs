//! parley-api: client for the remote assistant and history backend
//!
//! This crate wraps the backend's JSON endpoints (assistant chat, saved
//! conversation history, speech-to-text) behind a typed client. Every request
//! carries a bearer token obtained from an [`IdentityProvider`].

pub mod assistant;
pub mod client;
pub mod error;
pub mod history;
pub mod identity;
pub mod speech;
pub mod types;

pub use client::ApiClient;
pub use error::{Error, Result};
pub use identity::{IdentityProvider, StaticToken};
pub use types::*;
