//! Caller identity: where bearer tokens come from.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Environment variable read by [`StaticToken::from_env`].
pub const TOKEN_ENV_VAR: &str = "PARLEY_TOKEN";

/// Supplies the bearer credential attached to every backend request.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current bearer token, or [`Error::NotAuthenticated`].
    async fn token(&self) -> Result<String>;

    /// Cheap synchronous probe used to reject calls before any state changes.
    fn is_authenticated(&self) -> bool;
}

/// A fixed token handed over at startup.
#[derive(Clone, Default)]
pub struct StaticToken {
    token: Option<String>,
}

impl StaticToken {
    /// Create from an optional token; blank tokens count as absent.
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Read the token from `PARLEY_TOKEN`
    pub fn from_env() -> Self {
        Self::new(std::env::var(TOKEN_ENV_VAR).ok())
    }

    /// An identity that is never authenticated
    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl IdentityProvider for StaticToken {
    async fn token(&self) -> Result<String> {
        self.token.clone().ok_or(Error::NotAuthenticated)
    }

    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}
