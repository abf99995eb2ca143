//! Authenticated JSON client shared by all endpoints

use std::sync::Arc;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{Error, Result},
    identity::IdentityProvider,
    types::{Acknowledgement, ErrorBody},
};

/// Environment variable consulted when no base URL is configured
pub const BASE_URL_ENV_VAR: &str = "PARLEY_BASE_URL";

/// Backend client
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    identity: Arc<dyn IdentityProvider>,
}

impl ApiClient {
    /// Create a client for `base_url` using a default HTTP client
    pub fn new(base_url: impl Into<String>, identity: Arc<dyn IdentityProvider>) -> Result<Self> {
        Self::with_http_client(reqwest::Client::new(), base_url, identity)
    }

    /// Create a client with a preconfigured `reqwest::Client`
    pub fn with_http_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::InvalidConfig("base URL is empty".to_string()));
        }
        Ok(Self {
            http,
            base_url,
            identity,
        })
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The identity this client authenticates with
    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Build an authenticated POST. Fails with `NotAuthenticated` before
    /// anything goes on the wire.
    pub(crate) async fn authorized_post(&self, path: &str) -> Result<RequestBuilder> {
        let token = self.identity.token().await?;
        Ok(self.http.post(self.url(path)).bearer_auth(token))
    }

    /// POST a JSON body and decode a JSON response
    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.authorized_post(path).await?.json(body);
        tracing::debug!("POST {}", path);
        let response = request.send().await?;
        decode(path, response).await
    }

    /// POST a JSON body whose answer carries no payload.
    ///
    /// An empty 2xx body is success; a JSON body must still say `success: true`.
    pub(crate) async fn post_unit<B>(&self, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let request = self.authorized_post(path).await?.json(body);
        tracing::debug!("POST {}", path);
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            let text = response.text().await?;
            return acknowledge(path, &text);
        }
        let text = response.text().await.unwrap_or_default();
        let message = error_message(status, &text);
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(message));
        }
        Err(Error::api(status.as_u16(), message))
    }
}

/// Check the body of a 2xx answer that has no payload.
pub(crate) fn acknowledge(path: &str, body: &str) -> Result<()> {
    if body.trim().is_empty() {
        return Ok(());
    }
    let ack: Acknowledgement = serde_json::from_str(body)?;
    ack.into_result().inspect_err(|e| {
        tracing::debug!("POST {} rejected: {}", path, e);
    })
}

/// Map the HTTP status and decode the body.
pub(crate) async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let message = error_message(status, &text);
        tracing::debug!("POST {} failed with {}: {}", path, status, message);
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(message));
        }
        return Err(Error::api(status.as_u16(), message));
    }

    Ok(serde_json::from_str(&text)?)
}

/// Best-effort message extraction from an error body
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .message
        .or(parsed.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        })
}
