//! Transport abstraction for talking to the assistant

use async_trait::async_trait;
use parley_api::{ApiClient, AssistantReply, Result};

/// Sends user input to the assistant backend.
///
/// Implementations return every assistant text known for the thread at call
/// time, which may include replies already on screen.
#[async_trait]
pub trait AssistantTransport: Send + Sync {
    /// Send `text`, continuing `thread_id` when given.
    async fn send(&self, text: &str, thread_id: Option<&str>) -> Result<AssistantReply>;
}

#[async_trait]
impl AssistantTransport for ApiClient {
    async fn send(&self, text: &str, thread_id: Option<&str>) -> Result<AssistantReply> {
        self.send_chat(text, thread_id).await
    }
}
