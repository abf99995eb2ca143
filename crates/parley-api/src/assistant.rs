//! Assistant chat endpoint

use crate::{
    client::ApiClient,
    error::Result,
    types::{AssistantReply, ChatRequest, Envelope},
};

impl ApiClient {
    /// Send one user message, continuing `thread_id` when given.
    pub async fn send_chat(&self, text: &str, thread_id: Option<&str>) -> Result<AssistantReply> {
        let request = ChatRequest {
            user_input: text,
            thread_id,
        };
        let envelope: Envelope<AssistantReply> =
            self.post_json("/ai/assistant/chat", &request).await?;
        let reply = envelope.into_result("send message")?;
        tracing::debug!(
            "assistant replied on thread {:?} with {} message(s)",
            reply.thread_id,
            reply.messages.len()
        );
        Ok(reply)
    }
}
