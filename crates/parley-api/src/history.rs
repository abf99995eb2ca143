//! Conversation history endpoints

use serde::Serialize;

use crate::{
    client::ApiClient,
    error::Result,
    types::{
        ConversationSummary, Envelope, ListOptions, MessagePage, MessagesEnvelope,
        NewConversation, PageQuery,
    },
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    conversation_id: &'a str,
}

impl ApiClient {
    /// Persist a new conversation summary and return it with its id
    pub async fn save_conversation(&self, draft: &NewConversation) -> Result<ConversationSummary> {
        let envelope: Envelope<ConversationSummary> =
            self.post_json("/history/save", draft).await?;
        envelope.into_result("save conversation")
    }

    /// List saved conversations
    pub async fn list_conversations(
        &self,
        options: &ListOptions,
    ) -> Result<Vec<ConversationSummary>> {
        let envelope: Envelope<Vec<ConversationSummary>> =
            self.post_json("/history/list", options).await?;
        envelope.into_result("list conversations")
    }

    /// Fetch one page of messages for a conversation
    pub async fn conversation_messages(&self, query: &PageQuery) -> Result<MessagePage> {
        let envelope: MessagesEnvelope = self.post_json("/history/messages", query).await?;
        envelope.into_result()
    }

    /// Delete a saved conversation
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.post_unit("/history/delete", &DeleteRequest { conversation_id })
            .await
    }
}
