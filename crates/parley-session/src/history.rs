//! Saved conversation history

use async_trait::async_trait;
use parley_api::{
    ApiClient, ConversationSummary, ListOptions, MessagePage, NewConversation, PageQuery, Result,
};

/// Remote store of conversation summaries and their messages
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Saved conversations, in the order the store returns them
    async fn list_conversations(&self, options: &ListOptions) -> Result<Vec<ConversationSummary>>;

    /// Persist a new conversation and return it with its assigned id
    async fn save_conversation(&self, draft: &NewConversation) -> Result<ConversationSummary>;

    /// One page of messages, oldest first within the page
    async fn get_messages(&self, query: &PageQuery) -> Result<MessagePage>;

    /// Remove a conversation
    async fn delete_conversation(&self, conversation_id: &str) -> Result<()>;
}

#[async_trait]
impl HistoryStore for ApiClient {
    async fn list_conversations(&self, options: &ListOptions) -> Result<Vec<ConversationSummary>> {
        ApiClient::list_conversations(self, options).await
    }

    async fn save_conversation(&self, draft: &NewConversation) -> Result<ConversationSummary> {
        ApiClient::save_conversation(self, draft).await
    }

    async fn get_messages(&self, query: &PageQuery) -> Result<MessagePage> {
        self.conversation_messages(query).await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        ApiClient::delete_conversation(self, conversation_id).await
    }
}
