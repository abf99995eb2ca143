//! Scripted transport and history doubles for session tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_api::{
    AssistantReply, ConversationSummary, Error, ListOptions, MessagePage, NewConversation,
    PageQuery, Pagination, Result, StaticToken, StoredMessage,
};

use crate::{
    history::HistoryStore,
    session::{ChatSession, SessionConfig, SessionContext},
    transport::AssistantTransport,
};

/// A transport that replays canned replies in order.
#[derive(Default)]
pub(crate) struct MockTransport {
    replies: Mutex<VecDeque<Result<AssistantReply>>>,
    /// `(text, thread_id)` of every call
    pub(crate) calls: Mutex<Vec<(String, Option<String>)>>,
    hang: AtomicBool,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn reply(&self, thread_id: &str, texts: &[&str]) {
        self.replies.lock().push_back(Ok(AssistantReply {
            thread_id: Some(thread_id.to_string()),
            messages: texts.iter().map(|t| t.to_string()).collect(),
        }));
    }

    pub(crate) fn fail(&self, message: &str) {
        self.replies
            .lock()
            .push_back(Err(Error::Rejected(message.to_string())));
    }

    /// Never answer from now on
    pub(crate) fn hang(&self) {
        self.hang.store(true, Ordering::Release);
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl AssistantTransport for MockTransport {
    async fn send(&self, text: &str, thread_id: Option<&str>) -> Result<AssistantReply> {
        self.calls
            .lock()
            .push((text.to_string(), thread_id.map(str::to_string)));
        if self.hang.load(Ordering::Acquire) {
            return std::future::pending().await;
        }
        let next = self.replies.lock().pop_front();
        next.unwrap_or_else(|| Err(Error::Rejected("no scripted reply".to_string())))
    }
}

/// A history store with scripted answers; unscripted calls succeed.
#[derive(Default)]
pub(crate) struct MockHistory {
    pages: Mutex<VecDeque<Result<MessagePage>>>,
    saves: Mutex<VecDeque<Result<ConversationSummary>>>,
    lists: Mutex<VecDeque<Result<Vec<ConversationSummary>>>>,
    deletes: Mutex<VecDeque<Result<()>>>,
    pub(crate) page_queries: Mutex<Vec<PageQuery>>,
    pub(crate) saved: Mutex<Vec<NewConversation>>,
    pub(crate) deleted: Mutex<Vec<String>>,
    pub(crate) list_calls: Mutex<usize>,
}

impl MockHistory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn page(&self, messages: Vec<StoredMessage>, has_more: bool, next: Option<&str>) {
        self.pages.lock().push_back(Ok(MessagePage {
            messages,
            pagination: Pagination {
                has_more,
                next_page_after: next.map(str::to_string),
            },
        }));
    }

    pub(crate) fn page_error(&self, message: &str) {
        self.pages
            .lock()
            .push_back(Err(Error::api(500, message.to_string())));
    }

    pub(crate) fn save_error(&self, message: &str) {
        self.saves
            .lock()
            .push_back(Err(Error::api(500, message.to_string())));
    }

    pub(crate) fn list(&self, conversations: Vec<ConversationSummary>) {
        self.lists.lock().push_back(Ok(conversations));
    }

    pub(crate) fn delete_result(&self, result: Result<()>) {
        self.deletes.lock().push_back(result);
    }

    pub(crate) fn query_count(&self) -> usize {
        self.page_queries.lock().len()
    }
}

#[async_trait]
impl HistoryStore for MockHistory {
    async fn list_conversations(&self, _options: &ListOptions) -> Result<Vec<ConversationSummary>> {
        *self.list_calls.lock() += 1;
        let next = self.lists.lock().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn save_conversation(&self, draft: &NewConversation) -> Result<ConversationSummary> {
        let attempt = {
            let mut saved = self.saved.lock();
            saved.push(draft.clone());
            saved.len()
        };
        let next = self.saves.lock().pop_front();
        next.unwrap_or_else(|| {
            Ok(ConversationSummary {
                id: format!("conv-{}", attempt),
                thread_id: Some(draft.thread_id.clone()),
                title: draft.title.clone(),
                first_message_preview: Some(draft.first_message_preview.clone()),
                last_message_preview: Some(draft.last_message_preview.clone()),
                model_used: Some(draft.model_used.clone()),
                ..Default::default()
            })
        })
    }

    async fn get_messages(&self, query: &PageQuery) -> Result<MessagePage> {
        self.page_queries.lock().push(query.clone());
        let next = self.pages.lock().pop_front();
        next.unwrap_or_else(|| Ok(MessagePage::default()))
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.deleted.lock().push(conversation_id.to_string());
        let next = self.deletes.lock().pop_front();
        next.unwrap_or(Ok(()))
    }
}

pub(crate) fn stored(id: &str, role: &str, text: &str) -> StoredMessage {
    StoredMessage {
        id: id.to_string(),
        role: role.to_string(),
        text: text.to_string(),
        created_at: None,
    }
}

pub(crate) fn summary(id: &str, thread_id: &str) -> ConversationSummary {
    ConversationSummary {
        id: id.to_string(),
        thread_id: Some(thread_id.to_string()),
        title: format!("Conversation {}", id),
        ..Default::default()
    }
}

pub(crate) fn test_config() -> SessionConfig {
    SessionConfig {
        request_timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    }
}

pub(crate) fn make_session(
    transport: Arc<MockTransport>,
    history: Arc<MockHistory>,
    config: SessionConfig,
) -> ChatSession {
    ChatSession::new(SessionContext {
        identity: Arc::new(StaticToken::new(Some("test-token".into()))),
        transport,
        history,
        config,
    })
}

pub(crate) fn anonymous_session(
    transport: Arc<MockTransport>,
    history: Arc<MockHistory>,
) -> ChatSession {
    ChatSession::new(SessionContext {
        identity: Arc::new(StaticToken::anonymous()),
        transport,
        history,
        config: test_config(),
    })
}
