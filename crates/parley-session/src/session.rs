//! Chat session: sending, reply merging, persistence and history paging
//!
//! Every remote operation is split in two. `begin_*` validates, applies the
//! optimistic state change and returns a pending request that owns everything
//! it needs; `run()` performs the call without touching the session; and
//! `complete_*` applies the result. Each pending request carries the epoch it
//! was started in. Starting a new conversation or selecting another one bumps
//! the epoch and cancels in-flight calls, so late results are discarded
//! instead of leaking into the wrong conversation.

use std::sync::Arc;
use std::time::Duration;

use parley_api::{
    ApiClient, AssistantReply, ConversationSummary, IdentityProvider, ListOptions, MessagePage,
    NewConversation, PageQuery, SortOrder,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    conversation::{Conversation, SessionStatus},
    error::{Operation, Result, SessionError},
    events::{ScrollAnchor, SessionEvent},
    handle::{SessionHandle, guarded},
    history::HistoryStore,
    message::{Message, PaginationCursor, merge_assistant_texts},
    summary::draft_conversation,
    transport::AssistantTransport,
};

/// What to do when a reply names a different thread than the open one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadChangePolicy {
    /// Treat the reply as a failed send
    #[default]
    Reject,
    /// Switch to the new thread and log a warning
    Adopt,
}

impl std::str::FromStr for ThreadChangePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "adopt" => Ok(Self::Adopt),
            other => Err(format!("unknown thread policy '{}' (expected reject or adopt)", other)),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Messages requested per history page
    pub page_size: u32,
    /// Upper bound on every remote call
    pub request_timeout: Duration,
    pub thread_policy: ThreadChangePolicy,
    /// Recorded as `modelUsed` when a conversation is saved
    pub model_label: String,
    /// Query used by [`ChatSession::refresh_conversations`]
    pub list_options: ListOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_size: 25,
            request_timeout: Duration::from_secs(60),
            thread_policy: ThreadChangePolicy::default(),
            model_label: "assistant".to_string(),
            list_options: ListOptions::default(),
        }
    }
}

/// Collaborators a session talks to
#[derive(Clone)]
pub struct SessionContext {
    pub identity: Arc<dyn IdentityProvider>,
    pub transport: Arc<dyn AssistantTransport>,
    pub history: Arc<dyn HistoryStore>,
    pub config: SessionConfig,
}

impl SessionContext {
    /// Use one API client for both the assistant and history.
    pub fn from_client(client: ApiClient, config: SessionConfig) -> Self {
        let identity = client.identity().clone();
        let client = Arc::new(client);
        Self {
            identity,
            transport: client.clone(),
            history: client,
            config,
        }
    }
}

/// An assistant request that has been started but not yet sent
pub struct PendingSend {
    epoch: u64,
    optimistic_id: String,
    text: String,
    thread_id: Option<String>,
    transport: Arc<dyn AssistantTransport>,
    cancel: CancellationToken,
    timeout: Duration,
}

impl PendingSend {
    /// Text being sent
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Thread the request continues, if any
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Perform the call. Never touches the session.
    pub async fn run(self) -> SendReply {
        let PendingSend {
            epoch,
            optimistic_id,
            text,
            thread_id,
            transport,
            cancel,
            timeout,
        } = self;
        let result = guarded(cancel, timeout, transport.send(&text, thread_id.as_deref()))
            .await
            .map_err(|f| f.into_session_error(Operation::Send));
        SendReply {
            epoch,
            optimistic_id,
            result,
        }
    }
}

/// Result of [`PendingSend::run`], to hand back to [`ChatSession::complete_send`]
#[derive(Debug)]
pub struct SendReply {
    epoch: u64,
    optimistic_id: String,
    result: Result<AssistantReply>,
}

/// How a send ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Reply merged; `needs_save` is set when this was a new conversation's first exchange
    Delivered { added: usize, needs_save: bool },
    /// The optimistic message was removed
    Failed(SessionError),
    /// The session moved on before the reply arrived
    Discarded,
}

/// A save request for the open conversation
pub struct PendingSave {
    epoch: u64,
    draft: NewConversation,
    history: Arc<dyn HistoryStore>,
    cancel: CancellationToken,
    timeout: Duration,
}

impl PendingSave {
    pub fn draft(&self) -> &NewConversation {
        &self.draft
    }

    pub async fn run(self) -> SaveReply {
        let PendingSave {
            epoch,
            draft,
            history,
            cancel,
            timeout,
        } = self;
        let result = guarded(cancel, timeout, history.save_conversation(&draft))
            .await
            .map_err(|f| f.into_session_error(Operation::Persist));
        SaveReply {
            epoch,
            thread_id: draft.thread_id,
            result,
        }
    }
}

#[derive(Debug)]
pub struct SaveReply {
    epoch: u64,
    thread_id: String,
    result: Result<ConversationSummary>,
}

/// How a save ended
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Stored. `selected` is false when the session had already moved on,
    /// in which case the summary only joins the history list.
    Saved {
        summary: ConversationSummary,
        selected: bool,
    },
    /// Not stored; the exchange stays on screen
    Failed(SessionError),
    Discarded,
}

/// A history page request
pub struct PendingPage {
    epoch: u64,
    load_more: bool,
    query: PageQuery,
    history: Arc<dyn HistoryStore>,
    cancel: CancellationToken,
    timeout: Duration,
}

impl PendingPage {
    pub fn query(&self) -> &PageQuery {
        &self.query
    }

    /// Whether this page goes before the messages already shown
    pub fn is_load_more(&self) -> bool {
        self.load_more
    }

    pub async fn run(self) -> PageReply {
        let PendingPage {
            epoch,
            load_more,
            query,
            history,
            cancel,
            timeout,
        } = self;
        let result = guarded(cancel, timeout, history.get_messages(&query))
            .await
            .map_err(|f| f.into_session_error(Operation::Page));
        PageReply {
            epoch,
            load_more,
            conversation_id: query.conversation_id,
            result,
        }
    }
}

#[derive(Debug)]
pub struct PageReply {
    epoch: u64,
    load_more: bool,
    conversation_id: String,
    result: Result<MessagePage>,
}

/// How a page request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Messages were placed; `anchor` is where the view should go
    Loaded {
        count: usize,
        anchor: Option<ScrollAnchor>,
    },
    /// Nothing to fetch
    Unchanged,
    Failed(SessionError),
    Discarded,
}

/// One chat view: its messages, thread, selection and paging state
pub struct ChatSession {
    context: SessionContext,
    state: Conversation,
    /// Bumped whenever the open conversation changes
    epoch: u64,
    event_tx: broadcast::Sender<SessionEvent>,
    handle: SessionHandle,
}

impl ChatSession {
    pub fn new(context: SessionContext) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            context,
            state: Conversation::default(),
            epoch: 0,
            event_tx,
            handle: SessionHandle::new(),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Get the current state
    pub fn state(&self) -> &Conversation {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.context.config
    }

    /// Get a cloneable handle for aborting and waiting from other tasks
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.state.thread_id.as_deref()
    }

    pub fn selected_conversation_id(&self) -> Option<&str> {
        self.state.selected_conversation_id.as_deref()
    }

    pub fn cursor(&self) -> &PaginationCursor {
        &self.state.cursor
    }

    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.state.conversations
    }

    pub fn status(&self) -> &SessionStatus {
        &self.state.status
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.state.last_error.as_ref()
    }

    pub fn scroll_anchor(&self) -> Option<&ScrollAnchor> {
        self.state.scroll_anchor.as_ref()
    }

    pub fn input(&self) -> &str {
        &self.state.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.state.input = text.into();
    }

    /// Dismiss the last error
    pub fn clear_error(&mut self) {
        self.state.last_error = None;
        if matches!(self.state.status, SessionStatus::Error(_)) {
            self.set_status(SessionStatus::Idle);
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_status(&mut self, status: SessionStatus) {
        self.handle.set_busy(status.is_busy());
        self.state.status = status.clone();
        self.emit(SessionEvent::StatusChanged { status });
    }

    fn messages_changed(&self) {
        self.emit(SessionEvent::MessagesChanged {
            count: self.state.messages.len(),
        });
    }

    fn scroll_to(&mut self, anchor: ScrollAnchor) {
        self.state.scroll_anchor = Some(anchor.clone());
        self.emit(SessionEvent::ScrollTo { anchor });
    }

    /// Record an error for display without changing status.
    fn surface(&mut self, error: SessionError) {
        self.state.last_error = Some(error.clone());
        self.emit(SessionEvent::Error { error });
    }

    /// Record an error and end the current operation with it.
    fn fail(&mut self, error: SessionError) {
        self.set_status(SessionStatus::Error(error.clone()));
        self.surface(error);
    }

    fn discard(&self, operation: &'static str) {
        tracing::debug!(
            "Discarding {} response for a conversation that is no longer open",
            operation
        );
        self.emit(SessionEvent::StaleResponse { operation });
    }

    /// Invalidate everything in flight for the open conversation.
    fn switch_context(&mut self) {
        self.epoch += 1;
        self.handle.renew();
    }

    fn ensure_authenticated(&self) -> Result<()> {
        if self.context.identity.is_authenticated() {
            Ok(())
        } else {
            Err(SessionError::NotAuthenticated)
        }
    }

    fn rollback(&mut self, optimistic_id: &str) {
        self.state.messages.retain(|m| m.id != optimistic_id);
        self.messages_changed();
    }

    // ----- sending -----

    fn check_send(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }
        self.ensure_authenticated()?;
        if self.state.status.is_busy() {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    /// Validate `text`, show it optimistically, and return the request to run.
    ///
    /// A rejected precondition is surfaced as the last error and changes
    /// nothing else.
    pub fn begin_send(&mut self, text: &str) -> Result<PendingSend> {
        if let Err(e) = self.check_send(text) {
            self.surface(e.clone());
            return Err(e);
        }

        let message = Message::user(text);
        let optimistic_id = message.id.clone();
        self.state.messages.push(message);
        self.state.input.clear();
        self.state.last_error = None;
        self.set_status(SessionStatus::Sending);
        self.messages_changed();
        self.scroll_to(ScrollAnchor::Newest);

        tracing::debug!(
            "Sending message on thread {:?}",
            self.state.thread_id.as_deref()
        );

        Ok(PendingSend {
            epoch: self.epoch,
            optimistic_id,
            text: text.to_string(),
            thread_id: self.state.thread_id.clone(),
            transport: self.context.transport.clone(),
            cancel: self.handle.token(),
            timeout: self.context.config.request_timeout,
        })
    }

    /// Apply an assistant reply.
    pub fn complete_send(&mut self, reply: SendReply) -> SendOutcome {
        if reply.epoch != self.epoch {
            self.discard("send");
            return SendOutcome::Discarded;
        }

        let SendReply {
            optimistic_id,
            result,
            ..
        } = reply;
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Send failed: {}", e);
                self.rollback(&optimistic_id);
                self.fail(e.clone());
                return SendOutcome::Failed(e);
            }
        };

        let mut adopted_first_thread = false;
        match (self.state.thread_id.clone(), reply.thread_id) {
            (None, Some(current)) => {
                self.state.thread_id = Some(current.clone());
                adopted_first_thread = true;
                self.emit(SessionEvent::ThreadChanged {
                    previous: None,
                    current,
                });
            }
            (Some(expected), Some(received)) if expected != received => {
                match self.context.config.thread_policy {
                    ThreadChangePolicy::Reject => {
                        tracing::warn!(
                            "Assistant replied on thread {} while {} is open, rejecting",
                            received,
                            expected
                        );
                        let e = SessionError::ThreadMismatch { expected, received };
                        self.rollback(&optimistic_id);
                        self.fail(e.clone());
                        return SendOutcome::Failed(e);
                    }
                    ThreadChangePolicy::Adopt => {
                        tracing::warn!("Assistant moved thread {} to {}", expected, received);
                        self.state.thread_id = Some(received.clone());
                        self.emit(SessionEvent::ThreadChanged {
                            previous: Some(expected),
                            current: received,
                        });
                    }
                }
            }
            (None, None) => tracing::warn!("Assistant reply carried no thread id"),
            _ => {}
        }

        let added = merge_assistant_texts(&mut self.state.messages, reply.messages);
        let needs_save = adopted_first_thread && !self.state.is_saved();
        tracing::debug!("Merged {} new assistant message(s)", added);

        self.set_status(SessionStatus::Idle);
        self.messages_changed();
        self.scroll_to(ScrollAnchor::Newest);

        SendOutcome::Delivered { added, needs_save }
    }

    /// Send `text` and wait for the reply, saving the conversation after its
    /// first exchange. Returns the number of assistant messages added.
    ///
    /// A failed save does not fail the send; it is surfaced as the last error.
    pub async fn send_message(&mut self, text: &str) -> Result<usize> {
        let pending = self.begin_send(text)?;
        let reply = pending.run().await;
        match self.complete_send(reply) {
            SendOutcome::Delivered { added, needs_save } => {
                if needs_save {
                    if let Err(e) = self.persist_conversation().await {
                        tracing::debug!("Continuing unsaved: {}", e);
                    }
                }
                Ok(added)
            }
            SendOutcome::Failed(e) => Err(e),
            SendOutcome::Discarded => Ok(0),
        }
    }

    /// Send the pending input text
    pub async fn submit_input(&mut self) -> Result<usize> {
        let text = self.state.input.clone();
        self.send_message(&text).await
    }

    // ----- persistence -----

    /// Build the save request for an unsaved conversation that has a thread.
    pub fn begin_save(&self) -> Option<PendingSave> {
        if self.state.is_saved() {
            return None;
        }
        let thread_id = self.state.thread_id.as_deref()?;
        let draft = draft_conversation(
            &self.state.messages,
            thread_id,
            &self.context.config.model_label,
        )?;
        Some(PendingSave {
            epoch: self.epoch,
            draft,
            history: self.context.history.clone(),
            cancel: self.handle.token(),
            timeout: self.context.config.request_timeout,
        })
    }

    pub fn complete_save(&mut self, reply: SaveReply) -> SaveOutcome {
        match reply.result {
            Ok(summary) => {
                let selected = reply.epoch == self.epoch
                    && !self.state.is_saved()
                    && self.state.thread_id.as_deref() == Some(reply.thread_id.as_str());
                if selected {
                    self.state.selected_conversation_id = Some(summary.id.clone());
                } else {
                    tracing::debug!("Saved conversation {} after it was closed", summary.id);
                }
                self.state.upsert_summary(summary.clone());
                self.emit(SessionEvent::ConversationSaved {
                    summary: summary.clone(),
                });
                SaveOutcome::Saved { summary, selected }
            }
            Err(_) if reply.epoch != self.epoch => {
                self.discard("save");
                SaveOutcome::Discarded
            }
            Err(e) => {
                tracing::warn!("Conversation was not saved: {}", e);
                self.surface(e.clone());
                SaveOutcome::Failed(e)
            }
        }
    }

    /// Save the open conversation if it has not been saved yet.
    pub async fn persist_conversation(&mut self) -> Result<Option<ConversationSummary>> {
        let Some(pending) = self.begin_save() else {
            return Ok(None);
        };
        match self.complete_save(pending.run().await) {
            SaveOutcome::Saved { summary, .. } => Ok(Some(summary)),
            SaveOutcome::Failed(e) => Err(e),
            SaveOutcome::Discarded => Ok(None),
        }
    }

    // ----- history paging -----

    fn is_loaded(&self, conversation_id: &str) -> bool {
        self.state.selected_conversation_id.as_deref() == Some(conversation_id)
            && !self.state.messages.is_empty()
    }

    fn check_select(&self, summary: &ConversationSummary, load_more: bool) -> Result<()> {
        self.ensure_authenticated()?;
        match self.state.status {
            SessionStatus::Sending => return Err(SessionError::Busy),
            SessionStatus::LoadingPage if load_more => return Err(SessionError::Busy),
            _ => {}
        }
        if load_more && self.state.selected_conversation_id.as_deref() != Some(summary.id.as_str())
        {
            return Err(SessionError::NotSelected(summary.id.clone()));
        }
        Ok(())
    }

    fn pending_page(
        &self,
        conversation_id: String,
        load_more: bool,
        after: Option<String>,
    ) -> PendingPage {
        PendingPage {
            epoch: self.epoch,
            load_more,
            query: PageQuery {
                conversation_id,
                limit: self.context.config.page_size,
                order: SortOrder::Asc,
                after,
            },
            history: self.context.history.clone(),
            cancel: self.handle.token(),
            timeout: self.context.config.request_timeout,
        }
    }

    /// Open a saved conversation, or with `load_more` fetch the page before
    /// the oldest message shown.
    ///
    /// Returns `Ok(None)` when there is nothing to fetch: the conversation is
    /// already open and loaded, or no older page exists. Opening a
    /// conversation supersedes a page load in flight; sending does not.
    pub fn begin_select(
        &mut self,
        summary: &ConversationSummary,
        load_more: bool,
    ) -> Result<Option<PendingPage>> {
        if !load_more && self.is_loaded(&summary.id) {
            tracing::debug!("Conversation {} already open", summary.id);
            return Ok(None);
        }
        if let Err(e) = self.check_select(summary, load_more) {
            self.surface(e.clone());
            return Err(e);
        }

        if load_more {
            if !self.state.cursor.has_more {
                return Ok(None);
            }
            let after = self.state.cursor.next_page_after.clone();
            self.set_status(SessionStatus::LoadingPage);
            return Ok(Some(self.pending_page(summary.id.clone(), true, after)));
        }

        self.switch_context();
        self.state.messages.clear();
        self.state.selected_conversation_id = Some(summary.id.clone());
        self.state.thread_id = summary.thread_id.clone();
        self.state.cursor = PaginationCursor::default();
        self.state.last_error = None;
        self.state.scroll_anchor = None;
        self.messages_changed();
        self.set_status(SessionStatus::LoadingPage);

        tracing::debug!("Opening conversation {}", summary.id);
        Ok(Some(self.pending_page(summary.id.clone(), false, None)))
    }

    /// Place a fetched page.
    pub fn complete_page(&mut self, reply: PageReply) -> PageOutcome {
        let open = self.state.selected_conversation_id.as_deref();
        if reply.epoch != self.epoch || open != Some(reply.conversation_id.as_str()) {
            self.discard("page");
            return PageOutcome::Discarded;
        }

        let page = match reply.result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Loading conversation {} failed: {}", reply.conversation_id, e);
                if !reply.load_more {
                    self.state.messages.clear();
                    self.state.cursor = PaginationCursor::default();
                    self.messages_changed();
                }
                self.fail(e.clone());
                return PageOutcome::Failed(e);
            }
        };

        let fetched: Vec<Message> = page.messages.into_iter().map(Message::from_stored).collect();
        let count = fetched.len();
        let anchor = if reply.load_more {
            let anchor = fetched.first().map(|m| ScrollAnchor::Message(m.id.clone()));
            self.state.messages.splice(0..0, fetched);
            anchor
        } else {
            self.state.messages = fetched;
            Some(ScrollAnchor::Newest)
        };
        self.state.cursor = page.pagination.into();

        self.set_status(SessionStatus::Idle);
        self.messages_changed();
        if let Some(anchor) = anchor.clone() {
            self.scroll_to(anchor);
        }

        PageOutcome::Loaded { count, anchor }
    }

    /// Open `summary` (or page further back in it) and wait for the page.
    pub async fn select_conversation(
        &mut self,
        summary: &ConversationSummary,
        load_more: bool,
    ) -> Result<PageOutcome> {
        let Some(pending) = self.begin_select(summary, load_more)? else {
            return Ok(PageOutcome::Unchanged);
        };
        match self.complete_page(pending.run().await) {
            PageOutcome::Failed(e) => Err(e),
            outcome => Ok(outcome),
        }
    }

    /// Fetch the page before the oldest message of the open conversation.
    pub async fn load_older_messages(&mut self) -> Result<PageOutcome> {
        let Some(summary) = self.selected_summary() else {
            return Ok(PageOutcome::Unchanged);
        };
        self.select_conversation(&summary, true).await
    }

    /// Summary of the open saved conversation. Falls back to a bare summary
    /// when the history list has not been loaded.
    pub fn selected_summary(&self) -> Option<ConversationSummary> {
        let id = self.state.selected_conversation_id.as_deref()?;
        Some(match self.state.summary(id) {
            Some(summary) => summary.clone(),
            None => ConversationSummary {
                id: id.to_string(),
                thread_id: self.state.thread_id.clone(),
                ..Default::default()
            },
        })
    }

    // ----- conversation list -----

    /// Clear the open conversation and cancel anything in flight for it.
    pub fn start_new_conversation(&mut self) {
        self.switch_context();
        self.state.reset();
        self.set_status(SessionStatus::Idle);
        self.messages_changed();
        self.emit(SessionEvent::Reset);
    }

    /// Reload the history list.
    pub async fn refresh_conversations(&mut self) -> Result<usize> {
        if let Err(e) = self.ensure_authenticated() {
            self.surface(e.clone());
            return Err(e);
        }
        let history = self.context.history.clone();
        let options = self.context.config.list_options.clone();
        let outcome = guarded(
            self.handle.token(),
            self.context.config.request_timeout,
            history.list_conversations(&options),
        )
        .await;

        match outcome {
            Ok(conversations) => {
                let count = conversations.len();
                self.state.conversations = conversations;
                self.emit(SessionEvent::ConversationsLoaded { count });
                Ok(count)
            }
            Err(f) => {
                let e = f.into_session_error(Operation::List);
                tracing::warn!("Listing conversations failed: {}", e);
                self.surface(e.clone());
                Err(e)
            }
        }
    }

    /// Delete a saved conversation.
    ///
    /// A conversation the store no longer has counts as deleted. Deleting
    /// the open conversation resets the view. On failure the local list is
    /// left untouched.
    pub async fn delete_conversation(&mut self, conversation_id: &str) -> Result<()> {
        if let Err(e) = self.ensure_authenticated() {
            self.surface(e.clone());
            return Err(e);
        }
        let history = self.context.history.clone();
        let outcome = guarded(
            self.handle.token(),
            self.context.config.request_timeout,
            history.delete_conversation(conversation_id),
        )
        .await;

        match outcome {
            Ok(()) => {}
            Err(f) if f.is_not_found() => {
                tracing::debug!("Conversation {} was already gone", conversation_id);
            }
            Err(f) => {
                let e = f.into_session_error(Operation::Delete);
                tracing::warn!("Deleting conversation {} failed: {}", conversation_id, e);
                self.surface(e.clone());
                return Err(e);
            }
        }

        self.state.conversations.retain(|c| c.id != conversation_id);
        if self.state.selected_conversation_id.as_deref() == Some(conversation_id) {
            self.start_new_conversation();
        }
        self.emit(SessionEvent::ConversationDeleted {
            id: conversation_id.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, RequestFailure};
    use crate::message::Sender;
    use crate::testing::*;

    fn assistant_texts(session: &ChatSession) -> Vec<&str> {
        session
            .messages()
            .iter()
            .filter(|m| m.is_assistant())
            .map(|m| m.text.as_str())
            .collect()
    }

    fn ids(session: &ChatSession) -> Vec<&str> {
        session.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_send_appends_user_and_assistant() {
        let transport = MockTransport::new();
        let history = MockHistory::new();
        transport.reply("thread_1", &["Hi there"]);
        let mut session = make_session(transport.clone(), history, test_config());

        let added = session.send_message("Hello").await.unwrap();

        assert_eq!(added, 1);
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[0].sender, Sender::User);
        assert_eq!(session.messages()[0].text, "Hello");
        assert_eq!(session.messages()[1].text, "Hi there");
        assert_eq!(session.thread_id(), Some("thread_1"));
        assert_eq!(session.status(), &SessionStatus::Idle);
        assert_eq!(session.scroll_anchor(), Some(&ScrollAnchor::Newest));
        assert_eq!(transport.calls.lock()[0], ("Hello".to_string(), None));
    }

    #[tokio::test]
    async fn test_cumulative_reply_adds_only_new_text() {
        let transport = MockTransport::new();
        transport.reply("thread_1", &["A"]);
        transport.reply("thread_1", &["A", "B"]);
        let mut session = make_session(transport.clone(), MockHistory::new(), test_config());

        session.send_message("first").await.unwrap();
        let before = session.messages().len();
        let added = session.send_message("second").await.unwrap();

        assert_eq!(added, 1);
        // user message + one new assistant message
        assert_eq!(session.messages().len(), before + 2);
        assert_eq!(assistant_texts(&session), vec!["A", "B"]);
        // second call continues the thread
        assert_eq!(transport.calls.lock()[1].1.as_deref(), Some("thread_1"));
    }

    #[tokio::test]
    async fn test_failed_send_rolls_back() {
        let transport = MockTransport::new();
        transport.fail("backend down");
        let mut session = make_session(transport, MockHistory::new(), test_config());

        let err = session.send_message("hello").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(session.messages().iter().all(|m| m.text != "hello"));
        assert!(matches!(session.status(), SessionStatus::Error(_)));
        assert_eq!(session.last_error(), Some(&err));
        assert!(!session.handle().is_busy());
    }

    #[tokio::test]
    async fn test_empty_input_rejected_without_call() {
        let transport = MockTransport::new();
        let mut session = make_session(transport.clone(), MockHistory::new(), test_config());

        let err = session.send_message("   \n").await.unwrap_err();

        assert_eq!(err, SessionError::EmptyInput);
        assert!(session.messages().is_empty());
        assert_eq!(transport.call_count(), 0);
        assert_eq!(session.status(), &SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_unauthenticated_send_has_no_effect() {
        let transport = MockTransport::new();
        let mut session = anonymous_session(transport.clone(), MockHistory::new());
        session.set_input("hello");

        let err = session.submit_input().await.unwrap_err();

        assert_eq!(err, SessionError::NotAuthenticated);
        assert_eq!(err.to_string(), "User not authenticated");
        assert!(session.messages().is_empty());
        assert_eq!(session.input(), "hello");
        assert_eq!(transport.call_count(), 0);
        assert_eq!(session.last_error(), Some(&SessionError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_second_send_while_sending_is_busy() {
        let transport = MockTransport::new();
        let mut session = make_session(transport, MockHistory::new(), test_config());

        let _pending = session.begin_send("one").unwrap();
        assert!(session.handle().is_busy());
        let err = session.begin_send("two").err().unwrap();

        assert_eq!(err, SessionError::Busy);
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_clears_input() {
        let transport = MockTransport::new();
        transport.reply("t", &["ok"]);
        let mut session = make_session(transport, MockHistory::new(), test_config());
        session.set_input("question");

        session.submit_input().await.unwrap();

        assert_eq!(session.input(), "");
        assert_eq!(session.messages()[0].text, "question");
    }

    #[tokio::test]
    async fn test_send_times_out() {
        let transport = MockTransport::new();
        transport.hang();
        let config = SessionConfig {
            request_timeout: Duration::from_millis(20),
            ..SessionConfig::default()
        };
        let mut session = make_session(transport, MockHistory::new(), config);

        let err = session.send_message("anyone there?").await.unwrap_err();

        assert!(err.is_timeout());
        assert!(session.messages().is_empty());
        assert!(matches!(session.status(), SessionStatus::Error(_)));
    }

    #[tokio::test]
    async fn test_abort_cancels_send() {
        let transport = MockTransport::new();
        transport.hang();
        let mut session = make_session(transport, MockHistory::new(), test_config());

        let pending = session.begin_send("hello").unwrap();
        session.handle().abort();
        let reply = pending.run().await;
        let outcome = session.complete_send(reply);

        assert_eq!(outcome, SendOutcome::Failed(SessionError::Send(RequestFailure::Cancelled)));
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_reply_after_new_conversation_is_discarded() {
        let transport = MockTransport::new();
        transport.reply("thread_old", &["late answer"]);
        let mut session = make_session(transport, MockHistory::new(), test_config());
        let mut events = session.subscribe();

        let pending = session.begin_send("hello").unwrap();
        let reply = pending.run().await;
        session.start_new_conversation();
        let outcome = session.complete_send(reply);

        assert_eq!(outcome, SendOutcome::Discarded);
        assert!(session.messages().is_empty());
        assert!(session.thread_id().is_none());

        let mut saw_stale = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::StaleResponse { operation: "send" }) {
                saw_stale = true;
            }
        }
        assert!(saw_stale);
    }

    #[tokio::test]
    async fn test_new_conversation_cancels_in_flight_send() {
        let transport = MockTransport::new();
        transport.hang();
        let mut session = make_session(transport, MockHistory::new(), test_config());

        let pending = session.begin_send("hello").unwrap();
        session.start_new_conversation();
        let reply = pending.run().await;

        assert_eq!(session.complete_send(reply), SendOutcome::Discarded);
        assert!(!session.handle().is_busy());
    }

    #[tokio::test]
    async fn test_thread_mismatch_rejected_by_default() {
        let transport = MockTransport::new();
        transport.reply("thread_1", &["A"]);
        transport.reply("thread_2", &["A", "B"]);
        let mut session = make_session(transport, MockHistory::new(), test_config());

        session.send_message("first").await.unwrap();
        let err = session.send_message("second").await.unwrap_err();

        assert_eq!(
            err,
            SessionError::ThreadMismatch {
                expected: "thread_1".into(),
                received: "thread_2".into()
            }
        );
        assert_eq!(session.thread_id(), Some("thread_1"));
        assert_eq!(assistant_texts(&session), vec!["A"]);
        assert!(session.messages().iter().all(|m| m.text != "second"));
    }

    #[tokio::test]
    async fn test_thread_change_adopted_when_configured() {
        let transport = MockTransport::new();
        transport.reply("thread_1", &["A"]);
        transport.reply("thread_2", &["B"]);
        let config = SessionConfig {
            thread_policy: ThreadChangePolicy::Adopt,
            ..test_config()
        };
        let mut session = make_session(transport, MockHistory::new(), config);

        session.send_message("first").await.unwrap();
        session.send_message("second").await.unwrap();

        assert_eq!(session.thread_id(), Some("thread_2"));
        assert_eq!(assistant_texts(&session), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_first_exchange_saved_once() {
        let transport = MockTransport::new();
        transport.reply("thread_1", &["Sure, here is a recipe."]);
        transport.reply("thread_1", &["Sure, here is a recipe.", "Bake for 40 minutes."]);
        let history = MockHistory::new();
        let mut session = make_session(transport, history.clone(), test_config());
        let mut events = session.subscribe();

        session.send_message("Give me a bread recipe").await.unwrap();
        session.send_message("How long to bake?").await.unwrap();

        let saved = history.saved.lock();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].thread_id, "thread_1");
        assert_eq!(saved[0].title, "Give me a bread recipe");
        assert_eq!(saved[0].last_message_preview, "Sure, here is a recipe.");
        assert_eq!(saved[0].model_used, "assistant");
        drop(saved);

        assert_eq!(session.selected_conversation_id(), Some("conv-1"));
        assert_eq!(session.conversations()[0].id, "conv-1");

        let mut saw_saved = false;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::ConversationSaved { summary } = event {
                assert_eq!(summary.id, "conv-1");
                saw_saved = true;
            }
        }
        assert!(saw_saved);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_exchange() {
        let transport = MockTransport::new();
        transport.reply("thread_1", &["answer"]);
        let history = MockHistory::new();
        history.save_error("disk full");
        let mut session = make_session(transport, history.clone(), test_config());

        let added = session.send_message("question").await.unwrap();

        assert_eq!(added, 1);
        assert_eq!(session.messages().len(), 2);
        assert!(session.selected_conversation_id().is_none());
        assert_eq!(session.last_error().map(|e| e.kind()), Some(ErrorKind::Persistence));
        assert_eq!(session.status(), &SessionStatus::Idle);
        assert_eq!(history.saved.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_save_landing_after_reset_only_updates_list() {
        let transport = MockTransport::new();
        transport.reply("thread_1", &["answer"]);
        let history = MockHistory::new();
        let mut session = make_session(transport, history, test_config());

        let pending = session.begin_send("question").unwrap();
        let reply = pending.run().await;
        assert_eq!(
            session.complete_send(reply),
            SendOutcome::Delivered {
                added: 1,
                needs_save: true
            }
        );
        let save = session.begin_save().unwrap();
        let reply = save.run().await;
        session.start_new_conversation();

        let outcome = session.complete_save(reply);

        assert!(matches!(outcome, SaveOutcome::Saved { selected: false, .. }));
        assert!(session.selected_conversation_id().is_none());
        assert_eq!(session.conversations().len(), 1);
    }

    #[tokio::test]
    async fn test_selected_conversation_continues_thread_without_saving() {
        let transport = MockTransport::new();
        transport.reply("thread_9", &["old answer", "new answer"]);
        let history = MockHistory::new();
        history.page(
            vec![stored("m1", "user", "old question"), stored("m2", "assistant", "old answer")],
            false,
            None,
        );
        let mut session = make_session(transport.clone(), history.clone(), test_config());

        session.select_conversation(&summary("c9", "thread_9"), false).await.unwrap();
        let added = session.send_message("follow up").await.unwrap();

        assert_eq!(added, 1);
        assert_eq!(transport.calls.lock()[0].1.as_deref(), Some("thread_9"));
        assert_eq!(assistant_texts(&session), vec!["old answer", "new answer"]);
        assert!(history.saved.lock().is_empty());
    }

    #[tokio::test]
    async fn test_select_loads_first_page() {
        let history = MockHistory::new();
        history.page(
            vec![
                stored("m3", "user", "c"),
                stored("m4", "assistant", "d"),
                stored("m5", "user", "e"),
            ],
            true,
            Some("m3"),
        );
        let mut session = make_session(MockTransport::new(), history.clone(), test_config());

        let outcome = session.select_conversation(&summary("c1", "thread_1"), false).await.unwrap();

        assert_eq!(
            outcome,
            PageOutcome::Loaded {
                count: 3,
                anchor: Some(ScrollAnchor::Newest)
            }
        );
        assert_eq!(ids(&session), vec!["m3", "m4", "m5"]);
        assert_eq!(session.thread_id(), Some("thread_1"));
        assert_eq!(session.selected_conversation_id(), Some("c1"));
        assert!(session.cursor().has_more);

        let query = &history.page_queries.lock()[0];
        assert_eq!(query.conversation_id, "c1");
        assert_eq!(query.limit, 25);
        assert_eq!(query.order, SortOrder::Asc);
        assert!(query.after.is_none());
    }

    #[tokio::test]
    async fn test_load_more_prepends_in_order() {
        let history = MockHistory::new();
        history.page(
            vec![
                stored("m3", "user", "c"),
                stored("m4", "assistant", "d"),
                stored("m5", "user", "e"),
            ],
            true,
            Some("m3"),
        );
        history.page(vec![stored("m1", "user", "a"), stored("m2", "assistant", "b")], false, None);
        let mut session = make_session(MockTransport::new(), history.clone(), test_config());
        let conversation = summary("c1", "thread_1");

        session.select_conversation(&conversation, false).await.unwrap();
        let outcome = session.select_conversation(&conversation, true).await.unwrap();

        assert_eq!(ids(&session), vec!["m1", "m2", "m3", "m4", "m5"]);
        assert_eq!(
            outcome,
            PageOutcome::Loaded {
                count: 2,
                anchor: Some(ScrollAnchor::Message("m1".into()))
            }
        );
        assert_eq!(history.page_queries.lock()[1].after.as_deref(), Some("m3"));
        assert!(!session.cursor().has_more);

        // No more pages: nothing is fetched
        let outcome = session.load_older_messages().await.unwrap();
        assert_eq!(outcome, PageOutcome::Unchanged);
        assert_eq!(history.query_count(), 2);
    }

    #[tokio::test]
    async fn test_reselecting_open_conversation_is_noop() {
        let history = MockHistory::new();
        history.page(vec![stored("m1", "user", "a")], false, None);
        let mut session = make_session(MockTransport::new(), history.clone(), test_config());
        let conversation = summary("c1", "thread_1");

        session.select_conversation(&conversation, false).await.unwrap();
        let outcome = session.select_conversation(&conversation, false).await.unwrap();

        assert_eq!(outcome, PageOutcome::Unchanged);
        assert_eq!(history.query_count(), 1);
        assert_eq!(ids(&session), vec!["m1"]);
    }

    #[tokio::test]
    async fn test_first_page_failure_clears_view() {
        let history = MockHistory::new();
        history.page_error("database unavailable");
        let mut session = make_session(MockTransport::new(), history, test_config());

        let err = session
            .select_conversation(&summary("c1", "thread_1"), false)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Pagination);
        assert!(session.messages().is_empty());
        assert!(matches!(session.status(), SessionStatus::Error(_)));
    }

    #[tokio::test]
    async fn test_load_more_failure_keeps_messages() {
        let history = MockHistory::new();
        history.page(vec![stored("m3", "user", "c")], true, Some("m3"));
        history.page_error("database unavailable");
        let mut session = make_session(MockTransport::new(), history, test_config());
        let conversation = summary("c1", "thread_1");

        session.select_conversation(&conversation, false).await.unwrap();
        let err = session.select_conversation(&conversation, true).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Pagination);
        assert_eq!(ids(&session), vec!["m3"]);
        assert!(session.cursor().has_more);
    }

    #[tokio::test]
    async fn test_load_more_requires_selection() {
        let mut session = make_session(MockTransport::new(), MockHistory::new(), test_config());

        let err = session
            .select_conversation(&summary("c1", "thread_1"), true)
            .await
            .unwrap_err();

        assert_eq!(err, SessionError::NotSelected("c1".into()));
    }

    #[tokio::test]
    async fn test_newer_selection_supersedes_page_in_flight() {
        let history = MockHistory::new();
        // The superseded request is cancelled before it reaches the store
        history.page(vec![stored("b1", "user", "from b")], false, None);
        let mut session = make_session(MockTransport::new(), history, test_config());

        let first = session.begin_select(&summary("a", "thread_a"), false).unwrap().unwrap();
        let second = session.begin_select(&summary("b", "thread_b"), false).unwrap().unwrap();

        let stale = first.run().await;
        assert_eq!(session.complete_page(stale), PageOutcome::Discarded);
        assert_eq!(session.status(), &SessionStatus::LoadingPage);

        let fresh = second.run().await;
        assert!(matches!(session.complete_page(fresh), PageOutcome::Loaded { count: 1, .. }));
        assert_eq!(ids(&session), vec!["b1"]);
        assert_eq!(session.thread_id(), Some("thread_b"));
    }

    #[tokio::test]
    async fn test_select_while_sending_is_busy() {
        let mut session = make_session(MockTransport::new(), MockHistory::new(), test_config());

        let _pending = session.begin_send("hello").unwrap();
        let err = session
            .begin_select(&summary("c1", "thread_1"), false)
            .err()
            .unwrap();

        assert_eq!(err, SessionError::Busy);
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_new_conversation_resets_state() {
        let history = MockHistory::new();
        history.page(vec![stored("m1", "user", "a")], true, Some("m1"));
        history.list(vec![summary("c1", "thread_1")]);
        let mut session = make_session(MockTransport::new(), history, test_config());

        session.refresh_conversations().await.unwrap();
        session.select_conversation(&summary("c1", "thread_1"), false).await.unwrap();
        session.set_input("draft");
        session.start_new_conversation();

        assert!(session.messages().is_empty());
        assert!(session.thread_id().is_none());
        assert!(session.selected_conversation_id().is_none());
        assert_eq!(session.cursor(), &PaginationCursor::default());
        assert_eq!(session.input(), "");
        assert_eq!(session.status(), &SessionStatus::Idle);
        assert_eq!(session.conversations().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_conversations() {
        let history = MockHistory::new();
        history.list(vec![summary("c2", "t2"), summary("c1", "t1")]);
        let mut session = make_session(MockTransport::new(), history.clone(), test_config());

        let count = session.refresh_conversations().await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(session.conversations()[0].id, "c2");
        assert_eq!(*history.list_calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_delete_selected_conversation_resets_view() {
        let history = MockHistory::new();
        history.list(vec![summary("c1", "t1"), summary("c2", "t2")]);
        history.page(vec![stored("m1", "user", "a")], false, None);
        let mut session = make_session(MockTransport::new(), history.clone(), test_config());

        session.refresh_conversations().await.unwrap();
        session.select_conversation(&summary("c1", "t1"), false).await.unwrap();
        session.delete_conversation("c1").await.unwrap();

        assert_eq!(*history.deleted.lock(), vec!["c1".to_string()]);
        assert_eq!(session.conversations().len(), 1);
        assert!(session.selected_conversation_id().is_none());
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_conversation_counts_as_deleted() {
        let history = MockHistory::new();
        history.list(vec![summary("c1", "t1")]);
        history.delete_result(Err(parley_api::Error::NotFound("no such conversation".into())));
        let mut session = make_session(MockTransport::new(), history, test_config());

        session.refresh_conversations().await.unwrap();
        session.delete_conversation("c1").await.unwrap();

        assert!(session.conversations().is_empty());
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_list() {
        let history = MockHistory::new();
        history.list(vec![summary("c1", "t1")]);
        history.delete_result(Err(parley_api::Error::api(500, "internal error")));
        let mut session = make_session(MockTransport::new(), history, test_config());

        session.refresh_conversations().await.unwrap();
        let err = session.delete_conversation("c1").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Delete);
        assert_eq!(session.conversations().len(), 1);
    }

    #[tokio::test]
    async fn test_refused_delete_keeps_open_conversation() {
        let history = MockHistory::new();
        history.list(vec![summary("c1", "t1")]);
        history.page(vec![stored("m1", "user", "a")], false, None);
        history.delete_result(Err(parley_api::Error::Rejected("Conversation is locked".into())));
        let mut session = make_session(MockTransport::new(), history, test_config());

        session.refresh_conversations().await.unwrap();
        session.select_conversation(&summary("c1", "t1"), false).await.unwrap();
        let err = session.delete_conversation("c1").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Delete);
        assert_eq!(session.conversations().len(), 1);
        assert_eq!(session.selected_conversation_id(), Some("c1"));
        assert_eq!(session.messages().len(), 1);
        assert!(session.last_error().is_some());
    }

    #[tokio::test]
    async fn test_events_follow_send() {
        let transport = MockTransport::new();
        transport.reply("thread_1", &["hi"]);
        let mut session = make_session(transport, MockHistory::new(), test_config());
        let mut events = session.subscribe();

        session.send_message("hello").await.unwrap();

        let mut statuses = Vec::new();
        let mut thread_changed = false;
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::StatusChanged { status } => statuses.push(status),
                SessionEvent::ThreadChanged { previous: None, current } => {
                    assert_eq!(current, "thread_1");
                    thread_changed = true;
                }
                _ => {}
            }
        }
        assert_eq!(statuses.first(), Some(&SessionStatus::Sending));
        assert!(statuses.contains(&SessionStatus::Idle));
        assert!(thread_changed);
    }

    #[test]
    fn test_thread_policy_parses() {
        assert_eq!("reject".parse::<ThreadChangePolicy>().unwrap(), ThreadChangePolicy::Reject);
        assert_eq!("Adopt".parse::<ThreadChangePolicy>().unwrap(), ThreadChangePolicy::Adopt);
        assert!("maybe".parse::<ThreadChangePolicy>().is_err());
    }
}
