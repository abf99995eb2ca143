//! Wire types for the backend endpoints

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Body of `POST /ai/assistant/chat`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest<'a> {
    pub user_input: &'a str,
    pub thread_id: Option<&'a str>,
}

/// Assistant output for one exchange.
///
/// `messages` holds every assistant text the backend knows for the thread,
/// not only the newest reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantReply {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<String>,
}

/// Saved conversation metadata shown in the history list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub first_message_preview: Option<String>,
    #[serde(default)]
    pub last_message_preview: Option<String>,
    #[serde(default)]
    pub model_used: Option<String>,
    /// ISO-8601 creation time
    #[serde(default)]
    pub created_at: Option<String>,
    /// ISO-8601 last update time
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Body of `POST /history/save`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversation {
    pub thread_id: String,
    pub title: String,
    pub first_message_preview: String,
    pub last_message_preview: String,
    pub model_used: String,
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Body of `POST /history/list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    pub page: u32,
    pub limit: u32,
    pub sort_by: String,
    pub sort_order: SortOrder,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 15,
            sort_by: "updatedAt".to_string(),
            sort_order: SortOrder::Desc,
        }
    }
}

/// Body of `POST /history/messages`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub conversation_id: String,
    pub limit: u32,
    pub order: SortOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// A persisted message as stored by the history backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    /// `"user"` for the caller, anything else is assistant-authored
    pub role: String,
    #[serde(alias = "content")]
    pub text: String,
    /// Milliseconds since the Unix epoch
    #[serde(
        default,
        alias = "created_at",
        alias = "timestamp",
        deserialize_with = "timestamp_millis"
    )]
    pub created_at: Option<i64>,
}

/// Accept epoch millis or an RFC 3339 string; anything else reads as absent.
fn timestamp_millis<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|ms| ms as i64)),
        Some(Value::String(text)) => chrono::DateTime::parse_from_rfc3339(text.trim())
            .map(|dt| dt.timestamp_millis())
            .ok()
            .or_else(|| text.trim().parse().ok()),
        _ => None,
    })
}

/// Paging information returned alongside a message page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_page_after: Option<String>,
}

/// One page of stored messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub messages: Vec<StoredMessage>,
    pub pagination: Pagination,
}

/// The `{ success, data, message }` envelope most endpoints answer with
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    message: Option<String>,
    error: Option<String>,
}

impl<T> Envelope<T> {
    /// Resolve into the payload, treating `success: false` as a rejection.
    pub(crate) fn into_result(self, what: &str) -> Result<T> {
        if !self.success {
            return Err(Error::Rejected(
                self.message
                    .or(self.error)
                    .unwrap_or_else(|| format!("Failed to {}", what)),
            ));
        }
        self.data
            .ok_or_else(|| Error::UnexpectedResponse(format!("{}: missing data", what)))
    }
}

/// Answer of endpoints that return no payload, such as `/history/delete`
#[derive(Debug, Deserialize)]
pub(crate) struct Acknowledgement {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    error: Option<String>,
}

impl Acknowledgement {
    pub(crate) fn into_result(self) -> Result<()> {
        if self.success {
            return Ok(());
        }
        Err(Error::Rejected(
            self.message
                .or(self.error)
                .unwrap_or_else(|| "Request was not accepted".to_string()),
        ))
    }
}

/// `/history/messages` answers with its payload at the top level
#[derive(Debug, Deserialize)]
pub(crate) struct MessagesEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    messages: Vec<StoredMessage>,
    #[serde(default)]
    pagination: Option<Pagination>,
    message: Option<String>,
}

impl MessagesEnvelope {
    pub(crate) fn into_result(self) -> Result<MessagePage> {
        if !self.success {
            return Err(Error::Rejected(
                self.message
                    .unwrap_or_else(|| "Failed to get conversation messages".to_string()),
            ));
        }
        Ok(MessagePage {
            messages: self.messages,
            pagination: self.pagination.unwrap_or_default(),
        })
    }
}

/// Error body shape used to pull a message out of non-2xx responses
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: Option<String>,
    pub error: Option<String>,
}
