use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::gateway::types::{ConversationDetail, GatewayError};
use crate::models::conversation::title_or_default;
use crate::models::{Conversation, Message, Role};

/// Responses may or may not be wrapped in `{ "success": .., "data": .. }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConversation {
    pub id: Option<String>,
    pub title: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationsField {
    pub conversations: Vec<WireConversation>,
}

/// Every list shape the backend has been seen to return.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireConversationList {
    Array(Vec<WireConversation>),
    Wrapped { data: ConversationsField },
    Keyed(ConversationsField),
    Single(WireConversation),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: Option<String>,
    pub conversation_id: Option<String>,
    pub content: Option<String>,
    pub role: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConversationDetail {
    pub id: Option<String>,
    pub title: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
pub struct WireErrorBody {
    #[serde(alias = "message")]
    pub error: String,
}

/// Missing or unparseable timestamps fall back to now.
pub fn parse_date(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

impl WireConversation {
    pub fn into_conversation(self) -> Option<Conversation> {
        let id = self.id.filter(|id| !id.is_empty())?;
        Some(Conversation {
            id,
            title: title_or_default(self.title.as_deref()),
            created_at: parse_date(self.created_at.as_deref()),
            updated_at: parse_date(self.updated_at.as_deref()),
        })
    }
}

impl WireConversationList {
    pub fn into_conversations(self) -> Vec<Conversation> {
        let entries = match self {
            WireConversationList::Array(items) => items,
            WireConversationList::Wrapped { data } => data.conversations,
            WireConversationList::Keyed(field) => field.conversations,
            WireConversationList::Single(item) => vec![item],
        };
        entries
            .into_iter()
            .filter_map(|entry| {
                let converted = entry.into_conversation();
                if converted.is_none() {
                    tracing::warn!("Skipping conversation without an id");
                }
                converted
            })
            .collect()
    }
}

impl WireMessage {
    /// `fallback_conversation` is used when the payload omits its conversation id.
    pub fn into_message(self, fallback_conversation: Option<&str>) -> Result<Message, GatewayError> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse("Message without id".to_string()))?;
        let conversation_id = self
            .conversation_id
            .filter(|c| !c.is_empty())
            .or_else(|| fallback_conversation.map(str::to_string))
            .ok_or_else(|| {
                GatewayError::InvalidResponse(format!("Message {} has no conversation id", id))
            })?;
        let role = self
            .role
            .as_deref()
            .and_then(Role::from_str)
            .ok_or_else(|| {
                GatewayError::InvalidResponse(format!(
                    "Message {} has unknown role {:?}",
                    id, self.role
                ))
            })?;
        Ok(Message {
            id,
            conversation_id,
            content: self.content.unwrap_or_default(),
            role,
            timestamp: parse_date(self.timestamp.as_deref()),
        })
    }
}

impl WireConversationDetail {
    /// Messages that cannot be decoded are skipped so one bad entry does not hide the rest.
    pub fn into_detail(self, requested_id: &str) -> ConversationDetail {
        let conversation = Conversation {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| requested_id.to_string()),
            title: title_or_default(self.title.as_deref()),
            created_at: parse_date(self.created_at.as_deref()),
            updated_at: parse_date(self.updated_at.as_deref()),
        };
        let messages = self
            .messages
            .into_iter()
            .filter_map(|m| match m.into_message(Some(requested_id)) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!("Skipping message in conversation {}: {}", requested_id, e);
                    None
                }
            })
            .collect();
        ConversationDetail {
            conversation,
            messages,
        }
    }
}
