use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix reserved for locally generated ids. Server ids never use it.
const TEMP_ID_PREFIX: &str = "temp_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Local echo of a user message that the server has not confirmed yet.
    pub fn optimistic(conversation_id: &str, content: &str) -> Self {
        Self {
            id: new_temporary_id(),
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            role: Role::User,
            timestamp: Utc::now(),
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}

pub fn new_temporary_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4())
}

/// Stable ascending sort by timestamp; equal timestamps keep their arrival order.
pub fn sort_chronologically(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.timestamp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn msg(id: &str, offset_secs: i64, base: DateTime<Utc>) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: "conv_1".to_string(),
            content: id.to_string(),
            role: Role::User,
            timestamp: base + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn test_optimistic_message_is_temporary() {
        let m = Message::optimistic("conv_1", "Hello");
        assert!(m.is_temporary());
        assert_eq!(m.role, Role::User);
        assert_eq!(m.conversation_id, "conv_1");
        assert_ne!(Message::optimistic("conv_1", "Hello").id, m.id);
    }

    #[test]
    fn test_sort_is_stable_and_idempotent() {
        let base = Utc::now();
        let mut messages = vec![
            msg("c", 5, base),
            msg("a", 1, base),
            msg("b1", 3, base),
            msg("b2", 3, base),
        ];
        sort_chronologically(&mut messages);
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b1", "b2", "c"]);

        let before = messages.clone();
        sort_chronologically(&mut messages);
        assert_eq!(messages, before);
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(Role::from_str("assistant"), Some(Role::Assistant));
        assert_eq!(Role::from_str("system"), None);
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
    }
}
