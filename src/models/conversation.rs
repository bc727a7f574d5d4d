use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "New Conversation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Build a conversation, falling back to the default title when none (or an empty one) is given.
    pub fn new(id: impl Into<String>, title: Option<&str>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title_or_default(title),
            created_at,
            updated_at: created_at,
        }
    }
}

pub fn title_or_default(title: Option<&str>) -> String {
    match title.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => DEFAULT_TITLE.to_string(),
    }
}
