use futures::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Conversation, Message};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Push channel error: {0}")]
    Channel(String),
}

/// Asynchronously produced messages. Lazy, unbounded, and not restartable once it ends.
pub type PushStream = BoxStream<'static, Result<Message, GatewayError>>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateConversationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// A conversation together with its full message history.
#[derive(Debug, Clone)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}
