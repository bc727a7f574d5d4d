use async_trait::async_trait;

use super::types::{ConversationDetail, GatewayError, PushStream};
use crate::models::{Conversation, Message};

#[async_trait]
pub trait ChatGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_conversation(&self, title: Option<&str>)
        -> Result<Conversation, GatewayError>;

    async fn list_conversations(&self) -> Result<Vec<Conversation>, GatewayError>;

    async fn get_conversation(&self, id: &str) -> Result<ConversationDetail, GatewayError>;

    /// Returns the server-confirmed echo of the user message.
    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<Message, GatewayError>;

    async fn delete_conversation(&self, id: &str) -> Result<(), GatewayError>;

    /// Subscribe to newly produced messages across all conversations.
    fn subscribe(&self) -> PushStream;
}
