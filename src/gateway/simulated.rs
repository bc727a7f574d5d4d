use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream;
use tokio::sync::broadcast;

use super::traits::ChatGateway;
use super::types::{ConversationDetail, GatewayError, PushStream};
use crate::models::message::sort_chronologically;
use crate::models::{Conversation, Message, Role};

const PUSH_CAPACITY: usize = 64;

#[derive(Default)]
struct Inner {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    next_conversation_id: u64,
    next_message_id: u64,
}

impl Inner {
    fn next_conversation_id(&mut self) -> String {
        self.next_conversation_id += 1;
        format!("conv_{}", self.next_conversation_id)
    }

    fn next_message_id(&mut self) -> String {
        self.next_message_id += 1;
        format!("msg_{}", self.next_message_id)
    }
}

/// In-memory backend that fabricates data and answers every user message
/// with a canned assistant reply on the push channel.
#[derive(Clone)]
pub struct SimulatedGateway {
    inner: Arc<Mutex<Inner>>,
    push_tx: broadcast::Sender<Message>,
    latency: Duration,
    reply_delay: Option<Duration>,
    offline: Arc<AtomicBool>,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGateway {
    pub fn new() -> Self {
        let (push_tx, _) = broadcast::channel(PUSH_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            push_tx,
            latency: Duration::ZERO,
            reply_delay: Some(Duration::from_millis(1500)),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// `None` acknowledges sends but never produces a reply.
    pub fn with_reply_delay(mut self, delay: Option<Duration>) -> Self {
        self.reply_delay = delay;
        self
    }

    /// While offline every request fails with a request error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Inject a message on the push channel as if the server produced it.
    pub fn push(&self, message: Message) {
        // No subscribers is not an error for a simulated server.
        let _ = self.push_tx.send(message);
    }

    pub fn reply_text(content: &str) -> String {
        format!(
            "Thanks for your message: \"{}\". This is a mock response from the chatbot.",
            content
        )
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a panicking test thread; the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn round_trip(&self, operation: &str) -> Result<(), GatewayError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Request(format!(
                "{}: simulated backend is offline",
                operation
            )));
        }
        Ok(())
    }

    fn schedule_reply(&self, conversation_id: &str, content: &str) {
        let Some(delay) = self.reply_delay else {
            return;
        };
        let gateway = self.clone();
        let conversation_id = conversation_id.to_string();
        let reply = Self::reply_text(content);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let message = {
                let mut inner = gateway.lock();
                // The conversation may have been deleted while we were "thinking".
                if !inner.conversations.iter().any(|c| c.id == conversation_id) {
                    return;
                }
                let message = Message {
                    id: inner.next_message_id(),
                    conversation_id,
                    content: reply,
                    role: Role::Assistant,
                    timestamp: Utc::now(),
                };
                inner.messages.push(message.clone());
                message
            };
            tracing::debug!("Simulated reply {} ready", message.id);
            gateway.push(message);
        });
    }
}

#[async_trait]
impl ChatGateway for SimulatedGateway {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn create_conversation(
        &self,
        title: Option<&str>,
    ) -> Result<Conversation, GatewayError> {
        self.round_trip("create conversation").await?;
        let mut inner = self.lock();
        let conversation = Conversation::new(inner.next_conversation_id(), title, Utc::now());
        inner.conversations.insert(0, conversation.clone());
        tracing::debug!("Simulated: created conversation {}", conversation.id);
        Ok(conversation)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, GatewayError> {
        self.round_trip("list conversations").await?;
        Ok(self.lock().conversations.clone())
    }

    async fn get_conversation(&self, id: &str) -> Result<ConversationDetail, GatewayError> {
        self.round_trip("get conversation").await?;
        let inner = self.lock();
        let conversation = inner
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("Conversation {} not found", id)))?;
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == id)
            .cloned()
            .collect();
        sort_chronologically(&mut messages);
        Ok(ConversationDetail {
            conversation,
            messages,
        })
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<Message, GatewayError> {
        self.round_trip("send message").await?;
        let message = {
            let mut inner = self.lock();
            if !inner.conversations.iter().any(|c| c.id == conversation_id) {
                return Err(GatewayError::NotFound(format!(
                    "Conversation {} not found",
                    conversation_id
                )));
            }
            let message = Message {
                id: inner.next_message_id(),
                conversation_id: conversation_id.to_string(),
                content: content.to_string(),
                role: Role::User,
                timestamp: Utc::now(),
            };
            inner.messages.push(message.clone());
            message
        };
        self.schedule_reply(conversation_id, content);
        Ok(message)
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), GatewayError> {
        self.round_trip("delete conversation").await?;
        let mut inner = self.lock();
        inner.conversations.retain(|c| c.id != id);
        inner.messages.retain(|m| m.conversation_id != id);
        tracing::debug!("Simulated: deleted conversation {}", id);
        Ok(())
    }

    fn subscribe(&self) -> PushStream {
        let rx = self.push_tx.subscribe();
        Box::pin(stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(message) => Some((Ok(message), rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => Some((
                    Err(GatewayError::Channel(format!(
                        "Subscriber lagged, {} messages skipped",
                        skipped
                    ))),
                    rx,
                )),
                Err(broadcast::error::RecvError::Closed) => None,
            }
        }))
    }
}
