use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::push::PushReconciler;
use super::SyncError;
use crate::gateway::{ChatGateway, GatewayError};
use crate::models::message::sort_chronologically;
use crate::models::Message;
use crate::store::{ConversationStore, StoreState};

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives every request against the gateway and keeps the store in step with it.
///
/// Operations never panic and never retry. A failed request rolls back or
/// degrades the store first, then returns the error for the caller to show.
pub struct SyncController {
    gateway: Arc<dyn ChatGateway>,
    store: ConversationStore,
    response_timeout: Duration,
    cancel: CancellationToken,
    reconciler: PushReconciler,
}

impl SyncController {
    /// Subscribes to the gateway's push channel for the controller's lifetime.
    /// Must be called from within a tokio runtime.
    pub fn new(gateway: Arc<dyn ChatGateway>, response_timeout: Duration) -> Self {
        let store = ConversationStore::new();
        let cancel = CancellationToken::new();
        let reconciler =
            PushReconciler::spawn(store.clone(), gateway.subscribe(), cancel.child_token());
        Self {
            gateway,
            store,
            response_timeout,
            cancel,
            reconciler,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn is_listening(&self) -> bool {
        self.reconciler.is_running()
    }

    /// Stop push routing and any pending response timers.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        self.reconciler.shutdown().await;
    }

    pub async fn list_conversations(&self) -> Result<(), SyncError> {
        self.start_request();
        match self.gateway.list_conversations().await {
            Ok(conversations) => {
                tracing::info!("Loaded {} conversations", conversations.len());
                self.finish_request(|s| s.conversations = conversations);
                Ok(())
            }
            // Keep whatever we had; stale is better than empty.
            Err(e) => Err(self.fail_request("load conversations", e, |_| {})),
        }
    }

    pub async fn create_conversation(&self, title: Option<&str>) -> Result<(), SyncError> {
        self.start_request();
        match self.gateway.create_conversation(title).await {
            Ok(conversation) if conversation.id.is_empty() => Err(self.fail_request(
                "create conversation",
                GatewayError::InvalidResponse("Created conversation has no id".to_string()),
                |_| {},
            )),
            Ok(conversation) => {
                tracing::info!("Created conversation {}", conversation.id);
                self.finish_request(|s| {
                    // A brand-new conversation has no history to fetch.
                    s.active_conversation_id = Some(conversation.id.clone());
                    s.messages.clear();
                    s.prepend_conversation(conversation);
                });
                Ok(())
            }
            Err(e) => Err(self.fail_request("create conversation", e, |_| {})),
        }
    }

    /// Point the selection at `id` right away, then load its history.
    pub async fn select_conversation(&self, id: &str) -> Result<(), SyncError> {
        if id.trim().is_empty() {
            tracing::error!("Cannot set active conversation: ID is empty");
            return Err(SyncError::Validation(
                "Conversation id must not be empty".to_string(),
            ));
        }

        self.store.set_active_conversation(Some(id.to_string()));
        self.load_conversation(id).await
    }

    async fn load_conversation(&self, id: &str) -> Result<(), SyncError> {
        self.start_request();
        match self.gateway.get_conversation(id).await {
            Ok(detail) => {
                let mut messages = detail.messages;
                sort_chronologically(&mut messages);
                let conversation = detail.conversation;
                self.finish_request(|s| {
                    s.replace_conversation_where(|c| c.id == id, &conversation);
                    if s.active_conversation_id.as_deref() == Some(id) {
                        tracing::debug!("Loaded {} messages for {}", messages.len(), id);
                        s.messages = messages;
                    } else {
                        tracing::debug!("Discarding messages for {}; selection moved on", id);
                    }
                });
                Ok(())
            }
            Err(e) => Err(self.fail_request("load conversation", e, |s| {
                // Never show another conversation's messages under this one.
                if s.active_conversation_id.as_deref() == Some(id) {
                    s.messages.clear();
                }
            })),
        }
    }

    /// Echo the message locally, then reconcile it with the server's copy.
    pub async fn send_message(&self, content: &str) -> Result<(), SyncError> {
        let content = content.trim();
        if content.is_empty() {
            tracing::warn!("Refusing to send an empty message");
            return Err(SyncError::Validation(
                "Message content must not be empty".to_string(),
            ));
        }
        let Some(conversation_id) = self.store.active_conversation_id() else {
            tracing::warn!("Cannot send message: no active conversation");
            return Err(SyncError::NoActiveConversation);
        };

        let optimistic = Message::optimistic(&conversation_id, content);
        let temp_id = optimistic.id.clone();
        self.store.update(|s| {
            s.append_message(optimistic);
            s.sending_message = true;
            s.last_error = None;
        });

        match self.gateway.send_message(&conversation_id, content).await {
            Ok(confirmed) => {
                tracing::debug!("Message {} confirmed as {}", temp_id, confirmed.id);
                let generation = self.store.update(|s| {
                    // Gone if the user navigated away while the send was in flight.
                    s.replace_message_where(|m| m.id == temp_id, confirmed);
                    s.sending_message = false;
                    // A reply for a conversation that is no longer shown would be dropped
                    // on arrival, so there is nothing to wait for.
                    let still_active =
                        s.active_conversation_id.as_deref() == Some(conversation_id.as_str());
                    s.set_waiting_for_response(still_active);
                    s.reply_generation += 1;
                    s.reply_generation
                });
                self.arm_response_timeout(generation);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Error sending message: {}", e);
                self.store.update(|s| {
                    s.remove_messages_where(|m| m.id == temp_id);
                    s.sending_message = false;
                    s.set_waiting_for_response(false);
                    s.report_error(&e);
                });
                Err(e.into())
            }
        }
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<(), SyncError> {
        self.start_request();
        match self.gateway.delete_conversation(id).await {
            Ok(()) => {
                tracing::info!("Conversation {} deleted", id);
                self.finish_request(|s| {
                    s.remove_conversations_where(|c| c.id == id);
                    if s.active_conversation_id.as_deref() == Some(id) {
                        s.active_conversation_id = None;
                        s.messages.clear();
                    }
                });
                Ok(())
            }
            Err(e) => Err(self.fail_request("delete conversation", e, |_| {})),
        }
    }

    /// Give up waiting for the reply to this send after the timeout, unless a
    /// reply arrived or a newer send took over in the meantime.
    fn arm_response_timeout(&self, generation: u64) {
        let store = self.store.clone();
        let timeout = self.response_timeout;
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let expired = store.update_if(|s| {
                        s.reply_generation == generation && s.set_waiting_for_response(false)
                    });
                    if expired {
                        tracing::warn!("No reply within {:?}; no longer waiting", timeout);
                    }
                }
            }
        });
    }

    fn start_request(&self) {
        self.store.update(|s| {
            s.begin_request();
            s.last_error = None;
        });
    }

    fn finish_request(&self, apply: impl FnOnce(&mut StoreState)) {
        self.store.update(|s| {
            apply(s);
            s.end_request();
        });
    }

    fn fail_request(
        &self,
        operation: &str,
        error: GatewayError,
        rollback: impl FnOnce(&mut StoreState),
    ) -> SyncError {
        tracing::error!("Error trying to {}: {}", operation, error);
        self.finish_request(|s| {
            rollback(s);
            s.report_error(&error);
        });
        error.into()
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
