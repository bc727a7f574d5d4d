use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::gateway::{GatewayError, PushStream};
use crate::models::Message;
use crate::store::ConversationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended to the active conversation's messages.
    Delivered,
    /// Already present in the view; only the waiting flag was cleared.
    Duplicate,
    /// Belongs to a conversation that is not active.
    Dropped,
    Failed,
}

/// Routes pushed messages into the store for as long as it runs.
pub struct PushReconciler {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PushReconciler {
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        store: ConversationStore,
        mut stream: PushStream,
        cancel: CancellationToken,
    ) -> Self {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("Push reconciler stopped");
                        return;
                    }
                    event = stream.next() => {
                        let Some(event) = event else {
                            tracing::warn!("Push channel closed; no further messages will arrive");
                            return;
                        };
                        let outcome = Self::route(&store, event);
                        tracing::trace!("Push event routed: {:?}", outcome);
                    }
                }
            }
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop routing and wait for the task to wind down.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("Push reconciler task failed: {}", e);
            }
        }
    }

    /// Apply one push event to the store.
    pub fn route(store: &ConversationStore, event: Result<Message, GatewayError>) -> PushOutcome {
        let message = match event {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("Push channel error: {}", e);
                store.update(|s| {
                    s.set_waiting_for_response(false);
                    s.report_error(&e);
                });
                return PushOutcome::Failed;
            }
        };

        let mut outcome = PushOutcome::Dropped;
        store.update_if(|s| {
            if s.active_conversation_id.as_deref() != Some(message.conversation_id.as_str()) {
                return false;
            }
            outcome = if s.messages.iter().any(|m| m.id == message.id) {
                PushOutcome::Duplicate
            } else {
                s.append_message(message.clone());
                PushOutcome::Delivered
            };
            s.set_waiting_for_response(false);
            true
        });

        match outcome {
            PushOutcome::Delivered => {
                tracing::debug!(
                    "Delivered {} message {} to {}",
                    message.role.as_str(),
                    message.id,
                    message.conversation_id
                );
            }
            PushOutcome::Dropped => {
                // Unread tracking for inactive conversations is not implemented.
                tracing::debug!(
                    "Dropped message {} for inactive conversation {}",
                    message.id,
                    message.conversation_id
                );
            }
            _ => {}
        }
        outcome
    }
}

impl Drop for PushReconciler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChatGateway, SimulatedGateway};
    use futures::stream;
    use crate::models::Role;
    use chrono::Utc;

    fn assistant(id: &str, conversation_id: &str, content: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            role: Role::Assistant,
            timestamp: Utc::now(),
        }
    }

    fn store_waiting_on(conversation_id: &str) -> ConversationStore {
        let store = ConversationStore::new();
        store.set_active_conversation(Some(conversation_id.to_string()));
        store.update(|s| s.set_waiting_for_response(true));
        store
    }

    #[test]
    fn test_active_conversation_receives_message() {
        let store = store_waiting_on("c1");
        let outcome = PushReconciler::route(&store, Ok(assistant("m1", "c1", "Hi there")));
        assert_eq!(outcome, PushOutcome::Delivered);
        assert_eq!(store.messages().len(), 1);
        assert!(!store.waiting_for_response());
    }

    #[test]
    fn test_other_conversation_is_dropped() {
        let store = store_waiting_on("c1");
        let outcome = PushReconciler::route(&store, Ok(assistant("m1", "c2", "elsewhere")));
        assert_eq!(outcome, PushOutcome::Dropped);
        assert!(store.messages().is_empty());
        assert!(store.waiting_for_response());
    }

    #[test]
    fn test_repeated_delivery_is_not_duplicated() {
        let store = store_waiting_on("c1");
        PushReconciler::route(&store, Ok(assistant("m1", "c1", "once")));
        store.update(|s| s.set_waiting_for_response(true));
        let outcome = PushReconciler::route(&store, Ok(assistant("m1", "c1", "once")));
        assert_eq!(outcome, PushOutcome::Duplicate);
        assert_eq!(store.messages().len(), 1);
        assert!(!store.waiting_for_response());
    }

    #[test]
    fn test_channel_error_clears_waiting() {
        let store = store_waiting_on("c1");
        let outcome = PushReconciler::route(
            &store,
            Err(GatewayError::Channel("connection reset".to_string())),
        );
        assert_eq!(outcome, PushOutcome::Failed);
        assert!(!store.waiting_for_response());
        assert!(store.last_error().unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_task_routes_until_cancelled() {
        let gateway = SimulatedGateway::new();
        let store = ConversationStore::new();
        store.set_active_conversation(Some("c1".to_string()));
        let mut rx = store.subscribe();
        let mut reconciler =
            PushReconciler::spawn(store.clone(), gateway.subscribe(), CancellationToken::new());

        gateway.push(assistant("m1", "c1", "first"));
        rx.wait_for(|s| s.messages().len() == 1).await.unwrap();
        assert!(reconciler.is_running());

        reconciler.shutdown().await;
        assert!(!reconciler.is_running());
    }

    #[tokio::test]
    async fn test_channel_error_does_not_end_subscription() {
        let store = store_waiting_on("c1");
        let mut rx = store.subscribe();
        let events: PushStream = stream::iter(vec![
            Err(GatewayError::Channel("connection reset".to_string())),
            Ok(assistant("m1", "c1", "still here")),
        ])
        .chain(stream::pending())
        .boxed();
        let mut reconciler = PushReconciler::spawn(store.clone(), events, CancellationToken::new());

        rx.wait_for(|s| s.messages().len() == 1).await.unwrap();
        assert!(store.last_error().unwrap().contains("connection reset"));
        assert_eq!(store.messages()[0].content, "still here");
        assert!(reconciler.is_running());

        reconciler.shutdown().await;
    }
}
