//! Reactive state container for conversations and the active conversation's messages.
//!
//! State lives behind a [`watch`] channel: every mutation happens inside a single
//! `send_modify` call, so observers only ever see complete states, and each
//! observer can wait for changes with [`watch::Receiver::changed`].

use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{Conversation, Message};

/// A consistent snapshot of everything the store holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub(crate) conversations: Vec<Conversation>,
    pub(crate) active_conversation_id: Option<String>,
    pub(crate) messages: Vec<Message>,
    pub(crate) in_flight: usize,
    pub(crate) sending_message: bool,
    pub(crate) waiting_for_response: bool,
    pub(crate) reply_generation: u64,
    pub(crate) last_error: Option<String>,
}

impl StoreState {
    /// Newest-created first.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active_conversation_id(&self) -> Option<&str> {
        self.active_conversation_id.as_deref()
    }

    /// Looked up by id on every call, never cached.
    pub fn active_conversation(&self) -> Option<&Conversation> {
        let id = self.active_conversation_id.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Messages of the active conversation, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn sending_message(&self) -> bool {
        self.sending_message
    }

    pub fn waiting_for_response(&self) -> bool {
        self.waiting_for_response
    }

    /// The most recent failure reported by any operation or by the push channel.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct ConversationStore {
    tx: Arc<watch::Sender<StoreState>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StoreState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> StoreState {
        self.tx.borrow().clone()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.tx.borrow().conversations.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.tx.borrow().messages.clone()
    }

    pub fn active_conversation_id(&self) -> Option<String> {
        self.tx.borrow().active_conversation_id.clone()
    }

    pub fn active_conversation(&self) -> Option<Conversation> {
        self.tx.borrow().active_conversation().cloned()
    }

    pub fn loading(&self) -> bool {
        self.tx.borrow().loading()
    }

    pub fn sending_message(&self) -> bool {
        self.tx.borrow().sending_message
    }

    pub fn waiting_for_response(&self) -> bool {
        self.tx.borrow().waiting_for_response
    }

    pub fn last_error(&self) -> Option<String> {
        self.tx.borrow().last_error.clone()
    }

    /// Apply several field changes as one atomic, observable step.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut result = None;
        self.tx.send_modify(|state| result = Some(f(state)));
        result.unwrap_or_else(|| unreachable!("send_modify runs its closure exactly once"))
    }

    /// Like [`update`](Self::update) but observers are only woken when `f` reports a change.
    pub(crate) fn update_if(&self, f: impl FnOnce(&mut StoreState) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    pub(crate) fn set_active_conversation(&self, id: Option<String>) {
        self.update(|s| s.active_conversation_id = id);
    }
}

/// Mutation entry points. Callers compose them inside [`ConversationStore::update`]
/// so a multi-step change still reaches observers as one state.
impl StoreState {
    pub(crate) fn prepend_conversation(&mut self, conversation: Conversation) {
        self.conversations.insert(0, conversation);
    }

    /// Replace every conversation matching `pred` with `replacement`, keeping its position.
    pub(crate) fn replace_conversation_where<P>(&mut self, pred: P, replacement: &Conversation) -> bool
    where
        P: Fn(&Conversation) -> bool,
    {
        let mut replaced = false;
        for conv in self.conversations.iter_mut() {
            if pred(conv) {
                *conv = replacement.clone();
                replaced = true;
            }
        }
        replaced
    }

    pub(crate) fn remove_conversations_where<P>(&mut self, pred: P) -> usize
    where
        P: Fn(&Conversation) -> bool,
    {
        let before = self.conversations.len();
        self.conversations.retain(|c| !pred(c));
        before - self.conversations.len()
    }

    pub(crate) fn append_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace the first message matching `pred`, keeping its position.
    pub(crate) fn replace_message_where<P>(&mut self, pred: P, replacement: Message) -> bool
    where
        P: Fn(&Message) -> bool,
    {
        match self.messages.iter().position(|m| pred(m)) {
            Some(index) => {
                self.messages[index] = replacement;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_messages_where<P>(&mut self, pred: P) -> usize
    where
        P: Fn(&Message) -> bool,
    {
        let before = self.messages.len();
        self.messages.retain(|m| !pred(m));
        before - self.messages.len()
    }

    /// Marks one more request in flight; `loading` stays true until every one has finished.
    pub(crate) fn begin_request(&mut self) {
        self.in_flight += 1;
    }

    pub(crate) fn end_request(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Returns whether the flag actually changed; clearing an already-clear flag is a no-op.
    pub(crate) fn set_waiting_for_response(&mut self, waiting: bool) -> bool {
        std::mem::replace(&mut self.waiting_for_response, waiting) != waiting
    }

    pub(crate) fn report_error(&mut self, error: impl ToString) {
        self.last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Utc;

    fn conv(id: &str, title: &str) -> Conversation {
        Conversation::new(id, Some(title), Utc::now())
    }

    fn msg(id: &str, content: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            content: content.to_string(),
            role: Role::User,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_active_conversation_follows_collection() {
        let store = ConversationStore::new();
        store.update(|s| s.conversations = vec![conv("c1", "One"), conv("c2", "Two")]);
        assert!(store.active_conversation().is_none());

        store.set_active_conversation(Some("c2".to_string()));
        assert_eq!(store.active_conversation().unwrap().title, "Two");

        store.update(|s| s.replace_conversation_where(|c| c.id == "c2", &conv("c2", "Renamed")));
        assert_eq!(store.active_conversation().unwrap().title, "Renamed");

        assert_eq!(store.update(|s| s.remove_conversations_where(|c| c.id == "c2")), 1);
        assert_eq!(store.active_conversation_id().as_deref(), Some("c2"));
        assert!(store.active_conversation().is_none());
    }

    #[test]
    fn test_prepend_keeps_newest_first() {
        let store = ConversationStore::new();
        store.update(|s| s.prepend_conversation(conv("c1", "Old")));
        store.update(|s| s.prepend_conversation(conv("c2", "New")));
        let ids: Vec<_> = store.conversations().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["c2", "c1"]);
    }

    #[test]
    fn test_replace_message_keeps_position() {
        let store = ConversationStore::new();
        store.update(|s| {
            s.append_message(msg("a", "1"));
            s.append_message(msg("temp_x", "2"));
            s.append_message(msg("c", "3"));
        });
        assert!(store.update(|s| s.replace_message_where(|m| m.id == "temp_x", msg("b", "2"))));
        let ids: Vec<_> = store.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(!store.update(|s| s.replace_message_where(|m| m.id == "missing", msg("z", "9"))));
        assert_eq!(store.update(|s| s.remove_messages_where(|m| m.id == "b")), 1);
        assert_eq!(store.messages().len(), 2);
    }

    #[test]
    fn test_loading_counts_overlapping_requests() {
        let store = ConversationStore::new();
        store.update(|s| s.begin_request());
        store.update(|s| s.begin_request());
        store.update(|s| s.end_request());
        assert!(store.loading());
        store.update(|s| s.end_request());
        assert!(!store.loading());
        store.update(|s| s.end_request());
        assert!(!store.loading());
    }

    #[tokio::test]
    async fn test_observers_see_changes_but_not_no_ops() {
        let store = ConversationStore::new();
        let mut rx = store.subscribe();

        assert!(!store.update_if(|s| s.set_waiting_for_response(false)));
        assert!(!rx.has_changed().unwrap());

        assert!(store.update_if(|s| s.set_waiting_for_response(true)));
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().waiting_for_response());

        store.update(|s| s.report_error("boom"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().last_error(), Some("boom"));
    }
}
