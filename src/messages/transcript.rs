use super::types::{Message, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// In-session conversation transcript
///
/// Shared between the controller (writer) and the presentation layer
/// (reader). Lives only for the session; nothing is persisted. `push`
/// hands back the stored message so the caller can forward the exact
/// transcript line it recorded.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Arc<RwLock<Vec<Message>>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Append a message and return the stored copy
    pub fn push(&self, message: Message) -> Message {
        let stored = message.clone();
        self.messages.write().push(message);
        stored
    }

    /// The most recent message, if any
    pub fn last(&self) -> Option<Message> {
        self.messages.read().last().cloned()
    }

    /// The most recent message from the given sender
    pub fn last_from(&self, sender: Sender) -> Option<Message> {
        self.messages
            .read()
            .iter()
            .rev()
            .find(|m| m.sender == sender)
            .cloned()
    }

    /// Snapshot of the whole transcript in order
    pub fn messages(&self) -> Vec<Message> {
        self.messages.read().clone()
    }

    pub fn clear(&self) {
        self.messages.write().clear();
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
