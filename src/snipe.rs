use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// How many deleted messages are retained per chat.
const CAPACITY: usize = 5;

/// A message recovered from a deletion notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedMessage {
    pub content: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-chat bounded history of recently deleted messages.
///
/// Newest evicts oldest. Never persisted; a restart clears it.
#[derive(Clone, Default)]
pub struct SnipeCache {
    chats: Arc<Mutex<HashMap<i64, VecDeque<DeletedMessage>>>>,
}

impl SnipeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, chat_id: i64, message: DeletedMessage) {
        let mut chats = self.chats.lock().await;
        let buffer = chats
            .entry(chat_id)
            .or_insert_with(|| VecDeque::with_capacity(CAPACITY));
        if buffer.len() >= CAPACITY {
            buffer.pop_front();
        }
        buffer.push_back(message);
    }

    /// The most recently deleted message for the chat, if any.
    pub async fn latest(&self, chat_id: i64) -> Option<DeletedMessage> {
        self.chats
            .lock()
            .await
            .get(&chat_id)
            .and_then(|buffer| buffer.back().cloned())
    }
}
