pub mod telegram;

use async_trait::async_trait;

use crate::rotation::EmojiRef;

/// A message received from the platform
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Platform-specific chat/channel ID
    pub chat_id: i64,
    /// Platform-specific user ID
    pub user_id: u64,
    /// Display name of the user
    pub user_name: String,
    /// The message text
    pub text: String,
}

/// Outbound capabilities of the messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// True when the chat exists and is reachable by the bot.
    async fn resolve_chat(&self, chat_id: i64) -> bool;

    async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;

    async fn set_presence(&self, text: &str, emoji: &EmojiRef) -> anyhow::Result<()>;
}
