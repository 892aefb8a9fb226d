use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::{BusinessMessagesDeleted, ChatId};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::commands::CommandHandler;
use crate::platform::{IncomingMessage, Messenger};
use crate::rotation::EmojiRef;
use crate::snipe::{DeletedMessage, SnipeCache};

/// How many recently seen messages are kept per chat for deletion lookups.
const SEEN_CAPACITY: usize = 256;

/// Outbound Telegram port.
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn resolve_chat(&self, chat_id: i64) -> bool {
        self.bot.get_chat(ChatId(chat_id)).await.is_ok()
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .with_context(|| format!("failed to send message to chat {chat_id}"))?;
        Ok(())
    }

    async fn set_presence(&self, text: &str, emoji: &EmojiRef) -> Result<()> {
        // Custom emoji ids have no rendering in the short description, so
        // only the name is applied.
        let presence = format!("{} {}", emoji.name, text).trim().to_string();
        self.bot
            .set_my_short_description()
            .short_description(presence)
            .await
            .context("failed to update presence")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SeenMessage {
    id: i32,
    content: String,
    author: String,
    timestamp: DateTime<Utc>,
}

/// Recently seen messages per chat. Deletion updates carry only message
/// ids, so this cache resolves them back to content and author.
#[derive(Clone, Default)]
struct SeenMessages {
    chats: Arc<Mutex<HashMap<i64, VecDeque<SeenMessage>>>>,
}

impl SeenMessages {
    async fn remember(&self, chat_id: i64, message: SeenMessage) {
        let mut chats = self.chats.lock().await;
        let buffer = chats.entry(chat_id).or_default();
        if buffer.len() >= SEEN_CAPACITY {
            buffer.pop_front();
        }
        buffer.push_back(message);
    }

    async fn take(&self, chat_id: i64, message_id: i32) -> Option<SeenMessage> {
        let mut chats = self.chats.lock().await;
        let buffer = chats.get_mut(&chat_id)?;
        let position = buffer.iter().position(|m| m.id == message_id)?;
        buffer.remove(position)
    }
}

/// Shared dispatcher state.
struct AppState {
    commands: Arc<CommandHandler>,
    snipe: SnipeCache,
    seen: SeenMessages,
    allowed_user_ids: Vec<u64>,
    bot_username: String,
}

/// Run the Telegram platform
pub async fn run(
    bot: Bot,
    commands: Arc<CommandHandler>,
    snipe: SnipeCache,
    allowed_user_ids: Vec<u64>,
) -> Result<()> {
    let me = bot.get_me().await.context("failed to fetch bot identity")?;
    let bot_username = me.username().to_string();

    info!("Starting Telegram platform as @{}", bot_username);

    let state = Arc::new(AppState {
        commands,
        snipe,
        seen: SeenMessages::default(),
        allowed_user_ids,
        bot_username,
    });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_deleted_business_messages().endpoint(handle_deleted));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let user = match msg.from.as_ref() {
        Some(user) => user,
        None => return Ok(()),
    };

    let text = match msg.text() {
        Some(t) => t.to_string(),
        None => return Ok(()),
    };

    let chat_id = msg.chat.id.0;
    let author = user.first_name.clone();

    state
        .seen
        .remember(
            chat_id,
            SeenMessage {
                id: msg.id.0,
                content: text.clone(),
                author: author.clone(),
                timestamp: msg.date,
            },
        )
        .await;

    let incoming = IncomingMessage {
        chat_id,
        user_id: user.id.0,
        user_name: author,
        text: text.clone(),
    };

    if state.allowed_user_ids.contains(&user.id.0) {
        if let Some(reply) = state.commands.handle(&incoming).await {
            for chunk in split_message(&reply, 4000) {
                bot.send_message(msg.chat.id, chunk).await.ok();
            }
            return Ok(());
        }
    }

    let mentions_bot = text.contains(&format!("@{}", state.bot_username));
    if let Some(reply) = state.commands.passive_reply(&incoming, mentions_bot).await {
        bot.send_message(msg.chat.id, reply).await.ok();
    }

    Ok(())
}

async fn handle_deleted(
    update: BusinessMessagesDeleted,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let chat_id = update.chat.id.0;

    for message_id in &update.message_ids {
        let Some(seen) = state.seen.take(chat_id, message_id.0).await else {
            continue;
        };

        state
            .snipe
            .record(
                chat_id,
                DeletedMessage {
                    content: seen.content,
                    author: seen.author,
                    timestamp: seen.timestamp,
                },
            )
            .await;
    }

    Ok(())
}

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}
