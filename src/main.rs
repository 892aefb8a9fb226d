mod commands;
mod config;
mod notify;
mod platform;
mod rotation;
mod scheduler;
mod snipe;
mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::notify::Notifier;
use crate::platform::telegram::{self, TelegramMessenger};
use crate::platform::Messenger;
use crate::rotation::{FileSources, SourceProvider, StatusRotator};
use crate::scheduler::auto_messages::AutoMessageService;
use crate::snipe::SnipeCache;
use crate::store::StateStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,herald=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("  State store: {}", config.storage.state_path.display());
    info!("  Allowed users: {:?}", config.telegram.allowed_user_ids);

    let store = StateStore::open(&config.storage.state_path).with_context(|| {
        format!(
            "Failed to open state store at {}",
            config.storage.state_path.display()
        )
    })?;

    let bot = Bot::new(config.telegram.bot_token.clone());
    let messenger: Arc<dyn Messenger> = Arc::new(TelegramMessenger::new(bot.clone()));

    // Rebuild runners for the auto messages that survived the restart.
    let auto = Arc::new(AutoMessageService::new(
        store.clone(),
        Arc::clone(&messenger),
    ));
    let restarted = auto.reconcile_on_startup().await;
    info!("Reconciled {} persisted auto message(s)", restarted);

    let sources: Arc<dyn SourceProvider> = Arc::new(FileSources {
        status_file: config.storage.status_file.clone(),
        emoji_file: config.storage.emoji_file.clone(),
    });
    let rotator = Arc::new(StatusRotator::new(
        store.clone(),
        Arc::clone(&messenger),
        sources,
        Duration::from_secs(config.rotation.delay_secs),
    ));

    let snipe = SnipeCache::new();
    let notifier = Notifier::new(config.notify.as_ref());
    let handler = Arc::new(CommandHandler::new(
        auto,
        rotator,
        snipe.clone(),
        store,
        notifier,
    ));

    info!("Bot is starting...");
    telegram::run(bot, handler, snipe, config.telegram.allowed_user_ids.clone()).await?;

    Ok(())
}
