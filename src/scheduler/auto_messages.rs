use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::platform::Messenger;
use crate::scheduler::{spawn_every, TaskHandle};
use crate::store::{AutoMessageEntry, StateStore, StoreError};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("interval must be greater than 0 seconds")]
    InvalidInterval,
    #[error("chat {0} not found")]
    UnknownChat(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Live auto-message registry.
///
/// Owns one cancellable runner per chat and keeps the persisted definitions
/// in step with the running set: an entry is persisted before its runner
/// starts, and a runner is stopped before its entry is removed.
pub struct AutoMessageService {
    store: StateStore,
    platform: Arc<dyn Messenger>,
    running: Mutex<HashMap<i64, TaskHandle>>,
}

impl AutoMessageService {
    pub fn new(store: StateStore, platform: Arc<dyn Messenger>) -> Self {
        Self {
            store,
            platform,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule `content` to be sent to `chat_id` every `interval_secs`.
    pub async fn schedule(
        &self,
        chat_id: i64,
        interval_secs: u64,
        content: &str,
    ) -> Result<(), ScheduleError> {
        if interval_secs == 0 {
            return Err(ScheduleError::InvalidInterval);
        }
        if !self.platform.resolve_chat(chat_id).await {
            return Err(ScheduleError::UnknownChat(chat_id));
        }

        let entry = AutoMessageEntry {
            interval_secs,
            content: content.to_string(),
        };
        self.store.add_auto_message(chat_id, entry.clone()).await?;

        let handle = self.start_runner(chat_id, &entry);
        self.running.lock().await.insert(chat_id, handle);

        info!(
            "Auto message scheduled every {}s for chat {}",
            interval_secs, chat_id
        );
        Ok(())
    }

    /// Stop and forget the auto message for `chat_id`. Returns false when
    /// nothing was scheduled.
    pub async fn unschedule(&self, chat_id: i64) -> Result<bool, ScheduleError> {
        let mut running = self.running.lock().await;
        let Some(handle) = running.get(&chat_id) else {
            return Ok(false);
        };

        handle.stop();
        running.remove(&chat_id);
        drop(running);

        self.store.remove_auto_message(chat_id).await?;
        info!("Auto message stopped for chat {}", chat_id);
        Ok(true)
    }

    /// Persisted entries, ordered by chat id.
    pub async fn list(&self) -> Vec<(i64, AutoMessageEntry)> {
        let mut entries: Vec<_> = self.store.auto_messages().await.into_iter().collect();
        entries.sort_by_key(|(chat_id, _)| *chat_id);
        entries
    }

    pub async fn is_running(&self, chat_id: i64) -> bool {
        self.running.lock().await.contains_key(&chat_id)
    }

    /// Re-instantiate runners for every persisted entry whose chat still
    /// resolves. Entries pointing at unresolvable chats are kept on disk so
    /// a transient resolution failure cannot silently drop configuration.
    pub async fn reconcile_on_startup(&self) -> usize {
        let mut started = 0;
        for (chat_id, entry) in self.store.auto_messages().await {
            if !self.platform.resolve_chat(chat_id).await {
                warn!(
                    "Skipping persisted auto message for unresolvable chat {}",
                    chat_id
                );
                continue;
            }

            let handle = self.start_runner(chat_id, &entry);
            self.running.lock().await.insert(chat_id, handle);
            started += 1;
        }

        started
    }

    fn start_runner(&self, chat_id: i64, entry: &AutoMessageEntry) -> TaskHandle {
        let platform = Arc::clone(&self.platform);
        let content = entry.content.clone();
        spawn_every(
            Duration::from_secs(entry.interval_secs),
            format!("auto-message:{chat_id}"),
            move || {
                let platform = Arc::clone(&platform);
                let content = content.clone();
                Box::pin(async move { platform.send_message(chat_id, &content).await })
            },
        )
    }
}
