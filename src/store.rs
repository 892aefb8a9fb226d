use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

/// A persisted recurring-message definition for one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMessageEntry {
    /// Seconds between firings. Must be greater than zero.
    #[serde(rename = "time")]
    pub interval_secs: u64,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationState {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfkState {
    pub enabled: bool,
    #[serde(default)]
    pub reason: String,
}

/// The full persisted document, one sub-section per concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    auto_messages: HashMap<i64, AutoMessageEntry>,
    #[serde(default)]
    rotation: RotationState,
    #[serde(default)]
    afk: AfkState,
    #[serde(default)]
    responders: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("an auto message is already scheduled for chat {0}")]
    AlreadyScheduled(i64),
    #[error("failed to access state file: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// File-backed bot state behind an in-memory mirror.
///
/// Every mutation rewrites the whole document through a temp file followed
/// by a rename, so concurrent readers never observe a partial write. The
/// mirror is only updated after the rewrite succeeds.
#[derive(Clone)]
pub struct StateStore {
    path: PathBuf,
    state: Arc<Mutex<PersistedState>>,
}

impl StateStore {
    /// Load state from `path`. A missing file is an empty state, not an error.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let state = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(e) => return Err(e.into()),
        };

        info!("State store loaded from: {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            state: Arc::new(Mutex::new(state)),
        })
    }

    async fn persist(&self, state: &PersistedState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    pub async fn add_auto_message(
        &self,
        chat_id: i64,
        entry: AutoMessageEntry,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.auto_messages.contains_key(&chat_id) {
            return Err(StoreError::AlreadyScheduled(chat_id));
        }

        let mut next = state.clone();
        next.auto_messages.insert(chat_id, entry);
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    /// Returns true when an entry existed and was removed.
    pub async fn remove_auto_message(&self, chat_id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if !state.auto_messages.contains_key(&chat_id) {
            return Ok(false);
        }

        let mut next = state.clone();
        next.auto_messages.remove(&chat_id);
        self.persist(&next).await?;
        *state = next;
        Ok(true)
    }

    pub async fn auto_messages(&self) -> HashMap<i64, AutoMessageEntry> {
        self.state.lock().await.auto_messages.clone()
    }

    pub async fn rotation_enabled(&self) -> bool {
        self.state.lock().await.rotation.enabled
    }

    pub async fn set_rotation_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.rotation.enabled = enabled;
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    pub async fn afk(&self) -> AfkState {
        self.state.lock().await.afk.clone()
    }

    pub async fn set_afk(&self, afk: AfkState) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.afk = afk;
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    pub async fn responders(&self) -> BTreeMap<String, String> {
        self.state.lock().await.responders.clone()
    }

    pub async fn responder_for(&self, trigger: &str) -> Option<String> {
        self.state.lock().await.responders.get(trigger).cloned()
    }

    pub async fn set_responder(&self, name: &str, response: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.responders
            .insert(name.to_string(), response.to_string());
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    /// Returns true when a responder existed and was removed.
    pub async fn remove_responder(&self, name: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if !state.responders.contains_key(name) {
            return Ok(false);
        }

        let mut next = state.clone();
        next.responders.remove(name);
        self.persist(&next).await?;
        *state = next;
        Ok(true)
    }
}
