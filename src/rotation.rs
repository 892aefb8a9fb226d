use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::platform::Messenger;
use crate::store::{StateStore, StoreError};

/// An emoji list entry: a bare name, or `name:id` for a custom emoji.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiRef {
    pub name: String,
    pub id: Option<String>,
}

/// Parse one emoji list line. More than one `:` is malformed.
pub fn parse_emoji(raw: &str) -> Option<EmojiRef> {
    let parts: Vec<&str> = raw.split(':').collect();
    match parts.as_slice() {
        [name] => Some(EmojiRef {
            name: (*name).to_string(),
            id: None,
        }),
        [name, id] => Some(EmojiRef {
            name: (*name).to_string(),
            id: Some((*id).to_string()),
        }),
        _ => None,
    }
}

/// Where the rotation loop reads its status and emoji lists. Both lists are
/// re-read every pass so edits take effect without a restart.
pub trait SourceProvider: Send + Sync {
    fn statuses(&self) -> Result<Vec<String>>;
    fn emojis(&self) -> Result<Vec<String>>;
}

/// Line-oriented text files, one entry per line. Blank lines are ignored.
pub struct FileSources {
    pub status_file: PathBuf,
    pub emoji_file: PathBuf,
}

impl FileSources {
    fn read_lines(path: &PathBuf) -> Result<Vec<String>> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }
}

impl SourceProvider for FileSources {
    fn statuses(&self) -> Result<Vec<String>> {
        Self::read_lines(&self.status_file)
    }

    fn emojis(&self) -> Result<Vec<String>> {
        Self::read_lines(&self.emoji_file)
    }
}

/// Cursor into the status and emoji lists.
///
/// Owned by the running loop and never shared. The emoji index wraps modulo
/// the emoji list length; the status list is walked to exhaustion each pass,
/// so its counter only ever grows. Reset by a process restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationCursor {
    pub status_index: usize,
    pub emoji_index: usize,
}

/// One full traversal of the status list, applying one status+emoji
/// combination per tick. Malformed emoji entries are skipped with the
/// cursor still advancing, so a single bad line cannot wedge the rotation.
pub async fn run_pass(
    cursor: &mut RotationCursor,
    statuses: &[String],
    emojis: &[String],
    platform: &dyn Messenger,
    delay: Duration,
) {
    if emojis.is_empty() {
        return;
    }

    for status in statuses {
        let raw = &emojis[cursor.emoji_index % emojis.len()];
        let Some(emoji) = parse_emoji(raw) else {
            warn!("Skipping malformed emoji entry: {}", raw);
            cursor.status_index += 1;
            cursor.emoji_index += 1;
            continue;
        };

        if let Err(e) = platform.set_presence(status, &emoji).await {
            warn!("Failed to update presence: {:#}", e);
        }

        cursor.status_index += 1;
        cursor.emoji_index += 1;
        tokio::time::sleep(delay).await;
    }
}

/// Rotates the presence string through the status list, one entry per tick.
///
/// `start` raises the persisted enable flag and spawns a single loop task;
/// `stop` lowers the flag, which the loop observes at its next pass
/// boundary. The retained join handle only guards against a second
/// concurrent loop; the flag is the sole stop mechanism.
pub struct StatusRotator {
    store: StateStore,
    platform: Arc<dyn Messenger>,
    sources: Arc<dyn SourceProvider>,
    delay: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StatusRotator {
    pub fn new(
        store: StateStore,
        platform: Arc<dyn Messenger>,
        sources: Arc<dyn SourceProvider>,
        delay: Duration,
    ) -> Self {
        Self {
            store,
            platform,
            sources,
            delay,
            task: Mutex::new(None),
        }
    }

    /// Start rotating. Returns false when a loop is already running.
    pub async fn start(&self) -> Result<bool, StoreError> {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                return Ok(false);
            }
        }

        self.store.set_rotation_enabled(true).await?;

        let store = self.store.clone();
        let platform = Arc::clone(&self.platform);
        let sources = Arc::clone(&self.sources);
        let delay = self.delay;
        *task = Some(tokio::spawn(async move {
            rotation_loop(store, platform, sources, delay).await;
        }));

        Ok(true)
    }

    /// Lower the persisted flag. The loop exits at its next pass boundary,
    /// finishing the status currently in progress.
    pub async fn stop(&self) -> Result<(), StoreError> {
        self.store.set_rotation_enabled(false).await
    }

    pub async fn is_running(&self) -> bool {
        matches!(self.task.lock().await.as_ref(), Some(handle) if !handle.is_finished())
    }
}

async fn rotation_loop(
    store: StateStore,
    platform: Arc<dyn Messenger>,
    sources: Arc<dyn SourceProvider>,
    delay: Duration,
) {
    info!("Status rotation started");
    let mut cursor = RotationCursor::default();

    loop {
        if !store.rotation_enabled().await {
            break;
        }

        let statuses = match sources.statuses() {
            Ok(statuses) => statuses,
            Err(e) => {
                warn!("Failed to load status list: {:#}", e);
                tokio::time::sleep(delay).await;
                continue;
            }
        };
        let emojis = match sources.emojis() {
            Ok(emojis) => emojis,
            Err(e) => {
                warn!("Failed to load emoji list: {:#}", e);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if statuses.is_empty() || emojis.is_empty() {
            warn!("Status rotation has nothing to apply; lists are empty");
            tokio::time::sleep(delay).await;
            continue;
        }

        run_pass(&mut cursor, &statuses, &emojis, platform.as_ref(), delay).await;
    }

    info!("Status rotation stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::time::sleep;

    struct RecordingMessenger {
        applied: Mutex<Vec<(String, String)>>,
    }

    impl RecordingMessenger {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                applied: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn resolve_chat(&self, _chat_id: i64) -> bool {
            true
        }

        async fn send_message(&self, _chat_id: i64, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn set_presence(&self, text: &str, emoji: &EmojiRef) -> Result<()> {
            self.applied
                .lock()
                .await
                .push((text.to_string(), emoji.name.clone()));
            Ok(())
        }
    }

    struct MemorySources {
        statuses: Vec<String>,
        emojis: Vec<String>,
    }

    impl SourceProvider for MemorySources {
        fn statuses(&self) -> Result<Vec<String>> {
            Ok(self.statuses.clone())
        }

        fn emojis(&self) -> Result<Vec<String>> {
            Ok(self.emojis.clone())
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_emoji_accepts_bare_names_and_custom_ids() {
        assert_eq!(
            parse_emoji("wave"),
            Some(EmojiRef {
                name: "wave".to_string(),
                id: None
            })
        );
        assert_eq!(
            parse_emoji("blob:12345"),
            Some(EmojiRef {
                name: "blob".to_string(),
                id: Some("12345".to_string())
            })
        );
        assert_eq!(parse_emoji("a:b:c"), None);
    }

    #[tokio::test]
    async fn emoji_cursor_carries_over_between_passes() {
        let messenger = RecordingMessenger::new();
        let statuses = strings(&["a", "b"]);
        let emojis = strings(&["x", "y", "z"]);
        let mut cursor = RotationCursor::default();

        run_pass(
            &mut cursor,
            &statuses,
            &emojis,
            messenger.as_ref(),
            Duration::ZERO,
        )
        .await;
        run_pass(
            &mut cursor,
            &statuses,
            &emojis,
            messenger.as_ref(),
            Duration::ZERO,
        )
        .await;

        let applied = messenger.applied.lock().await;
        let expected: Vec<(String, String)> = [("a", "x"), ("b", "y"), ("a", "z"), ("b", "x")]
            .iter()
            .map(|(s, e)| (s.to_string(), e.to_string()))
            .collect();
        assert_eq!(*applied, expected);
        assert_eq!(cursor.emoji_index, 4);
        assert_eq!(cursor.status_index, 4);
    }

    #[tokio::test]
    async fn malformed_emoji_is_skipped_but_still_advances_the_cursor() {
        let messenger = RecordingMessenger::new();
        let statuses = strings(&["s1", "s2", "s3"]);
        let emojis = strings(&["x", "bad:extra:colon", "z"]);
        let mut cursor = RotationCursor::default();

        run_pass(
            &mut cursor,
            &statuses,
            &emojis,
            messenger.as_ref(),
            Duration::ZERO,
        )
        .await;

        let applied = messenger.applied.lock().await;
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0], ("s1".to_string(), "x".to_string()));
        assert_eq!(applied[1], ("s3".to_string(), "z".to_string()));
        assert_eq!(cursor.emoji_index, 3);
    }

    fn make_rotator(
        dir: &TempDir,
        statuses: &[&str],
        emojis: &[&str],
        delay: Duration,
    ) -> (StatusRotator, Arc<RecordingMessenger>) {
        let store = StateStore::open(&dir.path().join("state.json")).unwrap();
        let messenger = RecordingMessenger::new();
        let sources = Arc::new(MemorySources {
            statuses: strings(statuses),
            emojis: strings(emojis),
        });
        let rotator = StatusRotator::new(store, messenger.clone(), sources, delay);
        (rotator, messenger)
    }

    #[tokio::test]
    async fn second_start_is_refused_while_the_loop_runs() {
        let tmp = TempDir::new().unwrap();
        let (rotator, _) =
            make_rotator(&tmp, &["a", "b"], &["x"], Duration::from_millis(100));

        assert!(rotator.start().await.unwrap());
        assert!(!rotator.start().await.unwrap());
        assert!(rotator.is_running().await);

        rotator.stop().await.unwrap();
        sleep(Duration::from_millis(500)).await;
        assert!(!rotator.is_running().await);

        // Once the loop has drained, a fresh start is accepted again.
        assert!(rotator.start().await.unwrap());
        rotator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_mid_pass_finishes_the_pass_first() {
        let tmp = TempDir::new().unwrap();
        let (rotator, messenger) =
            make_rotator(&tmp, &["a", "b"], &["x", "y", "z"], Duration::from_millis(80));

        assert!(rotator.start().await.unwrap());

        // Stop lands between the first and second status of the first pass.
        sleep(Duration::from_millis(40)).await;
        rotator.stop().await.unwrap();

        sleep(Duration::from_millis(400)).await;
        assert!(!rotator.is_running().await);

        let applied = messenger.applied.lock().await;
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0], ("a".to_string(), "x".to_string()));
        assert_eq!(applied[1], ("b".to_string(), "y".to_string()));
    }
}
