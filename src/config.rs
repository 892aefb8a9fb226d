use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default = "default_storage_config")]
    pub storage: StorageConfig,
    #[serde(default = "default_rotation_config")]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub notify: Option<NotifyConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub allowed_user_ids: Vec<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
    #[serde(default = "default_emoji_file")]
    pub emoji_file: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RotationConfig {
    /// Seconds between presence changes within a pass.
    #[serde(default = "default_rotation_delay")]
    pub delay_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    pub webhook_url: String,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("herald_state.json")
}

fn default_status_file() -> PathBuf {
    PathBuf::from("status.txt")
}

fn default_emoji_file() -> PathBuf {
    PathBuf::from("emojis.txt")
}

fn default_rotation_delay() -> u64 {
    30
}

fn default_storage_config() -> StorageConfig {
    StorageConfig {
        state_path: default_state_path(),
        status_file: default_status_file(),
        emoji_file: default_emoji_file(),
    }
}

fn default_rotation_config() -> RotationConfig {
    RotationConfig {
        delay_secs: default_rotation_delay(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_applies_defaults() {
        let config: Config = toml::from_str(
            r#"
            [telegram]
            bot_token = "123:abc"
            allowed_user_ids = [42]
            "#,
        )
        .unwrap();

        assert_eq!(config.telegram.allowed_user_ids, vec![42]);
        assert_eq!(config.storage.state_path, PathBuf::from("herald_state.json"));
        assert_eq!(config.rotation.delay_secs, 30);
        assert!(config.notify.is_none());
    }

    #[test]
    fn notify_section_is_optional_but_parsed() {
        let config: Config = toml::from_str(
            r#"
            [telegram]
            bot_token = "123:abc"
            allowed_user_ids = []

            [notify]
            webhook_url = "https://example.com/hook"

            [rotation]
            delay_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(
            config.notify.unwrap().webhook_url,
            "https://example.com/hook"
        );
        assert_eq!(config.rotation.delay_secs, 5);
    }
}
