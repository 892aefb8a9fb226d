use serde_json::json;
use tracing::warn;

use crate::config::NotifyConfig;

/// Outbound webhook notifications.
///
/// Failures are logged and swallowed; a webhook outage must never affect
/// message handling.
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(config: Option<&NotifyConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: config.map(|c| c.webhook_url.clone()),
        }
    }

    /// Report that someone pinged the bot while AFK was enabled.
    pub async fn afk_ping(&self, chat_id: i64, author: &str, content: &str) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        let payload = json!({
            "content": format!(
                "Ping received while AFK\nFrom: {author}\nIn chat: {chat_id}\nMessage: {content}"
            ),
        });

        match self.client.post(url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!("AFK webhook returned {}", response.status());
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to post AFK webhook: {:#}", e),
        }
    }
}
