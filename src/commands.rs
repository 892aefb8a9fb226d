use std::sync::Arc;

use tracing::info;

use crate::notify::Notifier;
use crate::platform::IncomingMessage;
use crate::rotation::StatusRotator;
use crate::scheduler::auto_messages::AutoMessageService;
use crate::snipe::SnipeCache;
use crate::store::{AfkState, StateStore};

const HELP: &str = "Herald commands

Auto messages:
  /schedule <seconds> <chat_id> <message> - repeat a message on an interval
  /unschedule <chat_id> - stop a scheduled message
  /schedules - list scheduled messages

Status rotation:
  /startrotation - start rotating the presence text
  /stoprotation - stop rotating the presence text

Utility:
  /snipe - show the last deleted message in this chat
  /afk <reason> - enable AFK replies
  /unafk - disable AFK replies
  /ar_add <name> <response> - add an auto responder
  /ar_remove <name> - remove an auto responder
  /ar_list - list auto responders
  /help - this text";

/// Routes command messages to the task subsystems and renders replies.
///
/// Every error is turned into a user-visible message here; nothing below
/// this boundary reaches the dispatcher as an error.
pub struct CommandHandler {
    auto: Arc<AutoMessageService>,
    rotator: Arc<StatusRotator>,
    snipe: SnipeCache,
    store: StateStore,
    notifier: Notifier,
}

impl CommandHandler {
    pub fn new(
        auto: Arc<AutoMessageService>,
        rotator: Arc<StatusRotator>,
        snipe: SnipeCache,
        store: StateStore,
        notifier: Notifier,
    ) -> Self {
        Self {
            auto,
            rotator,
            snipe,
            store,
            notifier,
        }
    }

    /// Handle a command message. None when the text is not a command.
    pub async fn handle(&self, incoming: &IncomingMessage) -> Option<String> {
        let text = incoming.text.trim();
        if !text.starts_with('/') {
            return None;
        }

        let (command, args) = match text.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (text, ""),
        };
        // Accept the "/command@botname" form used in group chats.
        let command = command.split('@').next().unwrap_or(command);

        let reply = match command {
            "/schedule" => self.cmd_schedule(args).await,
            "/unschedule" => self.cmd_unschedule(args).await,
            "/schedules" => self.cmd_schedules().await,
            "/startrotation" => self.cmd_start_rotation().await,
            "/stoprotation" => self.cmd_stop_rotation().await,
            "/snipe" => self.cmd_snipe(incoming.chat_id).await,
            "/afk" => self.cmd_afk(args).await,
            "/unafk" => self.cmd_unafk().await,
            "/ar_add" => self.cmd_ar_add(args).await,
            "/ar_remove" => self.cmd_ar_remove(args).await,
            "/ar_list" => self.cmd_ar_list().await,
            "/help" => HELP.to_string(),
            _ => return None,
        };

        info!("Command {} from user {}", command, incoming.user_id);
        Some(reply)
    }

    /// Non-command reactions: the AFK auto-reply and auto responders.
    pub async fn passive_reply(
        &self,
        incoming: &IncomingMessage,
        mentions_bot: bool,
    ) -> Option<String> {
        if mentions_bot {
            let afk = self.store.afk().await;
            if afk.enabled {
                self.notifier
                    .afk_ping(incoming.chat_id, &incoming.user_name, &incoming.text)
                    .await;
                return Some(format!("I am currently AFK.\nReason: {}", afk.reason));
            }
        }

        self.store.responder_for(incoming.text.trim()).await
    }

    async fn cmd_schedule(&self, args: &str) -> String {
        let mut parts = args.splitn(3, char::is_whitespace);
        let (Some(interval), Some(chat), Some(content)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return "Usage: /schedule <seconds> <chat_id> <message>".to_string();
        };

        let Ok(interval_secs) = interval.parse::<u64>() else {
            return "Seconds must be a whole number.".to_string();
        };
        let Ok(chat_id) = chat.parse::<i64>() else {
            return "Chat id must be a number.".to_string();
        };

        match self.auto.schedule(chat_id, interval_secs, content.trim()).await {
            Ok(()) => format!(
                "Auto message scheduled every {interval_secs} seconds in chat {chat_id}."
            ),
            Err(e) => format!("Error: {e}"),
        }
    }

    async fn cmd_unschedule(&self, args: &str) -> String {
        let Ok(chat_id) = args.parse::<i64>() else {
            return "Usage: /unschedule <chat_id>".to_string();
        };

        match self.auto.unschedule(chat_id).await {
            Ok(true) => format!("Auto message stopped for chat {chat_id}."),
            Ok(false) => "No auto message is scheduled for that chat.".to_string(),
            Err(e) => format!("Error: {e}"),
        }
    }

    async fn cmd_schedules(&self) -> String {
        let entries = self.auto.list().await;
        if entries.is_empty() {
            return "No auto messages scheduled.".to_string();
        }

        let mut out = String::from("Scheduled auto messages:\n");
        for (chat_id, entry) in entries {
            out.push_str(&format!(
                "  {}: every {}s, {}\n",
                chat_id, entry.interval_secs, entry.content
            ));
        }
        out
    }

    async fn cmd_start_rotation(&self) -> String {
        match self.rotator.start().await {
            Ok(true) => "Status rotation started.".to_string(),
            Ok(false) => "Status rotation is already running.".to_string(),
            Err(e) => format!("Error: {e}"),
        }
    }

    async fn cmd_stop_rotation(&self) -> String {
        match self.rotator.stop().await {
            Ok(()) => "Status rotation stopped.".to_string(),
            Err(e) => format!("Error: {e}"),
        }
    }

    async fn cmd_snipe(&self, chat_id: i64) -> String {
        match self.snipe.latest(chat_id).await {
            Some(message) => format!(
                "Sniped deleted message\n{} | {}\nSent by {}",
                message.timestamp.format("%Y-%m-%d %H:%M:%S"),
                message.content,
                message.author
            ),
            None => "No messages to snipe in this chat.".to_string(),
        }
    }

    async fn cmd_afk(&self, args: &str) -> String {
        let reason = if args.is_empty() { "AFK" } else { args };
        match self
            .store
            .set_afk(AfkState {
                enabled: true,
                reason: reason.to_string(),
            })
            .await
        {
            Ok(()) => "AFK enabled.".to_string(),
            Err(e) => format!("Error: {e}"),
        }
    }

    async fn cmd_unafk(&self) -> String {
        match self.store.set_afk(AfkState::default()).await {
            Ok(()) => "AFK disabled.".to_string(),
            Err(e) => format!("Error: {e}"),
        }
    }

    async fn cmd_ar_add(&self, args: &str) -> String {
        let Some((name, response)) = args.split_once(char::is_whitespace) else {
            return "Usage: /ar_add <name> <response>".to_string();
        };

        match self.store.set_responder(name, response.trim()).await {
            Ok(()) => format!("Auto responder '{name}' added."),
            Err(e) => format!("Error: {e}"),
        }
    }

    async fn cmd_ar_remove(&self, args: &str) -> String {
        if args.is_empty() {
            return "Usage: /ar_remove <name>".to_string();
        }

        match self.store.remove_responder(args).await {
            Ok(true) => format!("Auto responder '{args}' removed."),
            Ok(false) => format!("Auto responder '{args}' not found."),
            Err(e) => format!("Error: {e}"),
        }
    }

    async fn cmd_ar_list(&self) -> String {
        let responders = self.store.responders().await;
        if responders.is_empty() {
            return "No auto responders configured.".to_string();
        }

        let mut out = String::from("Auto responders:\n");
        for (name, response) in responders {
            out.push_str(&format!("  {name}: {response}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    use crate::platform::Messenger;
    use crate::rotation::{EmojiRef, SourceProvider};

    struct FakeMessenger {
        sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl Messenger for FakeMessenger {
        async fn resolve_chat(&self, chat_id: i64) -> bool {
            chat_id > 0
        }

        async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
            self.sent.lock().await.push((chat_id, text.to_string()));
            Ok(())
        }

        async fn set_presence(&self, _text: &str, _emoji: &EmojiRef) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct EmptySources;

    impl SourceProvider for EmptySources {
        fn statuses(&self) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn emojis(&self) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn make_handler(dir: &TempDir) -> CommandHandler {
        let store = StateStore::open(&dir.path().join("state.json")).unwrap();
        let messenger: Arc<dyn Messenger> = Arc::new(FakeMessenger {
            sent: Mutex::new(Vec::new()),
        });
        let auto = Arc::new(AutoMessageService::new(
            store.clone(),
            Arc::clone(&messenger),
        ));
        let rotator = Arc::new(StatusRotator::new(
            store.clone(),
            messenger,
            Arc::new(EmptySources),
            Duration::from_millis(10),
        ));
        CommandHandler::new(auto, rotator, SnipeCache::new(), store, Notifier::new(None))
    }

    fn incoming(text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: 10,
            user_id: 1,
            user_name: "alice".to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn non_commands_and_unknown_commands_get_no_reply() {
        let tmp = TempDir::new().unwrap();
        let handler = make_handler(&tmp);

        assert_eq!(handler.handle(&incoming("hello there")).await, None);
        assert_eq!(handler.handle(&incoming("/definitely_not_real")).await, None);
    }

    #[tokio::test]
    async fn schedule_requires_three_arguments() {
        let tmp = TempDir::new().unwrap();
        let handler = make_handler(&tmp);

        let reply = handler.handle(&incoming("/schedule 60")).await.unwrap();
        assert!(reply.starts_with("Usage:"));
    }

    #[tokio::test]
    async fn schedule_and_list_round_trip() {
        let tmp = TempDir::new().unwrap();
        let handler = make_handler(&tmp);

        let reply = handler
            .handle(&incoming("/schedule 60 10 good morning"))
            .await
            .unwrap();
        assert!(reply.contains("every 60 seconds"));

        let listing = handler.handle(&incoming("/schedules")).await.unwrap();
        assert!(listing.contains("10: every 60s, good morning"));
    }

    #[tokio::test]
    async fn duplicate_schedule_reports_already_scheduled() {
        let tmp = TempDir::new().unwrap();
        let handler = make_handler(&tmp);

        handler
            .handle(&incoming("/schedule 60 10 hello"))
            .await
            .unwrap();
        let reply = handler
            .handle(&incoming("/schedule 30 10 again"))
            .await
            .unwrap();
        assert!(reply.contains("already scheduled"));
    }

    #[tokio::test]
    async fn unschedule_absent_chat_is_a_benign_message() {
        let tmp = TempDir::new().unwrap();
        let handler = make_handler(&tmp);

        let reply = handler.handle(&incoming("/unschedule 10")).await.unwrap();
        assert_eq!(reply, "No auto message is scheduled for that chat.");
    }

    #[tokio::test]
    async fn snipe_on_empty_buffer_is_a_benign_message() {
        let tmp = TempDir::new().unwrap();
        let handler = make_handler(&tmp);

        let reply = handler.handle(&incoming("/snipe")).await.unwrap();
        assert_eq!(reply, "No messages to snipe in this chat.");
    }

    #[tokio::test]
    async fn afk_enables_the_passive_reply_on_mention() {
        let tmp = TempDir::new().unwrap();
        let handler = make_handler(&tmp);

        handler.handle(&incoming("/afk lunch break")).await.unwrap();

        let reply = handler
            .passive_reply(&incoming("hey @herald_bot"), true)
            .await
            .unwrap();
        assert!(reply.contains("lunch break"));

        // Without a mention there is no AFK reply.
        assert_eq!(handler.passive_reply(&incoming("hey"), false).await, None);

        handler.handle(&incoming("/unafk")).await.unwrap();
        assert_eq!(
            handler.passive_reply(&incoming("hey @herald_bot"), true).await,
            None
        );
    }

    #[tokio::test]
    async fn auto_responder_matches_exact_text() {
        let tmp = TempDir::new().unwrap();
        let handler = make_handler(&tmp);

        handler.handle(&incoming("/ar_add ping pong")).await.unwrap();

        assert_eq!(
            handler.passive_reply(&incoming("ping"), false).await,
            Some("pong".to_string())
        );
        assert_eq!(handler.passive_reply(&incoming("ping!"), false).await, None);
    }
}
