use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tokio::sync::Mutex;
use tracing::warn;

/// Holds the bot handle so that code running outside the dispatcher (the
/// Stripe webhook handler, the CLI) can message users and the operator
/// group.
pub struct BotManager {
    current_bot: Arc<Mutex<Option<Bot>>>,
    admin_group_id: i64,
}

impl BotManager {
    pub fn new(admin_group_id: i64) -> Self {
        Self {
            current_bot: Arc::new(Mutex::new(None)),
            admin_group_id,
        }
    }

    pub async fn set_bot(&self, bot: Bot) {
        let mut bot_lock = self.current_bot.lock().await;
        *bot_lock = Some(bot);
    }

    pub async fn send_notification(
        &self,
        chat_id: i64,
        text: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let bot_lock = self.current_bot.lock().await;
        if let Some(bot) = bot_lock.as_ref() {
            bot.send_message(ChatId(chat_id), text)
                .parse_mode(ParseMode::Html)
                .await?;
            Ok(())
        } else {
            warn!("Cannot send notification: bot is not running");
            Ok(())
        }
    }

    /// Best-effort note into the operator group's general chat.
    pub async fn notify_admins(&self, text: &str) {
        if let Err(e) = self.send_notification(self.admin_group_id, text).await {
            warn!("Failed to notify admin group: {}", e);
        }
    }
}
