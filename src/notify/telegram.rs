use anyhow::{anyhow, Result};

use super::{render, Notifier};
use crate::store::CommittedRecord;
use crate::telegram::BotClient;

/// Fans each record out to every configured chat.
pub struct TelegramNotifier {
    bot: BotClient,
    chat_ids: Vec<String>,
}

impl TelegramNotifier {
    pub fn new(bot: BotClient, chat_ids: Vec<String>) -> Self {
        Self { bot, chat_ids }
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, record: &CommittedRecord) -> Result<()> {
        if self.chat_ids.is_empty() {
            tracing::debug!(target: "notify", "telegram disabled (no chat ids)");
            return Ok(());
        }

        let text = render(record);
        let mut failed = Vec::new();
        // one failing chat must not starve the others
        for chat in &self.chat_ids {
            if let Err(e) = self.bot.send_chunked(chat, &text).await {
                tracing::warn!(target: "notify", chat_id = %chat, error = %e, "telegram send failed");
                failed.push(chat.as_str());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(
                "telegram delivery failed for {} of {} chats: {}",
                failed.len(),
                self.chat_ids.len(),
                failed.join(", ")
            ))
        }
    }
}
