// src/admin.rs
//! Admin command channel: `/add`, `/remove`, `/list` over Telegram updates.
//!
//! Each update is consumed exactly once: the offset (`update_id + 1`) is
//! persisted right after the update is handled, whether or not it carried a
//! command and whether or not the sender was allowed.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::error::StoreError;
use crate::registry::{Source, SourceRegistry};
use crate::store::OffsetStore;
use crate::telegram::{BotClient, Update};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Add(String),
    Remove(String),
    List,
}

/// Parse `/cmd[@BotName] [arg]`. Non-commands and unknown commands are `None`.
pub fn parse_command(text: &str) -> Option<AdminCommand> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let (head, arg) = match rest.split_once(char::is_whitespace) {
        Some((h, a)) => (h, a.trim()),
        None => (rest, ""),
    };
    let name = head.split('@').next().unwrap_or_default().to_ascii_lowercase();
    match name.as_str() {
        "add" => Some(AdminCommand::Add(arg.to_string())),
        "remove" => Some(AdminCommand::Remove(arg.to_string())),
        "list" => Some(AdminCommand::List),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub update_id: i64,
    pub chat_id: i64,
    pub sender_id: Option<i64>,
    pub text: String,
}

impl InboundMessage {
    pub fn from_update(update: &Update) -> Option<Self> {
        let msg = update.any_message()?;
        let text = msg.text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            update_id: update.update_id,
            chat_id: msg.chat.id,
            sender_id: msg.from.as_ref().map(|u| u.id),
            text: text.to_string(),
        })
    }
}

/// A reply to deliver after the update has been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: i64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub updates: usize,
    pub commands: usize,
    pub ignored: usize,
}

pub struct AdminChannel {
    registry: Arc<dyn SourceRegistry>,
    allow_ids: Vec<i64>,
}

impl AdminChannel {
    pub fn new(registry: Arc<dyn SourceRegistry>, allow_ids: Vec<i64>) -> Self {
        Self {
            registry,
            allow_ids,
        }
    }

    /// An empty allow-list admits everyone.
    pub fn is_allowed(&self, sender: Option<i64>) -> bool {
        self.allow_ids.is_empty() || sender.is_some_and(|id| self.allow_ids.contains(&id))
    }

    /// Run one message against the registry. `None` means nothing to say.
    pub async fn handle(&self, msg: &InboundMessage) -> Result<Option<String>, StoreError> {
        if !self.is_allowed(msg.sender_id) {
            tracing::debug!(target: "admin", sender = ?msg.sender_id, "ignoring message from sender outside allow-list");
            return Ok(None);
        }
        let Some(cmd) = parse_command(&msg.text) else {
            return Ok(None);
        };
        tracing::info!(target: "admin", command = ?cmd, sender = ?msg.sender_id, "admin command");

        let reply = match cmd {
            AdminCommand::Add(arg) if arg.is_empty() => "usage: /add <channel or t.me link>".to_string(),
            AdminCommand::Remove(arg) if arg.is_empty() => "usage: /remove <channel or t.me link>".to_string(),
            AdminCommand::Add(arg) => match Source::parse(&arg) {
                None => format!("invalid channel name: {arg}"),
                Some(src) => {
                    if self.registry.add(&arg).await? {
                        format!("added @{src}")
                    } else {
                        format!("already tracking @{src}")
                    }
                }
            },
            AdminCommand::Remove(arg) => match Source::parse(&arg) {
                None => format!("invalid channel name: {arg}"),
                Some(src) => {
                    if self.registry.remove(&arg).await? {
                        format!("removed @{src}")
                    } else {
                        format!("not tracking @{src}")
                    }
                }
            },
            AdminCommand::List => {
                let sources = self.registry.list().await?;
                if sources.is_empty() {
                    "no sources configured".to_string()
                } else {
                    sources
                        .iter()
                        .map(|s| format!("@{s}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
        };
        Ok(Some(reply))
    }

    /// Handle `updates` in id order, persisting the offset after each one.
    /// Returns the replies to send; a registry failure is answered, not retried.
    pub async fn apply_updates(
        &self,
        mut updates: Vec<Update>,
        offsets: &dyn OffsetStore,
    ) -> Result<(PollReport, Vec<Reply>), StoreError> {
        updates.sort_by_key(|u| u.update_id);
        let mut report = PollReport::default();
        let mut replies = Vec::new();

        for update in &updates {
            report.updates += 1;
            if let Some(msg) = InboundMessage::from_update(update) {
                match self.handle(&msg).await {
                    Ok(Some(text)) => {
                        report.commands += 1;
                        replies.push(Reply {
                            chat_id: msg.chat_id,
                            text,
                        });
                    }
                    Ok(None) => report.ignored += 1,
                    Err(e) => {
                        tracing::error!(target: "admin", update_id = update.update_id, error = %e, "registry update failed");
                        report.commands += 1;
                        replies.push(Reply {
                            chat_id: msg.chat_id,
                            text: format!("failed: {e}"),
                        });
                    }
                }
            } else {
                report.ignored += 1;
            }
            offsets.set_offset(update.update_id + 1).await?;
        }
        Ok((report, replies))
    }

    /// Fetch pending updates once, apply them, then send replies best-effort.
    pub async fn poll_once(
        &self,
        bot: &BotClient,
        offsets: &dyn OffsetStore,
        timeout_secs: u64,
    ) -> Result<PollReport> {
        let offset = offsets.get_offset().await.context("reading admin offset")?;
        let updates = bot
            .get_updates(offset, timeout_secs)
            .await
            .context("telegram getUpdates")?;
        if updates.is_empty() {
            return Ok(PollReport::default());
        }

        let (report, replies) = self
            .apply_updates(updates, offsets)
            .await
            .context("persisting admin offset")?;

        for reply in replies {
            if let Err(e) = bot.send_chunked(&reply.chat_id.to_string(), &reply.text).await {
                tracing::warn!(target: "admin", chat_id = reply.chat_id, error = %e, "admin reply failed");
            }
        }
        tracing::info!(target: "admin", updates = report.updates, commands = report.commands, "admin channel polled");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_bot_suffix() {
        assert_eq!(parse_command("/list"), Some(AdminCommand::List));
        assert_eq!(parse_command("/list@SyncBot"), Some(AdminCommand::List));
        assert_eq!(
            parse_command("  /add@SyncBot   @abks07 "),
            Some(AdminCommand::Add("@abks07".into()))
        );
        assert_eq!(
            parse_command("/REMOVE https://t.me/abks07"),
            Some(AdminCommand::Remove("https://t.me/abks07".into()))
        );
        assert_eq!(parse_command("/add"), Some(AdminCommand::Add(String::new())));
    }

    #[test]
    fn ignores_non_commands() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/start"), None);
        assert_eq!(parse_command(""), None);
    }
}
