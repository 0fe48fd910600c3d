// src/telegram.rs
//! Minimal Telegram Bot API client: `sendMessage` (chunked, one 429 retry)
//! and `getUpdates` with an explicit offset.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::{TelegramConfig, TELEGRAM_MESSAGE_LIMIT};

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram api error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("telegram rate limit, retry after {0}s")]
    RateLimited(u64),
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub channel_post: Option<Message>,
}

impl Update {
    pub fn any_message(&self) -> Option<&Message> {
        self.message.as_ref().or(self.channel_post.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone)]
pub struct BotClient {
    api_base: String,
    token: String,
    client: Client,
    timeout: Duration,
    chunk_limit: usize,
    chunk_delay: Duration,
    max_retry_after: Duration,
}

impl BotClient {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            token: token.into(),
            client: Client::new(),
            timeout: Duration::from_secs(15),
            chunk_limit: TELEGRAM_MESSAGE_LIMIT,
            chunk_delay: Duration::from_millis(1_000),
            max_retry_after: Duration::from_secs(30),
        }
    }

    /// `None` when no token is configured.
    pub fn from_config(cfg: &TelegramConfig) -> Option<Self> {
        let token = cfg.bot_token.as_deref()?.trim();
        if token.is_empty() {
            return None;
        }
        Some(
            Self::new(cfg.api_base.clone(), token)
                .with_chunking(cfg.chunk_limit, cfg.chunk_delay_ms)
                .with_max_retry_after(cfg.max_retry_after_secs),
        )
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_chunking(mut self, limit: usize, delay_ms: u64) -> Self {
        self.chunk_limit = limit.clamp(1, TELEGRAM_MESSAGE_LIMIT);
        self.chunk_delay = Duration::from_millis(delay_ms);
        self
    }

    pub fn with_max_retry_after(mut self, secs: u64) -> Self {
        self.max_retry_after = Duration::from_secs(secs);
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base.trim_end_matches('/'),
            self.token,
            method
        )
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T, TelegramError> {
        let rsp = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        let status = rsp.status();
        let parsed: ApiResponse<T> = rsp.json().await?;

        if parsed.ok {
            return parsed.result.ok_or_else(|| TelegramError::Api {
                code: i64::from(status.as_u16()),
                description: "response without result".to_string(),
            });
        }
        if let Some(secs) = parsed.parameters.and_then(|p| p.retry_after) {
            return Err(TelegramError::RateLimited(secs));
        }
        Err(TelegramError::Api {
            code: parsed
                .error_code
                .unwrap_or_else(|| i64::from(status.as_u16())),
            description: parsed.description.unwrap_or_default(),
        })
    }

    /// One message, at most `TELEGRAM_MESSAGE_LIMIT` characters.
    /// A rate-limit response is waited out (capped) and retried once.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TelegramError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self
                .call::<serde_json::Value>("sendMessage", &body, self.timeout)
                .await
            {
                Ok(_) => return Ok(()),
                Err(TelegramError::RateLimited(secs)) if attempt == 1 => {
                    let wait = Duration::from_secs(secs).min(self.max_retry_after);
                    tracing::warn!(target: "notify", chat_id, wait_secs = wait.as_secs(), "telegram rate limited, retrying once");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Split `text` into sink-sized chunks and send them in order.
    /// Returns the number of chunks delivered.
    pub async fn send_chunked(&self, chat_id: &str, text: &str) -> Result<usize, TelegramError> {
        let chunks: Vec<String> = chunk_text(text, self.chunk_limit)
            .into_iter()
            .filter(|c| !c.trim().is_empty())
            .collect();
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            self.send_message(chat_id, chunk).await?;
        }
        Ok(chunks.len())
    }

    /// Updates with `update_id >= offset`. `timeout_secs` > 0 long-polls.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let mut body = serde_json::json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "channel_post"],
        });
        if let Some(off) = offset {
            body["offset"] = serde_json::json!(off);
        }
        let http_timeout = self.timeout + Duration::from_secs(timeout_secs);
        self.call("getUpdates", &body, http_timeout).await
    }
}

/// Split into pieces of at most `limit` characters, cutting at the last
/// newline inside each window when there is one. The newline at a cut is
/// dropped.
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let Some((cut, _)) = rest.char_indices().nth(limit) else {
            chunks.push(rest.to_string());
            break;
        };
        let window = &rest[..cut];
        let (head, tail) = match window.rfind('\n') {
            Some(nl) if nl > 0 => (&rest[..nl], &rest[nl + 1..]),
            _ => (window, &rest[cut..]),
        };
        chunks.push(head.to_string());
        rest = tail;
    }
    chunks
}
