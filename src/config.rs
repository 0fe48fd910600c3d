// src/config.rs
//! Runtime configuration: TOML file, then environment overrides, then sanitize.
//!
//! Lookup order for the file:
//! 1) explicit `--config` path
//! 2) `$CHANNEL_SYNC_CONFIG`
//! 3) `config/channel_sync.toml`
//! 4) built-in defaults

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ingest::providers::rss::DEFAULT_ROUTE;
use crate::ingest::providers::scrape::{DEFAULT_MAX_ITEMS, DEFAULT_PAGE_BASE};
use crate::registry::Source;

pub const ENV_CONFIG_PATH: &str = "CHANNEL_SYNC_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/channel_sync.toml";

/// Channels tracked when neither the config file nor `CHANNELS_CSV` names any.
pub const DEFAULT_SOURCES: [&str; 4] = ["MELOCHOV", "ABKS07", "jjsbossj", "toolsSADA"];

/// Telegram's hard limit for one message.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Static source list; seeds the registry when it has no file yet.
    /// Omitted means [`DEFAULT_SOURCES`]; an explicit empty list stays empty.
    pub sources: Vec<String>,
    pub state_dir: PathBuf,
    pub feeds: FeedsConfig,
    pub sync: SyncConfig,
    pub telegram: TelegramConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    /// RSSHub-compatible instances, highest priority first.
    pub bases: Vec<String>,
    /// Route appended to each base; `{source}` is substituted.
    pub route: String,
    pub scrape_fallback: bool,
    pub page_base: String,
    pub page_max_items: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Items taken on a source's first run.
    pub bootstrap_limit: usize,
    /// Committed rows read back per source to rebuild the duplicate window.
    pub recent_window: usize,
    pub title_limit: usize,
    pub body_limit: usize,
    /// Record table name (`<state_dir>/<table>.jsonl`).
    pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// "ENV" or empty means: read from TELEGRAM_BOT_TOKEN.
    pub bot_token: Option<String>,
    pub api_base: String,
    pub notify_chat_ids: Vec<String>,
    /// Empty = everyone may issue admin commands.
    pub admin_allow_ids: Vec<i64>,
    pub chunk_limit: usize,
    pub chunk_delay_ms: u64,
    pub max_retry_after_secs: u64,
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MetricsConfig {
    /// e.g. "0.0.0.0:9000"; unset = no exporter.
    pub listen: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
            state_dir: PathBuf::from("state"),
            feeds: FeedsConfig::default(),
            sync: SyncConfig::default(),
            telegram: TelegramConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            bases: vec!["https://rsshub.app".to_string()],
            route: DEFAULT_ROUTE.to_string(),
            scrape_fallback: true,
            page_base: DEFAULT_PAGE_BASE.to_string(),
            page_max_items: DEFAULT_MAX_ITEMS,
            timeout_secs: 15,
            user_agent: concat!("channel-sync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bootstrap_limit: 20,
            recent_window: 200,
            title_limit: 200,
            body_limit: 45_000,
            table: "posts".to_string(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: "https://api.telegram.org".to_string(),
            notify_chat_ids: Vec::new(),
            admin_allow_ids: Vec::new(),
            chunk_limit: TELEGRAM_MESSAGE_LIMIT,
            chunk_delay_ms: 1_000,
            max_retry_after_secs: 30,
            poll_timeout_secs: 0,
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("parsing config {}", path.display()))
    }

    /// File lookup only (no env overrides).
    pub fn load_file_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Self::load_from_file(&default_path);
        }
        Ok(Self::default())
    }

    /// Full load: file (explicit or default lookup), process env, sanitize.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = match explicit {
            Some(p) => Self::load_from_file(p)?,
            None => Self::load_file_default()?,
        };
        cfg.apply_overrides(|k| std::env::var(k).ok());
        cfg.sanitize();
        Ok(cfg)
    }

    /// Apply environment-style overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(csv) = lookup("CHANNELS_CSV").filter(|v| !v.trim().is_empty()) {
            self.sources = split_csv(&csv);
        }
        if let Some(bases) = lookup("RSS_BASE").filter(|v| !v.trim().is_empty()) {
            self.feeds.bases = split_csv(&bases);
        }
        if let Some(n) = lookup("INITIAL_LIMIT").and_then(|v| v.trim().parse().ok()) {
            self.sync.bootstrap_limit = n;
        }
        if let Some(n) = lookup("RECENT_WINDOW").and_then(|v| v.trim().parse().ok()) {
            self.sync.recent_window = n;
        }
        if let Some(dir) = lookup("STATE_DIR").filter(|v| !v.trim().is_empty()) {
            self.state_dir = PathBuf::from(dir.trim());
        }

        let token_from_env = lookup("TELEGRAM_BOT_TOKEN").filter(|v| !v.trim().is_empty());
        let wants_env = self
            .telegram
            .bot_token
            .as_deref()
            .map_or(true, |t| t.trim().is_empty() || t.trim().eq_ignore_ascii_case("env"));
        if let Some(token) = token_from_env {
            self.telegram.bot_token = Some(token);
        } else if wants_env {
            self.telegram.bot_token = None;
        }

        if let Some(ids) = lookup("NOTIFY_CHAT_IDS").filter(|v| !v.trim().is_empty()) {
            self.telegram.notify_chat_ids = split_csv(&ids);
        }
        if let Some(ids) = lookup("ADMIN_ALLOW_IDS").filter(|v| !v.trim().is_empty()) {
            self.telegram.admin_allow_ids = split_csv(&ids)
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();
        }
        if let Some(addr) = lookup("METRICS_LISTEN").filter(|v| !v.trim().is_empty()) {
            self.metrics.listen = Some(addr.trim().to_string());
        }
    }

    /// Clamp limits into usable ranges and tidy lists.
    pub fn sanitize(&mut self) {
        self.sources = dedup_trimmed(std::mem::take(&mut self.sources));
        self.feeds.bases = dedup_trimmed(std::mem::take(&mut self.feeds.bases));
        self.telegram.notify_chat_ids =
            dedup_trimmed(std::mem::take(&mut self.telegram.notify_chat_ids));
        self.telegram.admin_allow_ids.sort_unstable();
        self.telegram.admin_allow_ids.dedup();

        // a zero bootstrap limit would never create a cursor
        self.sync.bootstrap_limit = self.sync.bootstrap_limit.max(1);
        self.sync.recent_window = self.sync.recent_window.max(1);
        self.sync.title_limit = self.sync.title_limit.max(1);
        self.sync.body_limit = self.sync.body_limit.max(1);
        if self.sync.table.trim().is_empty() {
            self.sync.table = SyncConfig::default().table;
        }

        self.feeds.page_max_items = self.feeds.page_max_items.max(1);
        self.feeds.timeout_secs = self.feeds.timeout_secs.max(1);
        if !self.feeds.route.contains("{source}") {
            tracing::warn!(route = %self.feeds.route, "feed route has no {{source}} placeholder, using default");
            self.feeds.route = DEFAULT_ROUTE.to_string();
        }

        self.telegram.chunk_limit = self.telegram.chunk_limit.clamp(1, TELEGRAM_MESSAGE_LIMIT);
        if self
            .telegram
            .bot_token
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            self.telegram.bot_token = None;
        }
    }

    /// Valid entries of the static source list; invalid ones are logged and dropped.
    pub fn static_sources(&self) -> Vec<Source> {
        self.sources
            .iter()
            .filter_map(|raw| {
                let parsed = Source::parse(raw);
                if parsed.is_none() {
                    tracing::warn!(raw = %raw, "ignoring invalid source name in config");
                }
                parsed
            })
            .collect()
    }

    pub fn bot_token(&self) -> Option<&str> {
        self.telegram.bot_token.as_deref()
    }
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn dedup_trimmed(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}
