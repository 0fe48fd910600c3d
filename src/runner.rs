// src/runner.rs
//! One sync pass: poll the admin channel, list sources, then fetch → diff →
//! commit each source in turn. A failing source never stops the others.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};

use crate::admin::AdminChannel;
use crate::commit::{CommitCoordinator, CommitReport};
use crate::config::{AppConfig, SyncConfig};
use crate::engine::{diff, Cursor, SyncMode};
use crate::error::SyncError;
use crate::ingest::AdapterChain;
use crate::notify::{Notifier, TelegramNotifier};
use crate::registry::{FileRegistry, Source, SourceRegistry};
use crate::store::{recent_window, CursorStore, LocalStore, OffsetStore, RecordStore};
use crate::telegram::BotClient;
use crate::telemetry::ensure_metrics_described;

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: Source,
    pub fetched: usize,
    pub adapter: Option<String>,
    pub used_fallback: bool,
    pub mode: Option<SyncMode>,
    pub commit: CommitReport,
    pub error: Option<String>,
}

impl SourceReport {
    fn empty(source: &Source) -> Self {
        Self {
            source: source.clone(),
            fetched: 0,
            adapter: None,
            used_fallback: false,
            mode: None,
            commit: CommitReport::default(),
            error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
}

impl RunSummary {
    pub fn written(&self) -> usize {
        self.sources.iter().map(|s| s.commit.written).sum()
    }

    pub fn failed(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }
}

/// Per-source fetch → diff → commit.
pub struct Synchronizer {
    chain: AdapterChain,
    records: Arc<dyn RecordStore>,
    cursors: Arc<dyn CursorStore>,
    committer: CommitCoordinator,
    recent_window: usize,
    bootstrap_limit: usize,
}

impl Synchronizer {
    pub fn new(
        chain: AdapterChain,
        records: Arc<dyn RecordStore>,
        cursors: Arc<dyn CursorStore>,
        notifier: Option<Arc<dyn Notifier>>,
        cfg: &SyncConfig,
    ) -> Self {
        let mut committer = CommitCoordinator::new(records.clone(), cursors.clone())
            .with_limits(cfg.title_limit, cfg.body_limit);
        if let Some(n) = notifier {
            committer = committer.with_notifier(n);
        }
        Self {
            chain,
            records,
            cursors,
            committer,
            recent_window: cfg.recent_window.max(1),
            bootstrap_limit: cfg.bootstrap_limit.max(1),
        }
    }

    pub async fn sync_source(&self, source: &Source) -> Result<SourceReport, SyncError> {
        let mut report = SourceReport::empty(source);

        let outcome = self.chain.fetch(source).await;
        report.fetched = outcome.items.len();
        report.adapter = outcome.adapter;
        report.used_fallback = outcome.used_fallback;
        if outcome.items.is_empty() {
            tracing::info!(target: "sync", source = %source, endpoint_errors = outcome.endpoint_errors, "no items fetched");
            return Ok(report);
        }

        let tail = self.records.read_tail(source, self.recent_window).await?;
        let window = recent_window(&tail);
        let cursor = self.cursors.get(source).await?.map(Cursor::new);

        let plan = diff(&outcome.items, cursor.as_ref(), &window, self.bootstrap_limit);
        report.mode = Some(plan.mode);

        if plan.skipped_duplicates > 0 {
            counter!("sync_duplicates_skipped_total").increment(plan.skipped_duplicates as u64);
        }
        match plan.mode {
            SyncMode::Gap => {
                counter!("sync_cursor_gaps_total").increment(1);
                tracing::warn!(
                    target: "sync",
                    source = %source,
                    cursor = ?cursor.as_ref().map(|c| c.last_key.as_str()),
                    taking = plan.new_items.len(),
                    "cursor not in fetched window, possible gap"
                );
            }
            SyncMode::Bootstrap if plan.dropped_by_bootstrap > 0 => {
                tracing::info!(target: "sync", source = %source, kept = plan.new_items.len(), dropped = plan.dropped_by_bootstrap, "first run, bootstrap cap applied");
            }
            _ => {}
        }

        report.commit = self.committer.commit_plan(source, &plan).await?;
        tracing::info!(
            target: "sync",
            source = %source,
            adapter = report.adapter.as_deref().unwrap_or("-"),
            fetched = report.fetched,
            written = report.commit.written,
            duplicates = plan.skipped_duplicates,
            "source synced"
        );
        Ok(report)
    }

    /// Sync every source sequentially. Errors are recorded per source.
    pub async fn run(&self, sources: &[Source]) -> RunSummary {
        ensure_metrics_described();
        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(sources.len());

        for source in sources {
            match self.sync_source(source).await {
                Ok(r) => reports.push(r),
                Err(e) => {
                    counter!("sync_sources_failed_total").increment(1);
                    tracing::error!(target: "sync", source = %source, error = %e, "source failed");
                    let mut r = SourceReport::empty(source);
                    r.error = Some(e.to_string());
                    reports.push(r);
                }
            }
        }

        let finished_at = Utc::now();
        counter!("sync_runs_total").increment(1);
        gauge!("sync_last_run_ts").set(finished_at.timestamp() as f64);

        let summary = RunSummary {
            started_at,
            finished_at,
            sources: reports,
        };
        tracing::info!(
            target: "sync",
            sources = summary.sources.len(),
            written = summary.written(),
            failed = summary.failed(),
            "sync pass finished"
        );
        summary
    }
}

/// Admin channel wired to its transport and offset store.
pub struct AdminPoller {
    pub channel: AdminChannel,
    pub bot: BotClient,
    pub offsets: Arc<dyn OffsetStore>,
    pub timeout_secs: u64,
}

impl AdminPoller {
    pub async fn poll(&self) -> anyhow::Result<crate::admin::PollReport> {
        self.channel
            .poll_once(&self.bot, self.offsets.as_ref(), self.timeout_secs)
            .await
    }
}

/// Everything a pass needs, built from configuration.
pub struct Pipeline {
    pub sync: Synchronizer,
    pub registry: Arc<dyn SourceRegistry>,
    pub admin: Option<AdminPoller>,
}

impl Pipeline {
    /// Open the local store and registry under `state_dir` and wire the
    /// adapters, notifier and admin channel described by `cfg`.
    pub async fn build(cfg: &AppConfig) -> Result<Self, SyncError> {
        let store = Arc::new(LocalStore::open(&cfg.state_dir, &cfg.sync.table).await?);
        let registry: Arc<dyn SourceRegistry> = Arc::new(FileRegistry::at_state_dir(
            &cfg.state_dir,
            cfg.static_sources(),
        ));
        let chain = AdapterChain::from_config(&cfg.feeds)
            .map_err(|e| SyncError::config(format!("building feed client: {e:#}")))?;

        let bot = BotClient::from_config(&cfg.telegram)
            .map(|b| b.with_timeout(cfg.feeds.timeout_secs));

        let notifier: Option<Arc<dyn Notifier>> = match &bot {
            Some(b) if !cfg.telegram.notify_chat_ids.is_empty() => {
                let n = TelegramNotifier::new(b.clone(), cfg.telegram.notify_chat_ids.clone());
                Some(Arc::new(n) as Arc<dyn Notifier>)
            }
            _ => None,
        };

        let admin = bot.map(|bot| AdminPoller {
            channel: AdminChannel::new(registry.clone(), cfg.telegram.admin_allow_ids.clone()),
            bot,
            offsets: store.clone(),
            timeout_secs: cfg.telegram.poll_timeout_secs,
        });

        let sync = Synchronizer::new(chain, store.clone(), store, notifier, &cfg.sync);
        Ok(Self {
            sync,
            registry,
            admin,
        })
    }

    /// Admin poll (best-effort), then one pass over the registry.
    pub async fn run_pass(&self) -> Result<RunSummary, SyncError> {
        if let Some(admin) = &self.admin {
            if let Err(e) = admin.poll().await {
                tracing::warn!(target: "admin", error = ?e, "admin poll failed");
            }
        }
        let sources = self.registry.list().await.map_err(SyncError::Registry)?;
        if sources.is_empty() {
            tracing::warn!(target: "sync", "no sources configured");
        }
        Ok(self.sync.run(&sources).await)
    }
}
