// src/telemetry.rs
//! Logging and metrics setup for the binary.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Used when `RUST_LOG` is unset. Log targets are listed explicitly because
/// they are not crate paths.
pub const DEFAULT_LOG_FILTER: &str =
    "warn,channel_sync=info,sync=info,ingest=info,admin=info,notify=info,store=info";

/// Install the global subscriber. `LOG_FORMAT=json` selects JSON lines.
/// A second call is a no-op.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.trim().eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_runs_total", "Completed sync passes.");
        describe_counter!(
            "sync_sources_failed_total",
            "Sources whose pass ended in an error."
        );
        describe_counter!(
            "sync_records_committed_total",
            "Records appended to the store."
        );
        describe_counter!(
            "sync_duplicates_skipped_total",
            "Fetched items skipped because their key was already seen."
        );
        describe_counter!(
            "sync_cursor_gaps_total",
            "Passes where the cursor was not in the fetched window."
        );
        describe_counter!(
            "ingest_endpoint_errors_total",
            "Feed or page fetch/parse errors."
        );
        describe_counter!(
            "ingest_fallback_total",
            "Times the page scrape fallback was tried."
        );
        describe_counter!("notify_failures_total", "Failed record notifications.");
        describe_gauge!("sync_last_run_ts", "Unix ts when the last sync pass ended.");
    });
}

/// Serve Prometheus text format on `listen` (e.g. `0.0.0.0:9000`).
/// Must be called from within a Tokio runtime.
pub fn install_prometheus(listen: &str) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid metrics listen address {listen:?}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("installing prometheus exporter")?;
    ensure_metrics_described();
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}
