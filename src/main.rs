//! channel-sync CLI
//!
//! Runs sync passes over the configured Telegram channels, serves the admin
//! command channel, and edits the source registry from the shell.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use channel_sync::admin::AdminChannel;
use channel_sync::config::AppConfig;
use channel_sync::registry::{FileRegistry, SourceRegistry};
use channel_sync::store::LocalStore;
use channel_sync::telegram::BotClient;
use channel_sync::{telemetry, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "channel-sync", version, about = "Incremental Telegram channel sync")]
struct Cli {
    /// Config file (default: $CHANNEL_SYNC_CONFIG, then config/channel_sync.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync pass, or repeat it on an interval
    Run {
        /// Seconds between passes; omit for a single pass
        #[arg(long)]
        every: Option<u64>,
    },
    /// Poll the admin command channel until interrupted
    Admin,
    /// Inspect or edit the source registry
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },
}

#[derive(Subcommand, Debug)]
enum SourcesAction {
    List,
    Add { name: String },
    Remove { name: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "fatal");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Run { every } => {
            if let Some(listen) = cfg.metrics.listen.as_deref() {
                telemetry::install_prometheus(listen)?;
            }
            let pipeline = Pipeline::build(&cfg).await?;
            match every {
                None => {
                    pipeline.run_pass().await?;
                }
                Some(secs) => run_every(&pipeline, secs.max(1)).await?,
            }
        }
        Command::Admin => serve_admin(&cfg).await?,
        Command::Sources { action } => {
            let registry = FileRegistry::at_state_dir(&cfg.state_dir, cfg.static_sources());
            match action {
                SourcesAction::List => {
                    for s in registry.list().await? {
                        println!("{s}");
                    }
                }
                SourcesAction::Add { name } => {
                    let added = registry.add(&name).await?;
                    println!("{}", if added { "added" } else { "unchanged" });
                }
                SourcesAction::Remove { name } => {
                    let removed = registry.remove(&name).await?;
                    println!("{}", if removed { "removed" } else { "unchanged" });
                }
            }
        }
    }
    Ok(())
}

/// Repeat passes until Ctrl-C; a pass in progress is finished first.
async fn run_every(pipeline: &Pipeline, secs: u64) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, stopping");
                return Ok(());
            }
        }
        pipeline.run_pass().await?;
    }
}

async fn serve_admin(cfg: &AppConfig) -> Result<()> {
    let bot = BotClient::from_config(&cfg.telegram)
        .context("admin channel needs TELEGRAM_BOT_TOKEN")?
        .with_timeout(cfg.feeds.timeout_secs);
    let store = Arc::new(LocalStore::open(&cfg.state_dir, &cfg.sync.table).await?);
    let registry = Arc::new(FileRegistry::at_state_dir(&cfg.state_dir, cfg.static_sources()));
    let channel = AdminChannel::new(registry, cfg.telegram.admin_allow_ids.clone());
    // long-poll so an idle loop does not spin
    let timeout = cfg.telegram.poll_timeout_secs.max(25);

    loop {
        tokio::select! {
            res = channel.poll_once(&bot, store.as_ref(), timeout) => {
                if let Err(e) = res {
                    tracing::warn!(target: "admin", error = ?e, "admin poll failed");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, stopping");
                return Ok(());
            }
        }
    }
}
