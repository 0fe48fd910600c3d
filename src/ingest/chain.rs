// src/ingest/chain.rs
//! Ordered fallback over source adapters.

use std::time::Duration;

use anyhow::Result;
use metrics::counter;

use crate::config::FeedsConfig;
use crate::ingest::providers::{rss::RssFeedAdapter, scrape::TelegramPageScraper};
use crate::ingest::types::{RawItem, SourceAdapter};
use crate::registry::Source;

/// What a chain fetch produced and where it came from.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub items: Vec<RawItem>,
    /// Name of the adapter that produced `items`; `None` when nothing did.
    pub adapter: Option<String>,
    pub used_fallback: bool,
    pub endpoint_errors: usize,
}

/// Structured feeds in priority order, then an optional page scrape.
pub struct AdapterChain {
    feeds: Vec<Box<dyn SourceAdapter>>,
    fallback: Option<Box<dyn SourceAdapter>>,
}

impl AdapterChain {
    pub fn new(feeds: Vec<Box<dyn SourceAdapter>>, fallback: Option<Box<dyn SourceAdapter>>) -> Self {
        Self { feeds, fallback }
    }

    /// Build the HTTP-backed chain described by `cfg`.
    pub fn from_config(cfg: &FeedsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&cfg.user_agent)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        let feeds: Vec<Box<dyn SourceAdapter>> = cfg
            .bases
            .iter()
            .map(|base| {
                Box::new(RssFeedAdapter::new(base, &cfg.route, client.clone())) as Box<dyn SourceAdapter>
            })
            .collect();

        let fallback: Option<Box<dyn SourceAdapter>> = if cfg.scrape_fallback {
            Some(Box::new(TelegramPageScraper::new(
                &cfg.page_base,
                cfg.page_max_items,
                client,
            )))
        } else {
            None
        };

        Ok(Self::new(feeds, fallback))
    }

    /// Fetch newest-first items for `source`. Never fails: an exhausted chain
    /// is an empty outcome.
    pub async fn fetch(&self, source: &Source) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();

        for adapter in &self.feeds {
            match adapter.fetch_latest(source).await {
                Ok(items) if !items.is_empty() => {
                    outcome.items = items;
                    outcome.adapter = Some(adapter.name().to_string());
                    return outcome;
                }
                Ok(_) => {
                    tracing::debug!(target: "ingest", source = %source, adapter = adapter.name(), "feed returned no items");
                }
                Err(e) => {
                    outcome.endpoint_errors += 1;
                    counter!("ingest_endpoint_errors_total").increment(1);
                    tracing::warn!(target: "ingest", source = %source, adapter = adapter.name(), error = ?e, "feed endpoint failed");
                }
            }
        }

        let Some(fallback) = &self.fallback else {
            return outcome;
        };

        counter!("ingest_fallback_total").increment(1);
        outcome.used_fallback = true;
        match fallback.fetch_latest(source).await {
            Ok(items) if !items.is_empty() => {
                tracing::info!(target: "ingest", source = %source, count = items.len(), "using page scrape fallback");
                outcome.items = items;
                outcome.adapter = Some(fallback.name().to_string());
            }
            Ok(_) => {
                tracing::debug!(target: "ingest", source = %source, "page scrape returned no items");
            }
            Err(e) => {
                outcome.endpoint_errors += 1;
                counter!("ingest_endpoint_errors_total").increment(1);
                tracing::warn!(target: "ingest", source = %source, error = ?e, "page scrape failed");
            }
        }
        outcome
    }
}
