// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::ingest::dates::resolve_published;
use crate::ingest::types::{RawItem, SourceAdapter};
use crate::registry::Source;

/// Default RSSHub route for a public Telegram channel.
pub const DEFAULT_ROUTE: &str = "/telegram/channel/{source}";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

// <guid isPermaLink="false">...</guid>
#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text", default)]
    value: Option<String>,
}

/// Structured feed endpoint: one RSSHub-compatible base URL.
pub struct RssFeedAdapter {
    base: String,
    route: String,
    client: reqwest::Client,
}

impl RssFeedAdapter {
    pub fn new(base: &str, route: &str, client: reqwest::Client) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            route: route.to_string(),
            client,
        }
    }

    pub fn feed_url(&self, source: &Source) -> String {
        format!("{}{}", self.base, self.route.replace("{source}", source.as_str()))
    }
}

#[async_trait]
impl SourceAdapter for RssFeedAdapter {
    async fn fetch_latest(&self, source: &Source) -> Result<Vec<RawItem>> {
        let url = self.feed_url(source);
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("rss http get {url}"))?
            .error_for_status()
            .with_context(|| format!("rss non-2xx {url}"))?
            .text()
            .await
            .context("rss http .text()")?;
        parse_feed(&body, Utc::now())
    }

    fn name(&self) -> &str {
        &self.base
    }
}

/// Parse an RSS 2.0 document into raw items, keeping feed order (newest-first).
pub fn parse_feed(xml: &str, now: DateTime<Utc>) -> Result<Vec<RawItem>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let identifier = it
            .link
            .filter(|l| !l.trim().is_empty())
            .or_else(|| it.guid.and_then(|g| g.value))
            .unwrap_or_default()
            .trim()
            .to_string();

        out.push(RawItem {
            identifier,
            published_at: resolve_published(it.pub_date.as_deref(), now),
            title: it.title.unwrap_or_default(),
            body: it.description.unwrap_or_default(),
        });
    }
    Ok(out)
}

// HTML entities that are not defined in XML and make the parser bail.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", "&#160;")
        .replace("&ndash;", "&#8211;")
        .replace("&mdash;", "&#8212;")
        .replace("&laquo;", "&#171;")
        .replace("&raquo;", "&#187;")
        .replace("&ldquo;", "&#8220;")
        .replace("&rdquo;", "&#8221;")
        .replace("&lsquo;", "&#8216;")
        .replace("&rsquo;", "&#8217;")
        .replace("&hellip;", "&#8230;")
}
