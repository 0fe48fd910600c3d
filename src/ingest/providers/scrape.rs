// src/ingest/providers/scrape.rs
//! Fallback adapter: scrape the public `t.me/s/<channel>` preview page.
//!
//! The page lists messages oldest-first; items are returned newest-first to
//! match the structured feeds.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};

use crate::ingest::dates::resolve_published;
use crate::ingest::types::{RawItem, SourceAdapter};
use crate::registry::Source;

pub const DEFAULT_PAGE_BASE: &str = "https://t.me/s";
pub const DEFAULT_MAX_ITEMS: usize = 100;

const MESSAGE_SELECTOR: &str = "div.tgme_widget_message[data-post]";
const TEXT_SELECTOR: &str = ".tgme_widget_message_text";
const TIME_SELECTOR: &str = ".tgme_widget_message_date time[datetime], time[datetime]";

pub struct TelegramPageScraper {
    base: String,
    max_items: usize,
    client: reqwest::Client,
}

impl TelegramPageScraper {
    pub fn new(base: &str, max_items: usize, client: reqwest::Client) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            max_items,
            client,
        }
    }

    pub fn page_url(&self, source: &Source) -> String {
        format!("{}/{}", self.base, source.as_str())
    }
}

#[async_trait]
impl SourceAdapter for TelegramPageScraper {
    async fn fetch_latest(&self, source: &Source) -> Result<Vec<RawItem>> {
        let url = self.page_url(source);
        let html = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("page http get {url}"))?
            .error_for_status()
            .with_context(|| format!("page non-2xx {url}"))?
            .text()
            .await
            .context("page http .text()")?;
        parse_page(&html, self.max_items, Utc::now())
    }

    fn name(&self) -> &str {
        &self.base
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector '{selector}': {e}"))
}

/// Extract at most `max_items` of the most recent messages, newest-first.
pub fn parse_page(html: &str, max_items: usize, now: DateTime<Utc>) -> Result<Vec<RawItem>> {
    let document = Html::parse_document(html);
    let message_sel = parse_selector(MESSAGE_SELECTOR)?;
    let text_sel = parse_selector(TEXT_SELECTOR)?;
    let time_sel = parse_selector(TIME_SELECTOR)?;

    let mut items: Vec<RawItem> = document
        .select(&message_sel)
        .filter_map(|msg| parse_message(&msg, &text_sel, &time_sel, now))
        .collect();

    items.reverse();
    items.truncate(max_items);
    Ok(items)
}

fn parse_message(
    msg: &ElementRef,
    text_sel: &Selector,
    time_sel: &Selector,
    now: DateTime<Utc>,
) -> Option<RawItem> {
    // data-post="channel/123"
    let post = msg.value().attr("data-post")?.trim();
    if post.is_empty() {
        return None;
    }

    let body = msg
        .select(text_sel)
        .next()
        .map(|el| el.inner_html())
        .unwrap_or_default();
    let datetime = msg
        .select(time_sel)
        .next()
        .and_then(|el| el.value().attr("datetime"));

    Some(RawItem {
        identifier: format!("https://t.me/{post}"),
        published_at: resolve_published(datetime, now),
        title: String::new(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(post: &str, text: &str, ts: &str) -> String {
        format!(
            r#"<div class="tgme_widget_message_wrap"><div class="tgme_widget_message" data-post="{post}">
                <div class="tgme_widget_message_text">{text}</div>
                <a class="tgme_widget_message_date" href="https://t.me/{post}"><time datetime="{ts}">10:00</time></a>
            </div></div>"#
        )
    }

    #[test]
    fn page_is_reversed_and_capped() {
        let html = format!(
            "<html><body>{}{}{}</body></html>",
            message("chan/1", "one", "2025-01-01T10:00:00+00:00"),
            message("chan/2", "two", "2025-01-02T10:00:00+00:00"),
            message("chan/3", "three", "2025-01-03T10:00:00+00:00"),
        );
        let items = parse_page(&html, 2, Utc::now()).unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.identifier.as_str()).collect();
        assert_eq!(ids, vec!["https://t.me/chan/3", "https://t.me/chan/2"]);
        assert_eq!(items[0].body, "three");
    }

    #[test]
    fn messages_without_post_attr_are_ignored() {
        let html = r#"<div class="tgme_widget_message">orphan</div>"#;
        assert!(parse_page(html, 10, Utc::now()).unwrap().is_empty());
    }
}
