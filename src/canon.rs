// src/canon.rs
//! Link canonicalization: raw item identifiers to stable dedup keys.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Host every recognised post link is rewritten to.
pub const POST_HOST: &str = "t.me";

/// `[scheme://][www.]t.me|telegram.me/[s/]<channel>/<id>[/|?|#...]`
const POST_PATTERN: &str = r"(?i)^(?:https?://)?(?:www\.)?(?:t\.me|telegram\.me)/(?:s/)?([a-z0-9_]+)/(\d+)(?:[/?#].*)?$";

/// Normalized, comparable identity of a single item.
///
/// An empty key means "no stable identity": it never matches a cursor and is
/// never treated as a duplicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn post_regex() -> &'static Regex {
    static RE_POST: OnceCell<Regex> = OnceCell::new();
    RE_POST.get_or_init(|| Regex::new(POST_PATTERN).expect("post link regex"))
}

/// Map a raw link (or composite fallback string) to its [`CanonicalKey`].
///
/// Post links collapse to `https://t.me/<channel>/<id>`; anything else loses
/// its query string, fragment and trailing slashes and is lower-cased.
pub fn canonicalize(raw_link: &str) -> CanonicalKey {
    let raw = raw_link.trim();
    if raw.is_empty() {
        return CanonicalKey::default();
    }

    if let Some(key) = post_key(raw) {
        return key;
    }

    let without_query = raw.split(['?', '#']).next().unwrap_or_default();
    let cleaned = without_query
        .trim_end_matches(|c: char| c == '/' || c.is_whitespace())
        .to_lowercase();
    // stripping can expose a post link ("t.me/x/1 /")
    post_key(&cleaned).unwrap_or(CanonicalKey(cleaned))
}

fn post_key(raw: &str) -> Option<CanonicalKey> {
    let caps = post_regex().captures(raw)?;
    let channel = caps[1].to_ascii_lowercase();
    let id = &caps[2];
    Some(CanonicalKey(format!("https://{POST_HOST}/{channel}/{id}")))
}

/// Fallback identity for items without a link: `title|published_at`,
/// lower-cased. Empty when the title is blank.
pub fn composite_key(title: &str, published_at: &DateTime<Utc>) -> CanonicalKey {
    let title = title.trim();
    if title.is_empty() {
        return CanonicalKey::default();
    }
    CanonicalKey(format!("{}|{}", title, published_at.to_rfc3339()).to_lowercase())
}
