// src/registry.rs
//! Source registry: the mutable list of channels to sync.
//!
//! Persists `{"sources": [...]}` at `<state_dir>/sources.json`. A missing file
//! means "use the configured static list"; the first edit materializes it.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{io_err, StoreError};
use crate::store::write_atomic;

/// One tracked channel. Construct through [`Source::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Source(String);

impl Source {
    /// Normalize a raw name (`@name`, `name`, `https://t.me/name`,
    /// `t.me/s/name`, `t.me/name/123`). `None` if nothing usable remains.
    pub fn parse(raw: &str) -> Option<Self> {
        normalize_source_name(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Telegram usernames are case-insensitive.
    pub fn same_as(&self, other: &Source) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn name_regex() -> &'static Regex {
    static RE_NAME: OnceCell<Regex> = OnceCell::new();
    RE_NAME.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]{1,64}$").expect("source name regex"))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

pub fn normalize_source_name(raw: &str) -> Option<String> {
    let mut s = raw.trim().trim_start_matches('@');
    for scheme in ["https://", "http://"] {
        if let Some(rest) = strip_prefix_ignore_case(s, scheme) {
            s = rest;
        }
    }
    if let Some(rest) = strip_prefix_ignore_case(s, "www.") {
        s = rest;
    }

    let host_rest = strip_prefix_ignore_case(s, "t.me/")
        .or_else(|| strip_prefix_ignore_case(s, "telegram.me/"));
    let name = match host_rest {
        Some(rest) => {
            let mut segments = rest
                .split(['/', '?', '#'])
                .filter(|seg| !seg.is_empty());
            match segments.next()? {
                "s" => segments.next()?,
                first => first,
            }
        }
        None => s.split(['/', '?', '#']).next()?,
    };

    let name = name.trim_start_matches('@');
    name_regex().is_match(name).then(|| name.to_string())
}

/// Drop duplicates (case-insensitive), keeping first-seen order.
fn clean_list(items: Vec<Source>) -> Vec<Source> {
    let mut out: Vec<Source> = Vec::with_capacity(items.len());
    for it in items {
        if !out.iter().any(|s| s.same_as(&it)) {
            out.push(it);
        }
    }
    out
}

#[async_trait]
pub trait SourceRegistry: Send + Sync {
    async fn list(&self) -> Result<Vec<Source>, StoreError>;
    /// `false` if already present or empty/invalid after normalization.
    async fn add(&self, raw_name: &str) -> Result<bool, StoreError>;
    /// `false` if not present or invalid.
    async fn remove(&self, raw_name: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct RegistryFile {
    #[serde(default)]
    sources: Vec<Source>,
}

/// JSON-file backed registry, seeded from static configuration.
pub struct FileRegistry {
    path: PathBuf,
    seed: Vec<Source>,
    lock: Mutex<()>,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>, seed: Vec<Source>) -> Self {
        Self {
            path: path.into(),
            seed: clean_list(seed),
            lock: Mutex::new(()),
        }
    }

    /// `<state_dir>/sources.json`
    pub fn at_state_dir(state_dir: &Path, seed: Vec<Source>) -> Self {
        Self::new(state_dir.join("sources.json"), seed)
    }

    async fn load(&self) -> Result<Vec<Source>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => {
                let file: RegistryFile = serde_json::from_str(&s)?;
                // Re-validate: the file may have been edited by hand.
                let parsed = file
                    .sources
                    .iter()
                    .filter_map(|s| Source::parse(s.as_str()))
                    .collect();
                Ok(clean_list(parsed))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(self.seed.clone()),
            Err(e) => Err(io_err(&self.path, e)),
        }
    }

    async fn save(&self, sources: &[Source]) -> Result<(), StoreError> {
        let file = RegistryFile {
            sources: sources.to_vec(),
        };
        write_atomic(&self.path, serde_json::to_vec_pretty(&file)?).await
    }
}

#[async_trait]
impl SourceRegistry for FileRegistry {
    async fn list(&self) -> Result<Vec<Source>, StoreError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn add(&self, raw_name: &str) -> Result<bool, StoreError> {
        let Some(source) = Source::parse(raw_name) else {
            return Ok(false);
        };
        let _guard = self.lock.lock().await;
        let mut sources = self.load().await?;
        if sources.iter().any(|s| s.same_as(&source)) {
            return Ok(false);
        }
        sources.push(source);
        self.save(&sources).await?;
        Ok(true)
    }

    async fn remove(&self, raw_name: &str) -> Result<bool, StoreError> {
        let Some(source) = Source::parse(raw_name) else {
            return Ok(false);
        };
        let _guard = self.lock.lock().await;
        let mut sources = self.load().await?;
        let before = sources.len();
        sources.retain(|s| !s.same_as(&source));
        if sources.len() == before {
            return Ok(false);
        }
        self.save(&sources).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_spellings() {
        for raw in [
            "MELOCHOV",
            "@MELOCHOV",
            "  @MELOCHOV ",
            "https://t.me/MELOCHOV",
            "http://www.t.me/MELOCHOV/",
            "t.me/s/MELOCHOV",
            "https://t.me/MELOCHOV/1234",
            "https://telegram.me/MELOCHOV?x=1",
        ] {
            assert_eq!(normalize_source_name(raw).as_deref(), Some("MELOCHOV"), "input: {raw}");
        }
    }

    #[test]
    fn rejects_empty_and_junk() {
        assert_eq!(normalize_source_name(""), None);
        assert_eq!(normalize_source_name("@"), None);
        assert_eq!(normalize_source_name("https://t.me/"), None);
        assert_eq!(normalize_source_name("bad name!"), None);
    }

    #[test]
    fn clean_list_is_case_insensitive() {
        let list = vec![
            Source::parse("abks07").unwrap(),
            Source::parse("ABKS07").unwrap(),
            Source::parse("toolsSADA").unwrap(),
        ];
        let cleaned = clean_list(list);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].as_str(), "abks07");
    }
}
