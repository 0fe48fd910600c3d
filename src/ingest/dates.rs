// src/ingest/dates.rs
//! Best-effort timestamp resolution.
//!
//! Parsers are tried in order and the first success wins. The caller supplies
//! "now" as the explicit last resort, so resolution never fails.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

/// A single date grammar.
pub type DateStrategy = fn(&str) -> Option<DateTime<Utc>>;

/// Feed-style grammar first, then ISO-8601-like fallbacks.
pub const STRATEGIES: &[(&str, DateStrategy)] = &[
    ("rfc2822", parse_rfc2822),
    ("rfc3339", parse_rfc3339),
    ("naive-iso", parse_naive_iso),
];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond()))
        // chrono is more lenient with obsolete zone names ("GMT", "EST")
        .or_else(|| {
            DateTime::parse_from_rfc2822(ts)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_naive_iso(ts: &str) -> Option<DateTime<Utc>> {
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(ts, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(ts, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Run the strategies in order; `None` if none of them understood `raw`.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    STRATEGIES.iter().find_map(|(_, parse)| parse(raw))
}

/// Resolve an optional raw timestamp, falling back to `now`.
pub fn resolve_published(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    match raw.and_then(parse_published) {
        Some(ts) => ts,
        None => {
            if let Some(raw) = raw {
                tracing::debug!(target: "ingest", raw, "unparseable timestamp, using now");
            }
            now
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn feed_style_dates() {
        assert_eq!(
            parse_published("Mon, 06 Jan 2025 10:15:00 +0300"),
            Some(utc(2025, 1, 6, 7, 15, 0))
        );
        assert_eq!(
            parse_published("Mon, 06 Jan 2025 10:15:00 GMT"),
            Some(utc(2025, 1, 6, 10, 15, 0))
        );
    }

    #[test]
    fn iso_fallbacks() {
        assert_eq!(
            parse_published("2025-01-06T10:15:00+00:00"),
            Some(utc(2025, 1, 6, 10, 15, 0))
        );
        assert_eq!(
            parse_published("2025-01-06T10:15:00"),
            Some(utc(2025, 1, 6, 10, 15, 0))
        );
        assert_eq!(
            parse_published("2025-01-06 10:15"),
            Some(utc(2025, 1, 6, 10, 15, 0))
        );
        assert_eq!(parse_published("2025-01-06"), Some(utc(2025, 1, 6, 0, 0, 0)));
    }

    #[test]
    fn garbage_falls_back_to_now() {
        let now = utc(2030, 5, 5, 5, 5, 5);
        assert_eq!(parse_published("yesterday-ish"), None);
        assert_eq!(resolve_published(Some("yesterday-ish"), now), now);
        assert_eq!(resolve_published(None, now), now);
        assert_eq!(resolve_published(Some("   "), now), now);
    }
}
