// tests/canon_idempotence.rs
use channel_sync::canon::canonicalize;

const SAMPLES: &[&str] = &[
    "https://t.me/MELOCHOV/1234",
    "http://telegram.me/s/abks07/99?single#x",
    "t.me/jjsbossj/5/",
    "www.t.me/toolsSADA/42 ",
    "https://t.me/s/Chan/7 /",
    "https://Example.com/News/Item/?utm_source=x#top",
    "HTTPS://EXAMPLE.COM///",
    "urn:uuid:1C5F-AB",
    "Breaking news|2025-01-06t10:15:00+00:00",
    "   ",
    "",
    "/",
    "?only=query",
    "ёжик/",
];

#[test]
fn canonicalize_is_idempotent() {
    for raw in SAMPLES {
        let once = canonicalize(raw);
        let twice = canonicalize(once.as_str());
        assert_eq!(once, twice, "not idempotent for {raw:?}");
    }
}

#[test]
fn post_links_from_different_adapters_agree() {
    // RSS link, RSS guid and page-scrape data-post all name the same post
    let from_feed = canonicalize("https://t.me/toolsSADA/103");
    let from_guid = canonicalize("https://t.me/s/toolssada/103?single");
    let from_page = canonicalize(&format!("https://t.me/{}", "toolsSADA/103"));
    assert_eq!(from_feed, from_guid);
    assert_eq!(from_feed, from_page);
    assert_eq!(from_feed.as_str(), "https://t.me/toolssada/103");
}

#[test]
fn degenerate_inputs_collapse_to_empty() {
    assert!(canonicalize("").is_empty());
    assert!(canonicalize("/").is_empty());
    assert!(canonicalize("?only=query").is_empty());
}
