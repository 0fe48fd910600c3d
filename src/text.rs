// src/text.rs
//! Text normalization for post titles and bodies.
//!
//! Both entry points are total: empty or junk input yields empty output,
//! and truncation always lands on a `char` boundary.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Line-break markup that should survive as a newline.
const BREAK_PATTERN: &str = r"(?i)<br\s*/?>|</(?:p|div|li|blockquote|pre|h[1-6])\s*>";
/// Any remaining tag.
const TAG_PATTERN: &str = r"(?s)</?[^>]+>";
/// Emoji, pictographs, dingbats, variation selectors and tag characters.
const EMOJI_PATTERN: &str = r"[\x{1F000}-\x{1FAFF}\x{2600}-\x{27BF}\x{2B00}-\x{2BFF}\x{FE0E}\x{FE0F}\x{20E3}\x{E0020}-\x{E007F}]";
/// Two or more in-line blanks, including no-break and zero-width characters.
const BLANK_RUN_PATTERN: &str = r"[ \t\x{00A0}\x{202F}\x{200B}-\x{200D}\x{2060}\x{FEFF}]{2,}";

fn cached(cell: &'static OnceCell<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static normalizer regex"))
}

/// Normalize raw (possibly HTML) text and cap it at `limit` code points.
///
/// Steps, in order: entity decode, line-break markup to `\n`, tag strip,
/// emoji removal, blank-run folding, per-line trim, blank-line folding,
/// final trim and truncation.
pub fn normalize(raw: &str, limit: usize) -> String {
    if raw.is_empty() || limit == 0 {
        return String::new();
    }

    static RE_BREAK: OnceCell<Regex> = OnceCell::new();
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_EMOJI: OnceCell<Regex> = OnceCell::new();
    static RE_BLANKS: OnceCell<Regex> = OnceCell::new();

    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(raw).into_owned();

    // 2) <br>, </p> and friends become newlines, then everything else goes
    out = cached(&RE_BREAK, BREAK_PATTERN)
        .replace_all(&out, "\n")
        .into_owned();
    out = cached(&RE_TAGS, TAG_PATTERN).replace_all(&out, "").into_owned();

    // 3) Decorative symbols
    out = cached(&RE_EMOJI, EMOJI_PATTERN)
        .replace_all(&out, "")
        .into_owned();

    // 4) Fold blank runs; a lone no-break space is still a space
    out = cached(&RE_BLANKS, BLANK_RUN_PATTERN)
        .replace_all(&out, " ")
        .into_owned();
    out = out.replace(['\u{00A0}', '\u{202F}'], " ");

    // 5) Trim lines and keep at most one blank line between paragraphs
    let mut lines: Vec<&str> = Vec::new();
    let mut in_blank_run = false;
    for line in out.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !in_blank_run && !lines.is_empty() {
                lines.push("");
            }
            in_blank_run = true;
        } else {
            lines.push(line);
            in_blank_run = false;
        }
    }
    let joined = lines.join("\n");

    truncate_chars(joined.trim(), limit)
}

/// Split normalized text into a bounded title (first non-empty line) and a
/// bounded body (remaining non-empty lines joined by single spaces).
pub fn split_title_body(normalized: &str, title_limit: usize, body_limit: usize) -> (String, String) {
    let mut lines = normalized.lines().map(str::trim).filter(|l| !l.is_empty());

    let title = lines
        .next()
        .map(|l| truncate_chars(l, title_limit))
        .unwrap_or_default();
    let rest: Vec<&str> = lines.collect();
    let body = truncate_chars(&rest.join(" "), body_limit);

    (title, body)
}

/// Keep at most `limit` Unicode scalar values.
pub fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}
