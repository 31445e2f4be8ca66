// src/text.rs
//! Small text helpers shared by the probes, the extractor and the filters.

use once_cell::sync::OnceCell;
use regex::Regex;

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Collapse every whitespace run to one space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    re_ws().replace_all(s, " ").trim().to_string()
}

/// Decode entities, strip tags, normalize quotes, collapse whitespace.
/// Used for one-line strings such as feed and page titles.
pub fn normalize_inline(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    collapse_whitespace(&out)
}

/// Multi-line cleanup for extracted article bodies: trims every line, collapses
/// intra-line whitespace, and keeps at most one blank line between paragraphs.
pub fn tidy_block(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut blank_run = 0usize;
    for line in s.lines() {
        let line = collapse_whitespace(line);
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(&line);
        blank_run = 0;
    }
    out
}

/// Text of the first `<title>` element of an HTML document.
pub fn html_title(html: &str) -> Option<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
    let raw = re.captures(html)?.get(1)?.as_str();
    let t = normalize_inline(raw);
    (!t.is_empty()).then_some(t)
}

/// Count of Unicode scalar values, the unit every length threshold uses.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
