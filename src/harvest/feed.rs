// src/harvest/feed.rs
use async_trait::async_trait;
use metrics::histogram;
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use regex::{Captures, Regex};
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::harvest::types::{FeedProbe, HarvestError};
use crate::text::normalize_inline;

// One document shape covers RSS 2.0 (<channel><item>), RSS 1.0 (<item> at root)
// and Atom (<entry> at root). The root element name is not checked.
#[derive(Debug, Default, Deserialize)]
struct FeedDoc {
    #[serde(default)]
    channel: Option<Channel>,
    #[serde(default)]
    item: Vec<Item>,
    #[serde(default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct Channel {
    #[serde(default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<TextNode>,
    updated: Option<String>,
    published: Option<String>,
}

// Atom text constructs carry a `type` attribute.
#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: Option<String>,
}

/// One parsed entry, reduced to what the Harvester needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    /// Unix seconds, when the entry carries a parseable date.
    pub published_at: Option<i64>,
}

fn parse_rfc2822(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.unix_timestamp())
}

fn parse_rfc3339(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339)
        .ok()
        .map(|dt| dt.unix_timestamp())
}

/// Parse an RSS/Atom body into entries, in document order.
pub fn parse_entries(xml: &str) -> Result<Vec<FeedEntry>, HarvestError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let doc: FeedDoc =
        from_str(&xml_clean).map_err(|e| HarvestError::MalformedFeed(e.to_string()))?;

    let mut out = Vec::new();
    let rss_items = doc
        .channel
        .map(|c| c.item)
        .unwrap_or_default()
        .into_iter()
        .chain(doc.item);
    for it in rss_items {
        out.push(FeedEntry {
            title: normalize_inline(it.title.as_deref().unwrap_or_default()),
            published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
        });
    }
    for e in doc.entry {
        out.push(FeedEntry {
            title: normalize_inline(
                e.title
                    .and_then(|t| t.value)
                    .as_deref()
                    .unwrap_or_default(),
            ),
            published_at: e
                .updated
                .as_deref()
                .and_then(parse_rfc3339)
                .or_else(|| e.published.as_deref().and_then(parse_rfc3339)),
        });
    }

    histogram!("harvest_feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(out)
}

/// Newest entry: latest parseable date wins; without any dates, the first entry.
pub fn newest_entry(entries: &[FeedEntry]) -> Option<&FeedEntry> {
    let dated = entries
        .iter()
        .enumerate()
        .filter_map(|(i, e)| e.published_at.map(|ts| (ts, std::cmp::Reverse(i), e)))
        .max_by_key(|(ts, rev_i, _)| (*ts, *rev_i))
        .map(|(_, _, e)| e);
    dated.or_else(|| entries.first())
}

/// Turn an HTTP status + body into the liveness title or a classified error.
pub fn newest_title_from(status: u16, body: &str) -> Result<String, HarvestError> {
    let entries = match parse_entries(body) {
        Ok(v) => v,
        Err(e) => {
            if status >= 400 {
                return Err(HarvestError::Http { status });
            }
            return Err(e);
        }
    };
    match newest_entry(&entries) {
        Some(e) if e.title.is_empty() => Err(HarvestError::UntitledEntry),
        Some(e) => Ok(e.title.clone()),
        None if status >= 400 => Err(HarvestError::Http { status }),
        None => Err(HarvestError::EmptyFeed),
    }
}

pub struct FeedReader {
    mode: Mode,
}

enum Mode {
    /// Fixed body served for every URL.
    Fixture { status: u16, body: String },
    Http { client: reqwest::Client },
}

impl FeedReader {
    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http { client },
        }
    }

    pub fn from_fixture(body: &str) -> Self {
        Self::from_fixture_with_status(200, body)
    }

    pub fn from_fixture_with_status(status: u16, body: &str) -> Self {
        Self {
            mode: Mode::Fixture {
                status,
                body: body.to_string(),
            },
        }
    }
}

#[async_trait]
impl FeedProbe for FeedReader {
    async fn latest_title(&self, url: &str) -> Result<String, HarvestError> {
        match &self.mode {
            Mode::Fixture { status, body } => newest_title_from(*status, body),
            Mode::Http { client } => {
                let resp = client.get(url).send().await.map_err(transport_error)?;
                let status = resp.status().as_u16();
                let body = resp.text().await.map_err(transport_error)?;
                newest_title_from(status, &body)
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> HarvestError {
    if e.is_timeout() {
        HarvestError::Timeout
    } else {
        HarvestError::Transport(e.to_string())
    }
}

/// Rewrite HTML named entities (undeclared in XML) so the parser accepts the body.
/// The five XML entities are left for the parser.
fn scrub_html_entities_for_xml(s: &str) -> String {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]*);").unwrap());
    re.replace_all(s, |caps: &Captures| match caps[1].to_ascii_lowercase().as_str() {
        "amp" | "lt" | "gt" | "quot" | "apos" => caps[0].to_string(),
        "nbsp" => " ".to_string(),
        "ndash" | "mdash" => "-".to_string(),
        _ => html_escape::decode_html_entities(&caps[0]).into_owned(),
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>EBA</title>
  <item><title>Older item</title><pubDate>Mon, 03 Mar 2025 10:00:00 +0000</pubDate></item>
  <item><title><![CDATA[EBA publishes &ndash; final RTS]]></title><pubDate>Tue, 04 Mar 2025 10:00:00 +0000</pubDate></item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ESMA</title>
  <entry><title type="text">First</title><updated>2025-01-01T00:00:00Z</updated></entry>
  <entry><title type="html">Newest &amp; best</title><updated>2025-02-01T00:00:00Z</updated></entry>
</feed>"#;

    #[test]
    fn rss_newest_by_date() {
        assert_eq!(newest_title_from(200, RSS).unwrap(), "EBA publishes - final RTS");
    }

    #[test]
    fn atom_newest_by_date() {
        assert_eq!(newest_title_from(200, ATOM).unwrap(), "Newest & best");
    }

    #[test]
    fn undated_falls_back_to_first() {
        let xml = "<rss><channel><item><title>A</title></item><item><title>B</title></item></channel></rss>";
        assert_eq!(newest_title_from(200, xml).unwrap(), "A");
    }

    #[test]
    fn empty_feed_vs_http_error() {
        let empty = "<rss><channel><title>Nothing</title></channel></rss>";
        assert_eq!(newest_title_from(200, empty), Err(HarvestError::EmptyFeed));
        assert_eq!(
            newest_title_from(403, empty),
            Err(HarvestError::Http { status: 403 })
        );
        assert!(!HarvestError::EmptyFeed.is_transient());
        assert!(HarvestError::Http { status: 503 }.is_transient());
        assert!(!HarvestError::Http { status: 403 }.is_transient());
    }

    #[test]
    fn items_split_by_other_elements_are_all_read() {
        let xml = r#"<rss xmlns:atom="http://www.w3.org/2005/Atom"><channel>
  <item><title>A</title></item>
  <atom:link href="https://www.esma.europa.eu/rss.xml" rel="self" type="application/rss+xml"/>
  <item><title>B</title><pubDate>Tue, 04 Mar 2025 10:00:00 +0000</pubDate></item>
</channel></rss>"#;
        let entries = parse_entries(xml).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(newest_title_from(200, xml).unwrap(), "B");
    }

    #[test]
    fn named_html_entities_are_decoded() {
        let xml = "<rss><channel><item><title>Autorit&eacute; des march&eacute;s &amp; &laquo;AMF&raquo;</title></item></channel></rss>";
        assert_eq!(
            newest_title_from(200, xml).unwrap(),
            "Autorit\u{e9} des march\u{e9}s & \"AMF\""
        );
        assert_eq!(scrub_html_entities_for_xml("a&nbsp;b &lt; c"), "a b &lt; c");
    }

    #[test]
    fn untitled_newest_entry_is_an_error() {
        let xml = "<rss><channel><item><link>https://www.eba.europa.eu/x</link></item></channel></rss>";
        let err = newest_title_from(200, xml).unwrap_err();
        assert_eq!(err, HarvestError::UntitledEntry);
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn fixture_reader_serves_body() {
        let reader = FeedReader::from_fixture(RSS);
        let t = reader.latest_title("https://ignored.example").await.unwrap();
        assert!(t.starts_with("EBA publishes"));
    }
}
