//! RSS fetcher. The one concrete `ContentFetcher` shipped with the engine;
//! SerpAPI/HN/Product Hunt clients live in the wider platform and register
//! themselves the same way.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::items::{normalize_text, ContentFetcher, FetchError, NormalizedItem};
use crate::source::Source;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

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
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "category", default)]
    category: Vec<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub struct RssFetcher {
    mode: Mode,
}

enum Mode {
    /// Canned XML, for tests and offline runs.
    Fixture(String),
    Http { client: reqwest::Client },
}

impl RssFetcher {
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    /// HTTP mode; the feed URL comes from each source's `feed_url` config.
    pub fn over_http() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(std::time::Duration::from_secs(READ_TIMEOUT_SECS))
            .build()
            .expect("reqwest client with timeouts");
        Self {
            mode: Mode::Http { client },
        }
    }

    fn parse_feed(xml: &str) -> Result<Vec<NormalizedItem>, FetchError> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean)
            .context("parsing rss xml")
            .map_err(|e| FetchError::Service(format!("{e:#}")))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let description = normalize_text(it.description.as_deref().unwrap_or_default());
            if title.is_empty() && description.is_empty() {
                continue;
            }
            let url = match it.link {
                Some(l) if !l.trim().is_empty() => l,
                // Keep the row; the pipeline counts it as a per-item failure.
                _ => String::new(),
            };
            out.push(NormalizedItem {
                url,
                published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
                raw_payload: serde_json::json!({ "title": title, "description": description }),
                tags: it.category,
                title,
                description,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("feedwarden_fetch_parse_ms").record(ms);
        counter!("feedwarden_fetched_items_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl ContentFetcher for RssFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
        match &self.mode {
            Mode::Fixture(xml) => Self::parse_feed(xml),
            Mode::Http { client } => {
                let url = source.feed_url().ok_or_else(|| {
                    FetchError::Configuration(format!("source {} has no feed_url", source.id))
                })?;
                let resp = client.get(url).send().await.map_err(|e| {
                    if e.is_timeout() {
                        FetchError::Timeout(READ_TIMEOUT_SECS)
                    } else {
                        FetchError::Service(format!("rss get: {e}"))
                    }
                })?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(FetchError::Service(format!("rss http status {status}")));
                }
                let body = resp
                    .text()
                    .await
                    .map_err(|e| FetchError::Service(format!("rss body: {e}")))?;
                Self::parse_feed(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
