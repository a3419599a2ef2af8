//! Normalized content items and the collaborator seams the pipeline calls:
//! fetching, URL canonicalization and deduplicating persistence. The engine
//! does not canonicalize or store anything itself; in-memory implementations
//! live here for tests and the demo binary.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::{Source, SourceId, TenantId};

/// Caller-normalized record every fetcher produces, whatever the upstream
/// API shape was.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub url: String,
    pub title: String,
    pub description: String,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub raw_payload: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Fetch-step failures. Only these fail the whole run; anything per-item is
/// recovered in the pipeline loop.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Missing API key, missing query, bad feed URL. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Upstream/network/HTTP-level failure. Retryable with backoff.
    #[error("external service error: {0}")]
    Service(String),
    #[error("fetch timed out after {0}s")]
    Timeout(u64),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Configuration(_))
    }
}

/// Per-item failures: counted, logged and skipped, never fatal to the run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("item rejected: {0}")]
    Rejected(String),
}

/// One fetcher per source kind; the pipeline is the single shared routine.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<NormalizedItem>, FetchError>;
    fn name(&self) -> &'static str;
}

pub trait Canonicalizer: Send + Sync {
    fn canonicalize(&self, raw_url: &str) -> Result<String, ItemError>;
}

/// Minimal canonical form: trims, lowercases scheme+host, drops fragments.
/// Real canonicalization lives in the platform's URL service; this stand-in
/// only has to be deterministic for dedup.
#[derive(Debug, Default)]
pub struct BasicCanonicalizer;

impl Canonicalizer for BasicCanonicalizer {
    fn canonicalize(&self, raw_url: &str) -> Result<String, ItemError> {
        let trimmed = raw_url.trim();
        if trimmed.is_empty() {
            return Err(ItemError::InvalidUrl("empty url".into()));
        }
        let (scheme, rest) = trimmed
            .split_once("://")
            .ok_or_else(|| ItemError::InvalidUrl(format!("no scheme in {trimmed}")))?;
        if !matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https") {
            return Err(ItemError::InvalidUrl(format!("unsupported scheme {scheme}")));
        }
        let rest = rest.split('#').next().unwrap_or(rest);
        if rest.is_empty() {
            return Err(ItemError::InvalidUrl(format!("no host in {trimmed}")));
        }
        let (host, path) = match rest.split_once('/') {
            Some((h, p)) => (h, format!("/{p}")),
            None => (rest, String::new()),
        };
        if host.is_empty() {
            return Err(ItemError::InvalidUrl(format!("no host in {trimmed}")));
        }
        let path = path.strip_suffix('/').map(str::to_string).unwrap_or(path);
        Ok(format!(
            "{}://{}{}",
            scheme.to_ascii_lowercase(),
            host.to_ascii_lowercase(),
            path
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Find-or-create by (tenant, canonical url). The second upsert of the same
/// canonical URL must come back `Updated`, never a duplicate create.
#[async_trait]
pub trait ItemSink: Send + Sync {
    async fn upsert(
        &self,
        tenant: &str,
        canonical_url: &str,
        item: &NormalizedItem,
        source: &SourceId,
    ) -> Result<UpsertOutcome, ItemError>;
}

#[derive(Debug, Clone)]
pub struct StoredItem {
    pub tenant_id: TenantId,
    pub canonical_url: String,
    pub item: NormalizedItem,
    pub source_id: SourceId,
    pub seen_count: u32,
}

/// In-memory sink for tests and the demo binary.
#[derive(Debug, Default)]
pub struct MemoryItemSink {
    inner: Mutex<HashMap<(TenantId, String), StoredItem>>,
}

impl MemoryItemSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("item sink mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, tenant: &str, canonical_url: &str) -> Option<StoredItem> {
        let map = self.inner.lock().expect("item sink mutex poisoned");
        map.get(&(tenant.to_string(), canonical_url.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ItemSink for MemoryItemSink {
    async fn upsert(
        &self,
        tenant: &str,
        canonical_url: &str,
        item: &NormalizedItem,
        source: &SourceId,
    ) -> Result<UpsertOutcome, ItemError> {
        let mut map = self.inner.lock().expect("item sink mutex poisoned");
        let key = (tenant.to_string(), canonical_url.to_string());
        match map.get_mut(&key) {
            Some(existing) => {
                existing.item = item.clone();
                existing.seen_count += 1;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                map.insert(
                    key,
                    StoredItem {
                        tenant_id: tenant.to_string(),
                        canonical_url: canonical_url.to_string(),
                        item: item.clone(),
                        source_id: source.clone(),
                        seen_count: 1,
                    },
                );
                Ok(UpsertOutcome::Created)
            }
        }
    }
}

/// Normalize fetched titles/descriptions: decode HTML entities, strip tags,
/// collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // Length cap: 2000 chars
    if out.chars().count() > 2000 {
        out = out.chars().take(2000).collect();
    }
    out
}
