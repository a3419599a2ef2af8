//! Configured content sources and the in-memory registry the scheduler and
//! pipeline read from.
//!
//! A `Source` carries an opaque `config` map (API keys, query params, the
//! per-source rate-limit override); typed accessors live here so callers
//! never poke at raw keys.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::pause::WorkflowType;

pub type TenantId = String;
pub type SourceId = String;

/// Default hourly allowance when a source carries no override.
pub const DEFAULT_RATE_LIMIT_PER_HOUR: u32 = 10;

/// Integration type of a source. SerpAPI variants share one external quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Rss,
    SerpApiGoogleNews,
    SerpApiGoogleJobs,
    SerpApiYoutube,
    HackerNews,
    ProductHunt,
    SerpApiReddit,
    SerpApiAmazon,
    SerpApiGoogleShopping,
    WebScraper,
    Api,
}

impl SourceKind {
    /// Kinds that consume the shared SerpAPI contract quota.
    pub fn is_serp_api(self) -> bool {
        matches!(
            self,
            SourceKind::SerpApiGoogleNews
                | SourceKind::SerpApiGoogleJobs
                | SourceKind::SerpApiYoutube
                | SourceKind::SerpApiReddit
                | SourceKind::SerpApiAmazon
                | SourceKind::SerpApiGoogleShopping
        )
    }

    /// Workflow class this kind's ingestion belongs to for pause checks.
    pub fn workflow_type(self) -> WorkflowType {
        match self {
            SourceKind::Rss => WorkflowType::RssIngestion,
            k if k.is_serp_api() => WorkflowType::SerpApiIngestion,
            _ => WorkflowType::AllIngestion,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Rss => "rss",
            SourceKind::SerpApiGoogleNews => "serp_api_google_news",
            SourceKind::SerpApiGoogleJobs => "serp_api_google_jobs",
            SourceKind::SerpApiYoutube => "serp_api_youtube",
            SourceKind::HackerNews => "hacker_news",
            SourceKind::ProductHunt => "product_hunt",
            SourceKind::SerpApiReddit => "serp_api_reddit",
            SourceKind::SerpApiAmazon => "serp_api_amazon",
            SourceKind::SerpApiGoogleShopping => "serp_api_google_shopping",
            SourceKind::WebScraper => "web_scraper",
            SourceKind::Api => "api",
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rss" => Ok(SourceKind::Rss),
            "serp_api_google_news" => Ok(SourceKind::SerpApiGoogleNews),
            "serp_api_google_jobs" => Ok(SourceKind::SerpApiGoogleJobs),
            "serp_api_youtube" => Ok(SourceKind::SerpApiYoutube),
            "hacker_news" => Ok(SourceKind::HackerNews),
            "product_hunt" => Ok(SourceKind::ProductHunt),
            "serp_api_reddit" => Ok(SourceKind::SerpApiReddit),
            "serp_api_amazon" => Ok(SourceKind::SerpApiAmazon),
            "serp_api_google_shopping" => Ok(SourceKind::SerpApiGoogleShopping),
            "web_scraper" => Ok(SourceKind::WebScraper),
            "api" => Ok(SourceKind::Api),
            other => Err(format!("unknown source kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub tenant_id: TenantId,
    pub name: String,
    pub kind: SourceKind,
    pub enabled: bool,
    /// Opaque per-source settings: API keys, query params, limit overrides.
    #[serde(default)]
    pub config: HashMap<String, String>,
    /// Scheduling interval in seconds.
    pub interval_secs: u64,
    /// Stamped at ingestion *start* (not completion) so a long-running import
    /// excludes itself from the next sweep.
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
}

impl Source {
    pub fn rate_limit_per_hour(&self) -> u32 {
        self.config
            .get("rate_limit_per_hour")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_PER_HOUR)
    }

    pub fn feed_url(&self) -> Option<&str> {
        self.config.get("feed_url").map(String::as_str)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.config.get("api_key").map(String::as_str)
    }

    pub fn query(&self) -> Option<&str> {
        self.config.get("query").map(String::as_str)
    }

    /// Due = enabled and never run, or interval elapsed since the last stamp.
    pub fn run_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_run_at {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last);
                elapsed.num_seconds() >= self.interval_secs as i64
            }
        }
    }
}

/// Thread-safe in-memory source store shared by the scheduler, the pipeline
/// and the admin surface.
#[derive(Debug)]
pub struct SourceRegistry {
    inner: Mutex<HashMap<SourceId, Source>>,
    clock: Arc<dyn Clock>,
}

impl SourceRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn insert(&self, source: Source) {
        let mut map = self.inner.lock().expect("source registry mutex poisoned");
        map.insert(source.id.clone(), source);
    }

    pub fn get(&self, id: &str) -> Option<Source> {
        let map = self.inner.lock().expect("source registry mutex poisoned");
        map.get(id).cloned()
    }

    pub fn list(&self) -> Vec<Source> {
        let map = self.inner.lock().expect("source registry mutex poisoned");
        let mut out: Vec<Source> = map.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn tenant_of(&self, id: &str) -> Option<TenantId> {
        self.get(id).map(|s| s.tenant_id)
    }

    /// Bulk due-selection for the sweep. Callers must still re-confirm
    /// `run_due` per source before dispatch.
    pub fn due_sources(&self, now: DateTime<Utc>) -> Vec<Source> {
        let map = self.inner.lock().expect("source registry mutex poisoned");
        let mut out: Vec<Source> = map.values().filter(|s| s.run_due(now)).cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Stamps `last_run_at = now` and `last_status` unconditionally. Every
    /// terminal pipeline path goes through here, including rate-limited skips,
    /// so a limited source waits a full interval before being reconsidered.
    pub fn update_run_status(&self, id: &str, status: &str) {
        let now = self.clock.now();
        let mut map = self.inner.lock().expect("source registry mutex poisoned");
        if let Some(source) = map.get_mut(id) {
            source.last_run_at = Some(now);
            source.last_status = Some(status.to_string());
        }
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) {
        let mut map = self.inner.lock().expect("source registry mutex poisoned");
        if let Some(source) = map.get_mut(id) {
            source.enabled = enabled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone};

    fn mk_source(id: &str, interval: u64) -> Source {
        Source {
            id: id.into(),
            tenant_id: "t1".into(),
            name: id.into(),
            kind: SourceKind::Rss,
            enabled: true,
            config: HashMap::new(),
            interval_secs: interval,
            last_run_at: None,
            last_status: None,
        }
    }

    #[test]
    fn never_run_source_is_due() {
        let s = mk_source("a", 300);
        assert!(s.run_due(Utc::now()));
    }

    #[test]
    fn disabled_source_is_never_due() {
        let mut s = mk_source("a", 300);
        s.enabled = false;
        assert!(!s.run_due(Utc::now()));
    }

    #[test]
    fn due_only_after_interval_elapses() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut s = mk_source("a", 300);
        s.last_run_at = Some(t0);
        assert!(!s.run_due(t0 + Duration::seconds(299)));
        assert!(s.run_due(t0 + Duration::seconds(300)));
    }

    #[test]
    fn update_run_status_stamps_both_fields() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(t0));
        let reg = SourceRegistry::new(clock.clone());
        reg.insert(mk_source("a", 300));

        reg.update_run_status("a", "per_source_rate_limited");
        let s = reg.get("a").unwrap();
        assert_eq!(s.last_run_at, Some(t0));
        assert_eq!(s.last_status.as_deref(), Some("per_source_rate_limited"));
    }

    #[test]
    fn rate_limit_override_and_default() {
        let mut s = mk_source("a", 300);
        assert_eq!(s.rate_limit_per_hour(), DEFAULT_RATE_LIMIT_PER_HOUR);
        s.config
            .insert("rate_limit_per_hour".into(), "3".into());
        assert_eq!(s.rate_limit_per_hour(), 3);
    }

    #[test]
    fn serp_kinds_share_the_quota_class() {
        assert!(SourceKind::SerpApiReddit.is_serp_api());
        assert!(!SourceKind::Rss.is_serp_api());
        assert!(!SourceKind::HackerNews.is_serp_api());
        assert_eq!("serp_api_youtube".parse(), Ok(SourceKind::SerpApiYoutube));
    }
}
