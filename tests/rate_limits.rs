// tests/rate_limits.rs
//
// Limiter properties over the execution ledger:
// - per-source used/remaining track trailing-hour ledger rows exactly
// - monthly >= daily >= hourly counts at any fixed instant
// - a source at its hourly allowance is rejected with the right status tag
//   and no new ledger row
// - an exhausted monthly budget blocks every tenant, even never-run sources

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};

use feedwarden::backlog::{MemoryEditorialBacklog, RecordingEditorialDispatcher};
use feedwarden::clock::ManualClock;
use feedwarden::config::EngineConfig;
use feedwarden::engine::Engine;
use feedwarden::fetchers::FetcherRegistry;
use feedwarden::items::{
    BasicCanonicalizer, ContentFetcher, FetchError, MemoryItemSink, NormalizedItem,
};
use feedwarden::ledger::ExecutionLedger;
use feedwarden::pipeline::{self, IngestOutcome, LimitWindow};
use feedwarden::rate_limit::{GlobalLimits, PerSourceRateLimiter, SerpApiGlobalRateLimiter};
use feedwarden::source::{Source, SourceKind};

fn mk_source(id: &str, kind: SourceKind) -> Source {
    Source {
        id: id.into(),
        tenant_id: "t1".into(),
        name: id.into(),
        kind,
        enabled: true,
        config: HashMap::new(),
        interval_secs: 300,
        last_run_at: None,
        last_status: None,
    }
}

struct StubFetcher;

#[async_trait]
impl ContentFetcher for StubFetcher {
    async fn fetch(&self, _source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
        Ok(vec![])
    }
    fn name(&self) -> &'static str {
        "stub"
    }
}

fn mk_engine(clock: Arc<ManualClock>, config: EngineConfig) -> Arc<Engine> {
    let mut fetchers = FetcherRegistry::new();
    for kind in [
        SourceKind::Rss,
        SourceKind::SerpApiGoogleNews,
        SourceKind::HackerNews,
    ] {
        fetchers.register(kind, Arc::new(StubFetcher));
    }
    Arc::new(Engine::new(
        config,
        clock,
        fetchers,
        Arc::new(MemoryItemSink::new()),
        Arc::new(BasicCanonicalizer),
        Arc::new(MemoryEditorialBacklog::new()),
        Arc::new(RecordingEditorialDispatcher::new()),
    ))
}

#[test]
fn per_source_used_tracks_trailing_hour() {
    let t0 = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(t0));
    let ledger = Arc::new(ExecutionLedger::new(clock.clone()));
    let limiter = PerSourceRateLimiter::new(ledger.clone(), clock.clone());
    let source = mk_source("s1", SourceKind::Rss);

    // First run ever: nothing used, always allowed.
    assert_eq!(limiter.used(&source), 0);
    assert_eq!(limiter.remaining(&source), 10);
    assert!(limiter.allowed(&source));
    assert_eq!(limiter.reset_in_seconds(&source), 0);

    for expected in 1..=3u32 {
        let h = ledger.begin_run(&source);
        ledger.complete_run(h, 1, 0, 0);
        assert_eq!(limiter.used(&source), expected);
        assert_eq!(limiter.remaining(&source), 10 - expected);
    }

    // The oldest run ages out of the window after an hour.
    assert_eq!(limiter.reset_in_seconds(&source), 3600);
    clock.advance(Duration::minutes(61));
    assert_eq!(limiter.used(&source), 0);
    assert_eq!(limiter.remaining(&source), 10);
}

#[test]
fn remaining_floors_at_zero() {
    let t0 = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(t0));
    let ledger = Arc::new(ExecutionLedger::new(clock.clone()));
    let limiter = PerSourceRateLimiter::new(ledger.clone(), clock);

    let mut source = mk_source("s1", SourceKind::Rss);
    source
        .config
        .insert("rate_limit_per_hour".into(), "2".into());

    for _ in 0..3 {
        let h = ledger.begin_run(&source);
        ledger.complete_run(h, 0, 0, 0);
    }
    assert_eq!(limiter.used(&source), 3);
    assert_eq!(limiter.remaining(&source), 0);
    assert!(!limiter.allowed(&source));
}

#[test]
fn global_windows_are_nested() {
    // Mid-month, mid-day instant so the three windows genuinely differ.
    let t0 = Utc.with_ymd_and_hms(2025, 6, 15, 12, 30, 0).unwrap();
    let clock = Arc::new(ManualClock::new(t0));
    let ledger = Arc::new(ExecutionLedger::new(clock.clone()));
    let serp = mk_source("s", SourceKind::SerpApiGoogleNews);

    // One run earlier this month, one earlier today, one this hour.
    for back in [Duration::days(5), Duration::hours(3), Duration::minutes(10)] {
        clock.set(t0 - back);
        let h = ledger.begin_run(&serp);
        ledger.complete_run(h, 0, 0, 0);
    }
    clock.set(t0);

    let limiter =
        SerpApiGlobalRateLimiter::new(ledger, GlobalLimits::from_monthly(1000), clock);
    assert_eq!(limiter.monthly_used(), 3);
    assert_eq!(limiter.daily_used(), 2);
    assert_eq!(limiter.hourly_used(), 1);
    assert!(limiter.monthly_used() >= limiter.daily_used());
    assert!(limiter.daily_used() >= limiter.hourly_used());

    let stats = limiter.usage_stats();
    assert_eq!(stats.monthly.used, 3);
    assert_eq!(stats.monthly.remaining, 997);
    // 3 used across 15 elapsed days of a 30-day month -> 6 projected.
    assert_eq!(stats.projected_month_end, 6);
}

#[tokio::test]
async fn source_at_hourly_allowance_is_tagged_and_writes_no_row() {
    let t0 = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(t0));
    let engine = mk_engine(clock.clone(), EngineConfig::default());

    let source = mk_source("s1", SourceKind::Rss);
    engine.sources.insert(source.clone());
    for _ in 0..10 {
        let h = engine.ledger.begin_run(&source);
        engine.ledger.complete_run(h, 0, 0, 0);
    }
    assert!(!engine.per_source_limiter.allowed(&source));

    let before = engine.ledger.len();
    let outcome = pipeline::run_ingestion(&engine, "s1").await;
    assert_eq!(
        outcome,
        IngestOutcome::RateLimited {
            window: LimitWindow::PerSource
        }
    );
    assert_eq!(engine.ledger.len(), before);
    let s = engine.sources.get("s1").unwrap();
    assert_eq!(s.last_status.as_deref(), Some("per_source_rate_limited"));
    // The throttle stamps last_run_at too: a limited source waits a full
    // interval before the scheduler reconsiders it.
    assert_eq!(s.last_run_at, Some(t0));
}

#[tokio::test]
async fn exhausted_monthly_budget_blocks_even_new_sources() {
    let t0 = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(t0));
    let config = EngineConfig {
        serp_api_monthly_limit: 1000,
        ..EngineConfig::default()
    };
    let engine = mk_engine(clock.clone(), config);

    // Spread this month's usage across earlier days so only the monthly
    // window is saturated.
    let noisy = mk_source("noisy", SourceKind::SerpApiGoogleNews);
    engine.sources.insert(noisy.clone());
    for i in 0..1000u32 {
        clock.set(t0 - Duration::days(2) - Duration::minutes(i as i64));
        let h = engine.ledger.begin_run(&noisy);
        engine.ledger.complete_run(h, 0, 0, 0);
    }
    clock.set(t0);
    assert!(!engine.global_limiter.allow());

    // A different tenant's never-run source is blocked all the same.
    let mut fresh = mk_source("fresh", SourceKind::SerpApiGoogleNews);
    fresh.tenant_id = "t2".into();
    engine.sources.insert(fresh);

    let outcome = pipeline::run_ingestion(&engine, "fresh").await;
    assert_eq!(
        outcome,
        IngestOutcome::RateLimited {
            window: LimitWindow::GlobalMonthly
        }
    );
    let s = engine.sources.get("fresh").unwrap();
    assert_eq!(s.last_status.as_deref(), Some("global_rate_limited"));
}

#[tokio::test]
async fn failed_runs_do_not_consume_the_global_budget() {
    let t0 = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(t0));
    let config = EngineConfig {
        serp_api_monthly_limit: 62, // daily 2, hourly 1
        ..EngineConfig::default()
    };
    let engine = mk_engine(clock.clone(), config);

    let serp = mk_source("s", SourceKind::SerpApiGoogleNews);
    engine.sources.insert(serp.clone());

    let h = engine.ledger.begin_run(&serp);
    engine.ledger.fail_run(h, "connect timeout");
    assert_eq!(engine.global_limiter.hourly_used(), 0);
    assert!(engine.global_limiter.can_make_request());

    let h = engine.ledger.begin_run(&serp);
    engine.ledger.complete_run(h, 1, 0, 0);
    assert_eq!(engine.global_limiter.hourly_used(), 1);
    assert!(!engine.global_limiter.allow_this_hour());
}
