// tests/backlog_resume.rs
//
// Resume-with-backlog behaviour:
// - ingestion redrive ignores the interval-due check and honours scope
// - editorialisation redrive is capped and newest-first
// - the redrive is best-effort: anything past the cap stays pending

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use feedwarden::clock::Clock;

use feedwarden::backlog::{
    self, MemoryEditorialBacklog, PendingEditorial, RecordingEditorialDispatcher,
};
use feedwarden::clock::ManualClock;
use feedwarden::config::EngineConfig;
use feedwarden::engine::Engine;
use feedwarden::fetchers::FetcherRegistry;
use feedwarden::items::{
    BasicCanonicalizer, ContentFetcher, FetchError, MemoryItemSink, NormalizedItem,
};
use feedwarden::pause::{PauseScope, WorkflowType};
use feedwarden::source::{Source, SourceKind};

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

fn mk_source(id: &str, tenant: &str, kind: SourceKind) -> Source {
    Source {
        id: id.into(),
        tenant_id: tenant.into(),
        name: id.into(),
        kind,
        enabled: true,
        config: HashMap::new(),
        interval_secs: 300,
        last_run_at: None,
        last_status: None,
    }
}

struct Harness {
    engine: Arc<Engine>,
    backlog: Arc<MemoryEditorialBacklog>,
    dispatcher: Arc<RecordingEditorialDispatcher>,
    clock: Arc<ManualClock>,
}

fn harness(batch_size: usize) -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap(),
    ));
    let backlog = Arc::new(MemoryEditorialBacklog::new());
    let dispatcher = Arc::new(RecordingEditorialDispatcher::new());
    let mut fetchers = FetcherRegistry::new();
    fetchers.register(SourceKind::Rss, Arc::new(StubFetcher));
    fetchers.register(SourceKind::SerpApiGoogleNews, Arc::new(StubFetcher));
    let engine = Arc::new(Engine::new(
        EngineConfig {
            backlog_batch_size: batch_size,
            ..EngineConfig::default()
        },
        clock.clone(),
        fetchers,
        Arc::new(MemoryItemSink::new()),
        Arc::new(BasicCanonicalizer),
        backlog.clone(),
        dispatcher.clone(),
    ));
    Harness {
        engine,
        backlog,
        dispatcher,
        clock,
    }
}

#[tokio::test]
async fn ingestion_redrive_ignores_the_interval_check() {
    let h = harness(500);
    // Both sources ran moments ago, so neither is interval-due.
    let just_ran = h.clock.now() - Duration::seconds(10);
    let mut a = mk_source("a", "t1", SourceKind::Rss);
    a.last_run_at = Some(just_ran);
    let mut b = mk_source("b", "t1", SourceKind::Rss);
    b.last_run_at = Some(just_ran);
    h.engine.sources.insert(a);
    h.engine.sources.insert(b);

    let stats = backlog::process_backlog(
        &h.engine,
        WorkflowType::RssIngestion,
        &PauseScope::Tenant {
            tenant: "t1".into(),
        },
        None,
    )
    .await;
    assert_eq!(stats.sources_redriven, 2);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.engine.ledger.runs_for_source_since("a", just_ran), 1);
    assert_eq!(h.engine.ledger.runs_for_source_since("b", just_ran), 1);
}

#[tokio::test]
async fn redrive_honours_scope_and_workflow_class() {
    let h = harness(500);
    h.engine.sources.insert(mk_source("rss1", "t1", SourceKind::Rss));
    h.engine
        .sources
        .insert(mk_source("serp1", "t1", SourceKind::SerpApiGoogleNews));
    h.engine.sources.insert(mk_source("rss2", "t2", SourceKind::Rss));
    let mut off = mk_source("off", "t1", SourceKind::Rss);
    off.enabled = false;
    h.engine.sources.insert(off);

    // rss workflow, tenant t1: only rss1 qualifies.
    let stats = backlog::process_backlog(
        &h.engine,
        WorkflowType::RssIngestion,
        &PauseScope::Tenant {
            tenant: "t1".into(),
        },
        None,
    )
    .await;
    assert_eq!(stats.sources_redriven, 1);

    // all_ingestion globally: every enabled source, any kind.
    let stats = backlog::process_backlog(
        &h.engine,
        WorkflowType::AllIngestion,
        &PauseScope::Global,
        None,
    )
    .await;
    assert_eq!(stats.sources_redriven, 3);

    // kind filter narrows further.
    let stats = backlog::process_backlog(
        &h.engine,
        WorkflowType::AllIngestion,
        &PauseScope::Global,
        Some(SourceKind::SerpApiGoogleNews),
    )
    .await;
    assert_eq!(stats.sources_redriven, 1);
}

#[tokio::test]
async fn editorial_redrive_is_capped_and_newest_first() {
    let h = harness(2);
    for (id, minute) in [("old", 1), ("mid", 2), ("new", 3)] {
        h.backlog.push(PendingEditorial {
            item_id: id.into(),
            tenant_id: "t1".into(),
            published_at: Utc.with_ymd_and_hms(2025, 6, 15, 11, minute, 0).unwrap(),
        });
    }

    let stats = backlog::process_backlog(
        &h.engine,
        WorkflowType::Editorialisation,
        &PauseScope::Tenant {
            tenant: "t1".into(),
        },
        None,
    )
    .await;
    assert_eq!(stats.editorials_dispatched, 2);
    assert_eq!(stats.sources_redriven, 0);
    assert_eq!(h.dispatcher.dispatched(), vec!["new", "mid"]);
}

#[tokio::test]
async fn editorial_redrive_scopes_to_the_resumed_tenant() {
    let h = harness(10);
    h.backlog.push(PendingEditorial {
        item_id: "t1-item".into(),
        tenant_id: "t1".into(),
        published_at: h.clock.now(),
    });
    h.backlog.push(PendingEditorial {
        item_id: "t2-item".into(),
        tenant_id: "t2".into(),
        published_at: h.clock.now(),
    });

    backlog::process_backlog(
        &h.engine,
        WorkflowType::Editorialisation,
        &PauseScope::Tenant {
            tenant: "t2".into(),
        },
        None,
    )
    .await;
    assert_eq!(h.dispatcher.dispatched(), vec!["t2-item"]);
}
