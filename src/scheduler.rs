//! # Due-Source Scheduler
//! Timer-driven sweep: every tick, find enabled sources whose interval has
//! elapsed and dispatch the ingestion routine for each, fire-and-forget.
//! Double dispatch is avoided by the routine stamping `last_run_at` at
//! ingestion start, not completion.

use std::sync::Arc;

use metrics::{counter, gauge};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::engine::Engine;
use crate::metrics::ensure_metrics_described;
use crate::pipeline;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub due: usize,
    pub dispatched: usize,
    pub skipped_no_fetcher: usize,
}

/// One sweep. Bulk-selects due sources, re-confirms `run_due` per row (the
/// bulk read and the dispatch are not atomic), and spawns the routine per
/// source without waiting for completion.
pub fn sweep_once(engine: &Arc<Engine>) -> SweepStats {
    ensure_metrics_described();
    let now = engine.clock.now();
    let due = engine.sources.due_sources(now);

    let mut stats = SweepStats {
        due: due.len(),
        ..SweepStats::default()
    };

    for source in due {
        // Row-level recheck against the current registry state.
        let still_due = engine
            .sources
            .get(&source.id)
            .map(|s| s.run_due(engine.clock.now()))
            .unwrap_or(false);
        if !still_due {
            continue;
        }

        if !engine.fetchers.supports(source.kind) {
            tracing::warn!(
                source = %source.id,
                kind = source.kind.as_str(),
                "unknown source kind in sweep; skipping"
            );
            stats.skipped_no_fetcher += 1;
            continue;
        }

        let engine = engine.clone();
        let id = source.id.clone();
        tokio::spawn(async move {
            pipeline::dispatch_with_retry(engine, id).await;
        });
        stats.dispatched += 1;
    }

    counter!("feedwarden_sweeps_total").increment(1);
    counter!("feedwarden_dispatches_total").increment(stats.dispatched as u64);
    gauge!("feedwarden_last_sweep_ts").set(now.timestamp() as f64);

    tracing::info!(
        due = stats.due,
        dispatched = stats.dispatched,
        skipped_no_fetcher = stats.skipped_no_fetcher,
        "scheduler sweep"
    );
    stats
}

/// Spawn the recurring sweep on its own task.
pub fn spawn_scheduler(engine: Arc<Engine>) -> JoinHandle<()> {
    let interval_secs = engine.config.scheduler_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            sweep_once(&engine);
        }
    })
}
