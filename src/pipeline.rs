//! # Ingestion Routine
//! The single parametrized routine behind every source kind: pause check →
//! global limit checks → per-source limit check → ledger begin → fetch →
//! per-item upsert → ledger complete. Source-kind specifics are injected via
//! `ContentFetcher`; nothing here knows about RSS or SerpAPI shapes.
//!
//! Rate-limited and paused outcomes are expected control flow, not errors:
//! the routine returns early, tags the source's `last_status`, and the next
//! scheduler sweep is the retry mechanism.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;

use crate::engine::Engine;
use crate::items::UpsertOutcome;
use crate::metrics::ensure_metrics_described;

/// Attempts per dispatch for retryable fetch failures.
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Paused,
    Disabled,
    UnknownSource,
    NoFetcher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitWindow {
    GlobalMonthly,
    GlobalDaily,
    GlobalHourly,
    PerSource,
}

impl LimitWindow {
    /// Distinguishing `last_status` tag per tripped window.
    pub fn status_tag(self) -> &'static str {
        match self {
            LimitWindow::GlobalMonthly => "global_rate_limited",
            LimitWindow::GlobalDaily => "daily_rate_limited",
            LimitWindow::GlobalHourly => "hourly_rate_limited",
            LimitWindow::PerSource => "per_source_rate_limited",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Skipped {
        reason: SkipReason,
    },
    RateLimited {
        window: LimitWindow,
    },
    Completed {
        created: u32,
        updated: u32,
        failed: u32,
    },
    Failed {
        error: String,
        retryable: bool,
    },
}

/// One full pass of the routine for one source. No retries here; see
/// `dispatch_with_retry` for the job-level policy.
pub async fn run_ingestion(engine: &Engine, source_id: &str) -> IngestOutcome {
    ensure_metrics_described();

    let Some(source) = engine.sources.get(source_id) else {
        tracing::warn!(source = source_id, "ingestion requested for unknown source");
        return IngestOutcome::Skipped {
            reason: SkipReason::UnknownSource,
        };
    };

    let workflow = source.kind.workflow_type();
    if engine
        .pauses
        .paused(workflow, Some(&source.tenant_id), Some(&source.id))
    {
        tracing::info!(
            source = %source.id,
            tenant = %source.tenant_id,
            workflow = workflow.as_str(),
            "ingestion paused; skipping"
        );
        counter!("feedwarden_pause_skips_total").increment(1);
        engine.sources.update_run_status(&source.id, "skipped");
        return IngestOutcome::Skipped {
            reason: SkipReason::Paused,
        };
    }

    if !source.enabled {
        engine.sources.update_run_status(&source.id, "skipped");
        return IngestOutcome::Skipped {
            reason: SkipReason::Disabled,
        };
    }

    let Some(fetcher) = engine.fetchers.get(source.kind) else {
        tracing::warn!(
            source = %source.id,
            kind = source.kind.as_str(),
            "no fetcher registered for kind; skipping"
        );
        return IngestOutcome::Skipped {
            reason: SkipReason::NoFetcher,
        };
    };

    // Shared SerpAPI budget first, widest window first, so the status tag
    // names the window that actually tripped.
    if source.kind.is_serp_api() {
        let window = if !engine.global_limiter.allow() {
            Some(LimitWindow::GlobalMonthly)
        } else if !engine.global_limiter.allow_today() {
            Some(LimitWindow::GlobalDaily)
        } else if !engine.global_limiter.allow_this_hour() {
            Some(LimitWindow::GlobalHourly)
        } else {
            None
        };
        if let Some(window) = window {
            // The offender matters: one noisy tenant exhausts this for all.
            tracing::warn!(
                source = %source.id,
                tenant = %source.tenant_id,
                window = window.status_tag(),
                stats = ?engine.global_limiter.usage_stats(),
                "global SerpAPI budget exhausted"
            );
            counter!("feedwarden_rate_limited_total", "window" => window.status_tag())
                .increment(1);
            engine
                .sources
                .update_run_status(&source.id, window.status_tag());
            return IngestOutcome::RateLimited { window };
        }
    }

    if !engine.per_source_limiter.allowed(&source) {
        let reset_in = engine.per_source_limiter.reset_in_seconds(&source);
        tracing::info!(
            source = %source.id,
            tenant = %source.tenant_id,
            limit = source.rate_limit_per_hour(),
            reset_in_secs = reset_in,
            "per-source hourly limit reached"
        );
        counter!("feedwarden_rate_limited_total", "window" => "per_source").increment(1);
        engine
            .sources
            .update_run_status(&source.id, LimitWindow::PerSource.status_tag());
        return IngestOutcome::RateLimited {
            window: LimitWindow::PerSource,
        };
    }

    // Ledger row + `last_run_at` stamp before the fetch, so a concurrent
    // sweep sees this source as not due while the import is in flight.
    let handle = engine.ledger.begin_run(&source);
    engine.sources.update_run_status(&source.id, "running");

    let items = match fetcher.fetch(&source).await {
        Ok(items) => items,
        Err(e) => {
            let msg = e.to_string();
            tracing::warn!(source = %source.id, error = %msg, "fetch failed");
            counter!("feedwarden_fetch_errors_total").increment(1);
            engine.ledger.fail_run(handle, &msg);
            engine
                .sources
                .update_run_status(&source.id, &format!("error: {msg}"));
            return IngestOutcome::Failed {
                error: msg,
                retryable: e.is_retryable(),
            };
        }
    };

    let mut created = 0u32;
    let mut updated = 0u32;
    let mut failed = 0u32;
    for item in &items {
        // One malformed item never aborts the batch.
        let canonical = match engine.canonicalizer.canonicalize(&item.url) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(source = %source.id, url = %item.url, error = %e, "bad item url");
                failed += 1;
                continue;
            }
        };
        match engine
            .sink
            .upsert(&source.tenant_id, &canonical, item, &source.id)
            .await
        {
            Ok(UpsertOutcome::Created) => created += 1,
            Ok(UpsertOutcome::Updated) => updated += 1,
            Err(e) => {
                tracing::warn!(source = %source.id, url = %canonical, error = %e, "item upsert failed");
                failed += 1;
            }
        }
    }

    engine.ledger.complete_run(handle, created, updated, failed);
    engine.sources.update_run_status(&source.id, "success");
    counter!("feedwarden_items_created_total").increment(created as u64);
    counter!("feedwarden_items_updated_total").increment(updated as u64);
    counter!("feedwarden_items_failed_total").increment(failed as u64);
    tracing::info!(
        source = %source.id,
        tenant = %source.tenant_id,
        created,
        updated,
        failed,
        "ingestion completed"
    );
    IngestOutcome::Completed {
        created,
        updated,
        failed,
    }
}

/// Job-level retry wrapper used by the scheduler and the backlog processor:
/// up to 3 attempts with exponential backoff, only for retryable fetch
/// failures. Skips and rate limits are never retried — the next sweep is.
pub async fn dispatch_with_retry(engine: Arc<Engine>, source_id: String) -> IngestOutcome {
    let mut attempt = 1u32;
    loop {
        let outcome = run_ingestion(&engine, &source_id).await;
        match &outcome {
            IngestOutcome::Failed { retryable: true, .. } if attempt < MAX_ATTEMPTS => {
                let delay = std::time::Duration::from_secs(2u64.pow(attempt));
                tracing::info!(
                    source = %source_id,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "retrying after fetch failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            _ => return outcome,
        }
    }
}
