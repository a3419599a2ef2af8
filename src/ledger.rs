//! # Execution Ledger
//! Append-only record of every ingestion attempt. Both rate limiters derive
//! their counts from these rows — there is no separate counter store, so the
//! ledger is the single source of truth for quota accounting.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::source::{Source, SourceId, SourceKind, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// One row per ingestion attempt. `started_at` is set at creation and never
/// changes; status transitions `Running -> Completed | Failed` exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct ImportRun {
    pub id: u64,
    pub source_id: SourceId,
    pub tenant_id: TenantId,
    pub kind: SourceKind,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub items_created: u32,
    pub items_updated: u32,
    pub items_failed: u32,
    pub error_message: Option<String>,
}

/// Single-use token for the run opened by `begin_run`. Deliberately not
/// `Clone`: the terminal transition consumes it, so one routine cannot
/// complete the same run twice.
#[derive(Debug)]
pub struct RunHandle {
    run_id: u64,
}

impl RunHandle {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }
}

#[derive(Debug)]
pub struct ExecutionLedger {
    inner: Mutex<Vec<ImportRun>>,
    next_id: Mutex<u64>,
    clock: Arc<dyn Clock>,
}

impl ExecutionLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
            clock,
        }
    }

    /// Append a `Running` row stamped now and hand back its single-use handle.
    pub fn begin_run(&self, source: &Source) -> RunHandle {
        let id = {
            let mut next = self.next_id.lock().expect("ledger id mutex poisoned");
            let id = *next;
            *next += 1;
            id
        };
        let run = ImportRun {
            id,
            source_id: source.id.clone(),
            tenant_id: source.tenant_id.clone(),
            kind: source.kind,
            started_at: self.clock.now(),
            completed_at: None,
            status: RunStatus::Running,
            items_created: 0,
            items_updated: 0,
            items_failed: 0,
            error_message: None,
        };
        let mut rows = self.inner.lock().expect("ledger mutex poisoned");
        rows.push(run);
        RunHandle { run_id: id }
    }

    /// Terminal transition: success (possibly with per-item failures).
    pub fn complete_run(&self, handle: RunHandle, created: u32, updated: u32, failed: u32) {
        self.finish(handle.run_id, RunStatus::Completed, created, updated, failed, None);
    }

    /// Terminal transition: whole-run failure.
    pub fn fail_run(&self, handle: RunHandle, error_message: &str) {
        self.finish(
            handle.run_id,
            RunStatus::Failed,
            0,
            0,
            0,
            Some(error_message.to_string()),
        );
    }

    fn finish(
        &self,
        run_id: u64,
        status: RunStatus,
        created: u32,
        updated: u32,
        failed: u32,
        error_message: Option<String>,
    ) {
        let now = self.clock.now();
        let mut rows = self.inner.lock().expect("ledger mutex poisoned");
        if let Some(run) = rows.iter_mut().find(|r| r.id == run_id) {
            if run.status != RunStatus::Running {
                // Handle is move-only so this only happens if a caller kept
                // the id around; keep the first terminal state.
                return;
            }
            run.status = status;
            run.completed_at = Some(now);
            run.items_created = created;
            run.items_updated = updated;
            run.items_failed = failed;
            run.error_message = error_message;
        }
    }

    pub fn duration(&self, run_id: u64) -> Option<Duration> {
        let rows = self.inner.lock().expect("ledger mutex poisoned");
        rows.iter()
            .find(|r| r.id == run_id)
            .and_then(|r| r.completed_at.map(|c| c - r.started_at))
    }

    /// Count of runs for one source with `started_at >= since`. Failed runs
    /// count too: the per-source window throttles attempts, not successes.
    pub fn runs_for_source_since(&self, source_id: &str, since: DateTime<Utc>) -> usize {
        let rows = self.inner.lock().expect("ledger mutex poisoned");
        rows.iter()
            .filter(|r| r.source_id == source_id && r.started_at >= since)
            .count()
    }

    /// Oldest in-window start for a source, used for `reset_in_seconds`.
    pub fn oldest_run_in_window(
        &self,
        source_id: &str,
        since: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let rows = self.inner.lock().expect("ledger mutex poisoned");
        rows.iter()
            .filter(|r| r.source_id == source_id && r.started_at >= since)
            .map(|r| r.started_at)
            .min()
    }

    /// Count of SerpAPI-kind runs with `started_at >= since` that did not
    /// fail. A run that failed before reaching the remote API must not
    /// consume the shared budget.
    pub fn non_failed_serp_runs_since(&self, since: DateTime<Utc>) -> usize {
        let rows = self.inner.lock().expect("ledger mutex poisoned");
        rows.iter()
            .filter(|r| {
                r.kind.is_serp_api() && r.started_at >= since && r.status != RunStatus::Failed
            })
            .count()
    }

    /// Last `n` runs for a source, newest first. Admin visibility.
    pub fn recent_runs(&self, source_id: &str, n: usize) -> Vec<ImportRun> {
        let rows = self.inner.lock().expect("ledger mutex poisoned");
        let mut out: Vec<ImportRun> = rows
            .iter()
            .filter(|r| r.source_id == source_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        out.truncate(n);
        out
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("ledger mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
