//! # Backlog Processor
//! Best-effort re-drive of work that accumulated while a workflow was
//! paused. Triggered only by resume-with-backlog: ingestion scopes re-enqueue
//! matching sources ignoring the interval-due check (they are inherently
//! overdue); editorialisation re-drives a capped batch of pending items,
//! newest first. Anything beyond the cap waits for another resume or the
//! next natural sweep.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;

use crate::engine::Engine;
use crate::pause::{PauseScope, WorkflowType};
use crate::pipeline;
use crate::source::{SourceKind, TenantId};

/// A published item still lacking AI editorialisation.
#[derive(Debug, Clone, Serialize)]
pub struct PendingEditorial {
    pub item_id: String,
    pub tenant_id: TenantId,
    pub published_at: DateTime<Utc>,
}

/// Lookup seam over the content store (out of scope here): pending items for
/// a tenant, newest first, bounded by `limit`.
pub trait EditorialBacklog: Send + Sync {
    fn pending(&self, tenant: Option<&str>, limit: usize) -> Vec<PendingEditorial>;
}

/// Dispatch seam for the AI editorialisation routine.
#[async_trait]
pub trait EditorialDispatcher: Send + Sync {
    async fn dispatch(&self, item: &PendingEditorial);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BacklogStats {
    pub sources_redriven: usize,
    pub editorials_dispatched: usize,
}

/// Re-drive work for a resumed scope. `kind_filter` optionally narrows an
/// ingestion redrive to one source kind.
pub async fn process_backlog(
    engine: &Arc<Engine>,
    workflow_type: WorkflowType,
    scope: &PauseScope,
    kind_filter: Option<SourceKind>,
) -> BacklogStats {
    let mut stats = BacklogStats::default();

    if workflow_type == WorkflowType::Editorialisation {
        let tenant = scope.tenant();
        let batch = engine
            .editorial_backlog
            .pending(tenant, engine.config.backlog_batch_size);
        for item in &batch {
            engine.editorial_dispatcher.dispatch(item).await;
        }
        stats.editorials_dispatched = batch.len();
        counter!("feedwarden_backlog_editorials_total").increment(batch.len() as u64);
        tracing::info!(
            tenant = tenant.unwrap_or("<global>"),
            dispatched = batch.len(),
            cap = engine.config.backlog_batch_size,
            "editorialisation backlog re-driven"
        );
        return stats;
    }

    // Ingestion workflows: every enabled source in scope and class is
    // considered overdue; the interval check is deliberately skipped.
    let matches_workflow = |kind: SourceKind| match workflow_type {
        WorkflowType::AllIngestion => true,
        wt => kind.workflow_type() == wt,
    };
    let in_scope = |tenant_id: &str, source_id: &str| match scope {
        PauseScope::Global => true,
        PauseScope::Tenant { tenant } => tenant == tenant_id,
        PauseScope::Source { source, .. } => source == source_id,
    };

    for source in engine.sources.list() {
        if !source.enabled
            || !matches_workflow(source.kind)
            || !in_scope(&source.tenant_id, &source.id)
        {
            continue;
        }
        if let Some(kind) = kind_filter {
            if source.kind != kind {
                continue;
            }
        }
        let engine = engine.clone();
        let id = source.id.clone();
        tokio::spawn(async move {
            pipeline::dispatch_with_retry(engine, id).await;
        });
        stats.sources_redriven += 1;
    }
    counter!("feedwarden_backlog_sources_total").increment(stats.sources_redriven as u64);
    tracing::info!(
        workflow = workflow_type.as_str(),
        redriven = stats.sources_redriven,
        "ingestion backlog re-driven"
    );
    stats
}

/// In-memory editorial backlog for tests and the demo binary.
#[derive(Debug, Default)]
pub struct MemoryEditorialBacklog {
    inner: Mutex<Vec<PendingEditorial>>,
}

impl MemoryEditorialBacklog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: PendingEditorial) {
        let mut v = self.inner.lock().expect("editorial backlog mutex poisoned");
        v.push(item);
    }
}

impl EditorialBacklog for MemoryEditorialBacklog {
    fn pending(&self, tenant: Option<&str>, limit: usize) -> Vec<PendingEditorial> {
        let v = self.inner.lock().expect("editorial backlog mutex poisoned");
        let mut out: Vec<PendingEditorial> = v
            .iter()
            .filter(|p| tenant.is_none_or(|t| p.tenant_id == t))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        out.truncate(limit);
        out
    }
}

/// Records what it was asked to dispatch; stands in for the AI routine.
#[derive(Debug, Default)]
pub struct RecordingEditorialDispatcher {
    inner: Mutex<Vec<String>>,
}

impl RecordingEditorialDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("editorial dispatcher mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl EditorialDispatcher for RecordingEditorialDispatcher {
    async fn dispatch(&self, item: &PendingEditorial) {
        let mut v = self
            .inner
            .lock()
            .expect("editorial dispatcher mutex poisoned");
        v.push(item.item_id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pending(id: &str, tenant: &str, minute: u32) -> PendingEditorial {
        PendingEditorial {
            item_id: id.into(),
            tenant_id: tenant.into(),
            published_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap(),
        }
    }

    #[test]
    fn pending_is_newest_first_and_capped() {
        let backlog = MemoryEditorialBacklog::new();
        backlog.push(pending("a", "t1", 1));
        backlog.push(pending("b", "t1", 3));
        backlog.push(pending("c", "t1", 2));
        backlog.push(pending("d", "t2", 4));

        let batch = backlog.pending(Some("t1"), 2);
        assert_eq!(
            batch.iter().map(|p| p.item_id.as_str()).collect::<Vec<_>>(),
            vec!["b", "c"]
        );
        assert_eq!(backlog.pending(None, 10).len(), 4);
    }
}
