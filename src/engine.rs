//! Composition root: wires the clock, stores, limiters and collaborator
//! seams into one shared `Engine` handed to the scheduler, the pipeline and
//! the admin surface.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::backlog::{EditorialBacklog, EditorialDispatcher};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::fetchers::FetcherRegistry;
use crate::items::{Canonicalizer, ItemSink};
use crate::ledger::ExecutionLedger;
use crate::pause::{PauseRegistry, WorkflowPause, WorkflowType};
use crate::rate_limit::{GlobalLimits, PerSourceRateLimiter, SerpApiGlobalRateLimiter};
use crate::source::SourceRegistry;

pub struct Engine {
    pub config: EngineConfig,
    pub clock: Arc<dyn Clock>,
    pub sources: Arc<SourceRegistry>,
    pub ledger: Arc<ExecutionLedger>,
    pub pauses: Arc<PauseRegistry>,
    pub per_source_limiter: PerSourceRateLimiter,
    pub global_limiter: SerpApiGlobalRateLimiter,
    pub fetchers: FetcherRegistry,
    pub sink: Arc<dyn ItemSink>,
    pub canonicalizer: Arc<dyn Canonicalizer>,
    pub editorial_backlog: Arc<dyn EditorialBacklog>,
    pub editorial_dispatcher: Arc<dyn EditorialDispatcher>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        fetchers: FetcherRegistry,
        sink: Arc<dyn ItemSink>,
        canonicalizer: Arc<dyn Canonicalizer>,
        editorial_backlog: Arc<dyn EditorialBacklog>,
        editorial_dispatcher: Arc<dyn EditorialDispatcher>,
    ) -> Self {
        let sources = Arc::new(SourceRegistry::new(clock.clone()));
        let ledger = Arc::new(ExecutionLedger::new(clock.clone()));
        let pauses = Arc::new(PauseRegistry::new(sources.clone(), clock.clone()));
        let per_source_limiter = PerSourceRateLimiter::new(ledger.clone(), clock.clone());
        let global_limiter = SerpApiGlobalRateLimiter::new(
            ledger.clone(),
            GlobalLimits::from_monthly(config.serp_api_monthly_limit),
            clock.clone(),
        );
        Self {
            config,
            clock,
            sources,
            ledger,
            pauses,
            per_source_limiter,
            global_limiter,
            fetchers,
            sink,
            canonicalizer,
            editorial_backlog,
            editorial_dispatcher,
        }
    }

    /// Operator snapshot: active pauses plus pending-work sizes per workflow,
    /// optionally restricted to one tenant.
    pub fn status_summary(&self, tenant: Option<&str>) -> StatusSummary {
        let now = self.clock.now();
        let due = self.sources.due_sources(now);
        let in_scope = |tenant_id: &str| tenant.is_none_or(|t| t == tenant_id);

        let mut backlog_sizes: BTreeMap<String, usize> = BTreeMap::new();
        for wt in [WorkflowType::RssIngestion, WorkflowType::SerpApiIngestion] {
            let n = due
                .iter()
                .filter(|s| s.kind.workflow_type() == wt && in_scope(&s.tenant_id))
                .count();
            backlog_sizes.insert(wt.as_str().to_string(), n);
        }
        backlog_sizes.insert(
            WorkflowType::AllIngestion.as_str().to_string(),
            due.iter().filter(|s| in_scope(&s.tenant_id)).count(),
        );
        backlog_sizes.insert(
            WorkflowType::Editorialisation.as_str().to_string(),
            self.editorial_backlog
                .pending(tenant, self.config.backlog_batch_size)
                .len(),
        );

        StatusSummary {
            active_pauses: self.pauses.active_pauses(tenant),
            backlog_sizes_by_type: backlog_sizes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub active_pauses: Vec<WorkflowPause>,
    pub backlog_sizes_by_type: BTreeMap<String, usize>,
}
