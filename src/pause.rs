//! # Workflow Pause Registry
//! Operator-issued suspensions of whole workflow classes, scoped globally,
//! per-tenant, or per-source. Pauses are purely additive: any active pause at
//! any covering scope makes the workflow paused — there is no finer-grained
//! "unpause" override. Resolved pauses are kept for audit, never deleted.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;
use crate::source::{SourceId, SourceRegistry, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    RssIngestion,
    SerpApiIngestion,
    Editorialisation,
    /// Wildcard covering every ingestion workflow (not editorialisation).
    AllIngestion,
}

impl WorkflowType {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowType::RssIngestion => "rss_ingestion",
            WorkflowType::SerpApiIngestion => "serp_api_ingestion",
            WorkflowType::Editorialisation => "editorialisation",
            WorkflowType::AllIngestion => "all_ingestion",
        }
    }

    /// Whether the `all_ingestion` wildcard covers this workflow.
    pub fn is_ingestion(self) -> bool {
        matches!(
            self,
            WorkflowType::RssIngestion | WorkflowType::SerpApiIngestion | WorkflowType::AllIngestion
        )
    }
}

impl std::str::FromStr for WorkflowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rss_ingestion" => Ok(WorkflowType::RssIngestion),
            "serp_api_ingestion" => Ok(WorkflowType::SerpApiIngestion),
            "editorialisation" => Ok(WorkflowType::Editorialisation),
            "all_ingestion" => Ok(WorkflowType::AllIngestion),
            other => Err(format!("unknown workflow type: {other}")),
        }
    }
}

/// Explicit scope variants instead of a nullable (tenant, source) pair, so
/// the precedence walk never juggles half-set options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum PauseScope {
    Global,
    Tenant { tenant: TenantId },
    Source { tenant: TenantId, source: SourceId },
}

impl PauseScope {
    pub fn tenant(&self) -> Option<&str> {
        match self {
            PauseScope::Global => None,
            PauseScope::Tenant { tenant } | PauseScope::Source { tenant, .. } => Some(tenant),
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            PauseScope::Source { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowPause {
    pub id: u64,
    pub workflow_type: WorkflowType,
    pub scope: PauseScope,
    pub paused_by: String,
    pub paused_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub resumed_by: Option<String>,
    pub resumed_at: Option<DateTime<Utc>>,
}

impl WorkflowPause {
    pub fn is_active(&self) -> bool {
        self.resumed_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    TenantAdmin(TenantId),
}

/// Operator identity for pause/resume calls; authorization is resolved here,
/// not in the (out-of-scope) admin UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn super_admin(name: &str) -> Self {
        Self {
            name: name.into(),
            role: Role::SuperAdmin,
        }
    }

    pub fn tenant_admin(name: &str, tenant: &str) -> Self {
        Self {
            name: name.into(),
            role: Role::TenantAdmin(tenant.into()),
        }
    }

    fn may_administer(&self, scope: &PauseScope) -> bool {
        match (&self.role, scope) {
            (Role::SuperAdmin, _) => true,
            (Role::TenantAdmin(_), PauseScope::Global) => false,
            (Role::TenantAdmin(own), PauseScope::Tenant { tenant })
            | (Role::TenantAdmin(own), PauseScope::Source { tenant, .. }) => own == tenant,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PauseError {
    #[error("actor {actor} may not administer pauses at this scope")]
    Unauthorized { actor: String },
    #[error("source {source_id} does not belong to tenant {tenant}")]
    SourceTenantMismatch { source_id: SourceId, tenant: TenantId },
    #[error("source-scoped pauses require a tenant")]
    SourceWithoutTenant,
    #[error("unknown source {0}")]
    UnknownSource(SourceId),
}

#[derive(Debug)]
pub struct PauseRegistry {
    inner: Mutex<Vec<WorkflowPause>>,
    next_id: Mutex<u64>,
    sources: Arc<SourceRegistry>,
    clock: Arc<dyn Clock>,
}

impl PauseRegistry {
    pub fn new(sources: Arc<SourceRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
            sources,
            clock,
        }
    }

    /// Precedence walk (any match short-circuits to paused):
    /// 1. source given: active pause on exactly this workflow and source,
    ///    under any tenant;
    /// 2. tenant given: tenant-level exact match, then the `all_ingestion`
    ///    wildcard at tenant level for ingestion workflows;
    /// 3. global exact match, then the global wildcard.
    pub fn paused(
        &self,
        workflow_type: WorkflowType,
        tenant: Option<&str>,
        source: Option<&str>,
    ) -> bool {
        let rows = self.inner.lock().expect("pause registry mutex poisoned");
        let active = |wt: WorkflowType, pred: &dyn Fn(&PauseScope) -> bool| {
            rows.iter()
                .any(|p| p.is_active() && p.workflow_type == wt && pred(&p.scope))
        };

        if let Some(s) = source {
            if active(workflow_type, &|scope| scope.source() == Some(s)) {
                return true;
            }
        }
        if let Some(t) = tenant {
            let tenant_level =
                |scope: &PauseScope| matches!(scope, PauseScope::Tenant { tenant } if tenant == t);
            if active(workflow_type, &tenant_level) {
                return true;
            }
            if workflow_type.is_ingestion() && active(WorkflowType::AllIngestion, &tenant_level) {
                return true;
            }
        }
        let global = |scope: &PauseScope| matches!(scope, PauseScope::Global);
        if active(workflow_type, &global) {
            return true;
        }
        workflow_type.is_ingestion() && active(WorkflowType::AllIngestion, &global)
    }

    /// Active pause for the exact (workflow, tenant, source) triple, if any.
    pub fn find_active(
        &self,
        workflow_type: WorkflowType,
        tenant: Option<&str>,
        source: Option<&str>,
    ) -> Option<WorkflowPause> {
        let rows = self.inner.lock().expect("pause registry mutex poisoned");
        rows.iter()
            .find(|p| {
                p.is_active()
                    && p.workflow_type == workflow_type
                    && p.scope.tenant() == tenant
                    && p.scope.source() == source
            })
            .cloned()
    }

    /// Create a pause (idempotent per active triple: an existing active pause
    /// at the same scope is returned instead of duplicated).
    pub fn pause(
        &self,
        workflow_type: WorkflowType,
        actor: &Actor,
        tenant: Option<&str>,
        source: Option<&str>,
        reason: Option<&str>,
    ) -> Result<WorkflowPause, PauseError> {
        let scope = self.resolve_scope(tenant, source)?;
        self.authorize(actor, &scope)?;

        if let Some(existing) = self.find_active(workflow_type, tenant, source) {
            return Ok(existing);
        }

        let id = {
            let mut next = self.next_id.lock().expect("pause id mutex poisoned");
            let id = *next;
            *next += 1;
            id
        };
        let pause = WorkflowPause {
            id,
            workflow_type,
            scope,
            paused_by: actor.name.clone(),
            paused_at: self.clock.now(),
            reason: reason.map(str::to_string),
            resumed_by: None,
            resumed_at: None,
        };
        let mut rows = self.inner.lock().expect("pause registry mutex poisoned");
        rows.push(pause.clone());
        Ok(pause)
    }

    /// Resolve the active pause at the exact triple, stamping resumed_by/at.
    /// Returns `None` when nothing was active there.
    pub fn resume(
        &self,
        workflow_type: WorkflowType,
        actor: &Actor,
        tenant: Option<&str>,
        source: Option<&str>,
    ) -> Result<Option<WorkflowPause>, PauseError> {
        let scope = self.resolve_scope(tenant, source)?;
        self.authorize(actor, &scope)?;

        let now = self.clock.now();
        let mut rows = self.inner.lock().expect("pause registry mutex poisoned");
        let row = rows.iter_mut().find(|p| {
            p.is_active()
                && p.workflow_type == workflow_type
                && p.scope.tenant() == tenant
                && p.scope.source() == source
        });
        Ok(row.map(|p| {
            p.resumed_by = Some(actor.name.clone());
            p.resumed_at = Some(now);
            p.clone()
        }))
    }

    /// Active pauses, optionally restricted to those affecting one tenant
    /// (global pauses affect every tenant and are always included then).
    pub fn active_pauses(&self, tenant: Option<&str>) -> Vec<WorkflowPause> {
        let rows = self.inner.lock().expect("pause registry mutex poisoned");
        rows.iter()
            .filter(|p| p.is_active())
            .filter(|p| match tenant {
                None => true,
                Some(t) => p.scope.tenant().is_none_or(|pt| pt == t),
            })
            .cloned()
            .collect()
    }

    fn resolve_scope(
        &self,
        tenant: Option<&str>,
        source: Option<&str>,
    ) -> Result<PauseScope, PauseError> {
        match (tenant, source) {
            (None, None) => Ok(PauseScope::Global),
            (Some(t), None) => Ok(PauseScope::Tenant { tenant: t.into() }),
            (None, Some(_)) => Err(PauseError::SourceWithoutTenant),
            (Some(t), Some(s)) => {
                let owner = self
                    .sources
                    .tenant_of(s)
                    .ok_or_else(|| PauseError::UnknownSource(s.into()))?;
                if owner != t {
                    return Err(PauseError::SourceTenantMismatch {
                        source_id: s.into(),
                        tenant: t.into(),
                    });
                }
                Ok(PauseScope::Source {
                    tenant: t.into(),
                    source: s.into(),
                })
            }
        }
    }

    fn authorize(&self, actor: &Actor, scope: &PauseScope) -> Result<(), PauseError> {
        if actor.may_administer(scope) {
            Ok(())
        } else {
            Err(PauseError::Unauthorized {
                actor: actor.name.clone(),
            })
        }
    }
}
