//! Admin surface consumed by the (out-of-scope) admin UI: pause/resume,
//! status summary, usage stats, and per-source run history.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::backlog::{self, BacklogStats};
use crate::engine::Engine;
use crate::pause::{Actor, PauseError, WorkflowType};
use crate::source::SourceKind;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/admin/pause", post(pause))
        .route("/admin/resume", post(resume))
        .route("/admin/status", get(status))
        .route("/admin/usage", get(usage))
        .route("/admin/sources", get(sources))
        .route("/admin/runs", get(runs))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct PauseReq {
    workflow_type: WorkflowType,
    #[serde(default)]
    tenant: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    actor: Actor,
}

#[derive(Deserialize)]
struct ResumeReq {
    workflow_type: WorkflowType,
    #[serde(default)]
    tenant: Option<String>,
    #[serde(default)]
    source: Option<String>,
    actor: Actor,
    #[serde(default)]
    process_backlog: bool,
    /// Optional narrowing of an ingestion backlog redrive to one kind.
    #[serde(default)]
    kind_filter: Option<SourceKind>,
}

fn pause_error_response(e: PauseError) -> (StatusCode, Json<Value>) {
    let status = match e {
        PauseError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

async fn pause(
    State(state): State<AppState>,
    Json(body): Json<PauseReq>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let record = state
        .engine
        .pauses
        .pause(
            body.workflow_type,
            &body.actor,
            body.tenant.as_deref(),
            body.source.as_deref(),
            body.reason.as_deref(),
        )
        .map_err(pause_error_response)?;
    Ok(Json(json!({ "pause": record })))
}

async fn resume(
    State(state): State<AppState>,
    Json(body): Json<ResumeReq>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let resumed = state
        .engine
        .pauses
        .resume(
            body.workflow_type,
            &body.actor,
            body.tenant.as_deref(),
            body.source.as_deref(),
        )
        .map_err(pause_error_response)?;

    let backlog_stats: Option<BacklogStats> = match (&resumed, body.process_backlog) {
        (Some(record), true) => Some(
            backlog::process_backlog(
                &state.engine,
                body.workflow_type,
                &record.scope,
                body.kind_filter,
            )
            .await,
        ),
        _ => None,
    };

    Ok(Json(json!({ "resumed": resumed, "backlog": backlog_stats })))
}

#[derive(Deserialize)]
struct StatusQuery {
    #[serde(default)]
    tenant: Option<String>,
}

async fn status(State(state): State<AppState>, Query(q): Query<StatusQuery>) -> Json<Value> {
    Json(json!(state.engine.status_summary(q.tenant.as_deref())))
}

async fn usage(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "limits": state.engine.global_limiter.limits(),
        "serp_api": state.engine.global_limiter.usage_stats(),
    }))
}

async fn sources(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "sources": state.engine.sources.list() }))
}

#[derive(Deserialize)]
struct RunsQuery {
    source: String,
    #[serde(default = "default_runs_limit")]
    n: usize,
}

fn default_runs_limit() -> usize {
    20
}

async fn runs(State(state): State<AppState>, Query(q): Query<RunsQuery>) -> Json<Value> {
    Json(json!({ "runs": state.engine.ledger.recent_runs(&q.source, q.n) }))
}
