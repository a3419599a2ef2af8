// src/lib.rs
// Public library surface for integration tests (and embedding in the
// wider platform).

pub mod api;
pub mod backlog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod fetchers;
pub mod items;
pub mod ledger;
pub mod metrics;
pub mod pause;
pub mod pipeline;
pub mod rate_limit;
pub mod scheduler;
pub mod source;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::EngineConfig;
pub use crate::engine::Engine;
pub use crate::pause::{Actor, PauseError, PauseScope, WorkflowPause, WorkflowType};
pub use crate::pipeline::{run_ingestion, IngestOutcome};
pub use crate::source::{Source, SourceKind};
