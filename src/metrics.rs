use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time series registration (so everything shows up on /metrics even
/// before its first increment).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feedwarden_sweeps_total", "Scheduler sweeps executed.");
        describe_counter!(
            "feedwarden_dispatches_total",
            "Ingestion routines dispatched by the scheduler."
        );
        describe_counter!(
            "feedwarden_rate_limited_total",
            "Ingestion attempts rejected by a rate-limit window."
        );
        describe_counter!(
            "feedwarden_pause_skips_total",
            "Ingestion attempts skipped because a workflow pause was active."
        );
        describe_counter!("feedwarden_fetch_errors_total", "Whole-run fetch failures.");
        describe_counter!("feedwarden_fetched_items_total", "Items parsed by fetchers.");
        describe_counter!("feedwarden_items_created_total", "Items newly created.");
        describe_counter!(
            "feedwarden_items_updated_total",
            "Items deduplicated to updates."
        );
        describe_counter!(
            "feedwarden_items_failed_total",
            "Per-item failures recovered inside a run."
        );
        describe_counter!(
            "feedwarden_backlog_sources_total",
            "Sources re-driven on resume-with-backlog."
        );
        describe_counter!(
            "feedwarden_backlog_editorials_total",
            "Editorialisation items re-driven on resume-with-backlog."
        );
        describe_histogram!(
            "feedwarden_fetch_parse_ms",
            "Fetcher parse time in milliseconds."
        );
        describe_gauge!(
            "feedwarden_last_sweep_ts",
            "Unix ts of the last scheduler sweep."
        );
        describe_gauge!(
            "feedwarden_serp_monthly_limit",
            "Configured monthly SerpAPI budget."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize the Prometheus recorder and publish the configured monthly
    /// budget as a static gauge.
    pub fn init(serp_monthly_limit: u32) -> Self {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("prometheus: install recorder");

        ensure_metrics_described();
        gauge!("feedwarden_serp_monthly_limit").set(serp_monthly_limit as f64);

        Self { handle }
    }

    /// Router exposing `/metrics` in Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
