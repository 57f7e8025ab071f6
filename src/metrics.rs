use anyhow::{Context, Result};
use axum::{routing::get, Router};
use ::metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

impl Metrics {
    /// Installs the Prometheus recorder. Later calls reuse the first handle,
    /// since a process can only have one global recorder.
    pub fn init() -> Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                PrometheusBuilder::new()
                    .install_recorder()
                    .context("prometheus: install recorder")
            })?
            .clone();
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
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

pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "cfp_source_records_total",
            "Raw records fetched, labelled by source."
        );
        describe_counter!(
            "cfp_source_errors_total",
            "Source fetch/parse errors, labelled by source."
        );
        describe_histogram!("cfp_source_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!(
            "cfp_records_dropped_total",
            "Raw records dropped as malformed during normalization."
        );
        describe_counter!(
            "cfp_duplicates_removed_total",
            "Events removed by identity-key deduplication."
        );
        describe_counter!(
            "cfp_events_included_total",
            "Events marked relevant by the filter."
        );
        describe_counter!("cfp_pipeline_runs_total", "Pipeline runs by outcome.");
        describe_gauge!(
            "cfp_pipeline_last_run_ts",
            "Unix ts when the pipeline last finished."
        );
        describe_histogram!("cfp_pipeline_duration_ms", "Pipeline run duration in milliseconds.");
    });
}
