//! CFP Scout service entrypoint.
//! Loads config, wires the pipeline, serves the HTTP API and runs the daily scheduler.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;

use cfp_scout::{
    api, config, metrics::Metrics, scheduler, Coordinator, PipelineJob, RelevanceFilter, StageStore,
};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    cfp_scout::init_tracing();

    let cfg = config::load_default().context("loading configuration")?;
    let metrics = Metrics::init()?;

    let store = StageStore::open(&cfg.storage_dir)
        .with_context(|| format!("opening storage dir {}", cfg.storage_dir.display()))?;
    let coordinator = Arc::new(Coordinator::new(store));
    let job = Arc::new(PipelineJob::from_config(&cfg).context("building pipeline job")?);

    if cfg.schedule.enabled {
        let at = cfg.schedule.at().context("schedule time")?;
        scheduler::spawn_daily(coordinator.clone(), job.clone(), at);
    } else {
        tracing::info!(target: "scheduler", "daily schedule disabled");
    }

    tracing::info!(
        storage = %cfg.storage_dir.display(),
        sources = job.sources.len(),
        filter = job.filter.name(),
        "cfp scout ready"
    );

    let router = api::router(api::AppState::new(coordinator, job)).merge(metrics.router());
    Ok(router.into())
}
