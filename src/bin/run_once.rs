//! Runs the configured pipeline once and prints the run record as JSON.
//! Exit code 1 when the run failed.

use std::process::ExitCode;

use anyhow::Context;
use cfp_scout::{config, Coordinator, PipelineJob, StageStore};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();
    cfp_scout::init_tracing();

    let cfg = config::load_default().context("loading configuration")?;
    let store = StageStore::open(&cfg.storage_dir)
        .with_context(|| format!("opening storage dir {}", cfg.storage_dir.display()))?;
    let coordinator = Coordinator::new(store);
    let job = PipelineJob::from_config(&cfg)?;

    let run = job.run(&coordinator).await?;
    println!("{}", serde_json::to_string_pretty(&run)?);

    Ok(if run.is_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
