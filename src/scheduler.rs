// src/scheduler.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio::task::JoinHandle;

use crate::error::PipelineError;
use crate::pipeline::{Coordinator, PipelineJob};

/// Next occurrence of `at` (UTC) strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Spawn the daily runner. A tick that lands while a run is in flight
/// (e.g. one started over HTTP) is skipped.
pub fn spawn_daily(coordinator: Arc<Coordinator>, job: Arc<PipelineJob>, at: NaiveTime) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_run_after(now, at);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::info!(target: "scheduler", next = %next.to_rfc3339(), "next pipeline run scheduled");
            tokio::time::sleep(wait).await;

            match job.run(&coordinator).await {
                Ok(run) => tracing::info!(
                    target: "scheduler",
                    outcome = run.outcome.as_str(),
                    included = run.filtered_count,
                    "scheduled run finished"
                ),
                Err(PipelineError::AlreadyRunning) => {
                    tracing::warn!(target: "scheduler", "skipping tick, a run is already in flight")
                }
                Err(e) => tracing::error!(target: "scheduler", error = %e, "scheduled run errored"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn later_today() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 6, 30, 0).unwrap();
        assert_eq!(
            next_run_after(now, t(8, 0)),
            Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn passed_or_exact_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 8, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, t(8, 0)),
            Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap()
        );
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 23, 59, 0).unwrap();
        assert_eq!(
            next_run_after(now, t(0, 5)),
            Utc.with_ymd_and_hms(2025, 3, 2, 0, 5, 0).unwrap()
        );
    }
}
