// src/pipeline.rs
//! Pipeline Coordinator: one run = collect -> normalize -> dedup -> filter -> notify,
//! with each stage checkpointed in the Stage Store and the run record persisted last.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::{PipelineError, RunIssue, StoreError};
use crate::event::{Event, FilteredEvent, UserProfile};
use crate::ingest::{self, providers, types::EventSource};
use crate::notify::{DynNotifier, Notifier, NotifierMux};
use crate::relevance::{self, DynFilter, RelevanceFilter};
use crate::store::{Stage, StageCounts, StageStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Collecting,
    Normalizing,
    Deduplicating,
    Filtering,
    Notifying,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    PartialSuccess,
    Failed,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::PartialSuccess => "partial_success",
            RunOutcome::Failed => "failed",
        }
    }
}

/// Record of one pipeline run, persisted as the store's `last_run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub state: PipelineState,
    pub raw_count: usize,
    pub dropped_count: usize,
    pub normalized_count: usize,
    pub duplicate_count: usize,
    /// Events marked included by the filter.
    pub filtered_count: usize,
    pub notified: bool,
    #[serde(default)]
    pub issues: Vec<RunIssue>,
    pub outcome: RunOutcome,
}

impl PipelineRun {
    fn started(at: DateTime<Utc>) -> Self {
        Self {
            started_at: at,
            finished_at: at,
            duration_ms: 0,
            state: PipelineState::Collecting,
            raw_count: 0,
            dropped_count: 0,
            normalized_count: 0,
            duplicate_count: 0,
            filtered_count: 0,
            notified: false,
            issues: Vec::new(),
            outcome: RunOutcome::Failed,
        }
    }

    fn finish(&mut self, state: PipelineState, elapsed_ms: u64) {
        self.state = state;
        self.finished_at = Utc::now();
        self.duration_ms = elapsed_ms;
        self.outcome = if state == PipelineState::Failed {
            RunOutcome::Failed
        } else if self.issues.iter().any(RunIssue::is_partial) {
            RunOutcome::PartialSuccess
        } else {
            RunOutcome::Success
        };
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == RunOutcome::Failed
    }
}

/// Owns the Stage Store and serializes runs on it.
pub struct Coordinator {
    store: StageStore,
    run_lock: tokio::sync::Mutex<()>,
    /// Set while `run` holds `run_lock`; status reads never touch the lock.
    in_flight: AtomicBool,
    state: RwLock<PipelineState>,
}

/// Clears the in-flight flag when a run ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn mark(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Coordinator {
    pub fn new(store: StageStore) -> Self {
        Self {
            store,
            run_lock: tokio::sync::Mutex::new(()),
            in_flight: AtomicBool::new(false),
            state: RwLock::new(PipelineState::Idle),
        }
    }

    pub fn store(&self) -> &StageStore {
        &self.store
    }

    pub fn current_state(&self) -> PipelineState {
        match self.state.read() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn set_state(&self, next: PipelineState) {
        let mut g = match self.state.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracing::debug!(target: "pipeline", from = ?*g, to = ?next, "state");
        *g = next;
    }

    pub fn latest_run(&self) -> Result<Option<PipelineRun>, PipelineError> {
        Ok(self.store.load_run()?)
    }

    pub fn statistics(&self) -> Result<StageCounts, PipelineError> {
        Ok(self.store.counts()?)
    }

    /// Empties every stage slot and the run record.
    pub fn clear_storage(&self) -> Result<(), PipelineError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| PipelineError::AlreadyRunning)?;
        self.store.clear()?;
        self.set_state(PipelineState::Idle);
        tracing::info!(target: "pipeline", dir = %self.store.dir().display(), "storage cleared");
        Ok(())
    }

    /// Runs the whole pipeline once. Degradations are recorded on the returned
    /// run; `Err` means the run was rejected or its record could not be saved.
    pub async fn run(
        &self,
        sources: &[Box<dyn EventSource>],
        profile: &UserProfile,
        filter: &dyn RelevanceFilter,
        notifier: &dyn Notifier,
    ) -> Result<PipelineRun, PipelineError> {
        let _guard = self.run_lock.try_lock().map_err(|_| {
            tracing::warn!(target: "pipeline", "run rejected: already running");
            PipelineError::AlreadyRunning
        })?;
        let _in_flight = InFlight::mark(&self.in_flight);
        crate::metrics::ensure_described();

        let clock = Instant::now();
        let mut run = PipelineRun::started(Utc::now());
        tracing::info!(target: "pipeline", sources = sources.len(), filter = filter.name(), "run started");

        let end_state = match self.execute(&mut run, sources, profile, filter, notifier).await {
            Ok(()) => PipelineState::Done,
            Err(issue) => {
                tracing::error!(target: "pipeline", issue = ?issue, "run failed");
                run.issues.push(issue);
                PipelineState::Failed
            }
        };
        run.finish(end_state, clock.elapsed().as_millis() as u64);
        self.set_state(end_state);

        counter!("cfp_pipeline_runs_total", "outcome" => run.outcome.as_str()).increment(1);
        gauge!("cfp_pipeline_last_run_ts").set(run.finished_at.timestamp() as f64);
        histogram!("cfp_pipeline_duration_ms").record(run.duration_ms as f64);
        tracing::info!(
            target: "pipeline",
            outcome = run.outcome.as_str(),
            raw = run.raw_count,
            dropped = run.dropped_count,
            normalized = run.normalized_count,
            duplicates = run.duplicate_count,
            included = run.filtered_count,
            notified = run.notified,
            issues = run.issues.len(),
            duration_ms = run.duration_ms,
            "run finished"
        );

        self.store.save_run(&run)?;
        Ok(run)
    }

    /// `Err` carries the issue that stopped the run.
    async fn execute(
        &self,
        run: &mut PipelineRun,
        sources: &[Box<dyn EventSource>],
        profile: &UserProfile,
        filter: &dyn RelevanceFilter,
        notifier: &dyn Notifier,
    ) -> Result<(), RunIssue> {
        self.set_state(PipelineState::Collecting);
        let collected = ingest::collect(sources).await;
        run.issues.extend(collected.degraded.iter().map(|d| RunIssue::SourceUnavailable {
            source: d.source.clone(),
            reason: d.reason.clone(),
        }));
        if collected.all_degraded(sources.len()) {
            return Err(RunIssue::NoDataCollected {
                sources: sources.len(),
            });
        }
        run.raw_count = collected.records.len();

        self.set_state(PipelineState::Normalizing);
        let normalized = ingest::normalize(&collected.records, Utc::now().date_naive());
        run.dropped_count = normalized.dropped;
        run.normalized_count = normalized.events.len();
        counter!("cfp_records_dropped_total").increment(normalized.dropped as u64);
        self.checkpoint(Stage::Raw, &collected.records)?;
        self.checkpoint(Stage::Normalized, &normalized.events)?;

        self.set_state(PipelineState::Deduplicating);
        let deduped = ingest::deduplicate(normalized.events);
        run.duplicate_count = deduped.removed;
        counter!("cfp_duplicates_removed_total").increment(deduped.removed as u64);
        self.checkpoint(Stage::Normalized, &deduped.events)?;
        let events = deduped.events;

        self.set_state(PipelineState::Filtering);
        let filtered = self.apply_filter(run, &events, profile, filter).await;
        run.filtered_count = filtered.iter().filter(|f| f.included).count();
        counter!("cfp_events_included_total").increment(run.filtered_count as u64);
        self.checkpoint(Stage::Filtered, &filtered)?;

        self.set_state(PipelineState::Notifying);
        let included: Vec<FilteredEvent> = filtered.into_iter().filter(|f| f.included).collect();
        if included.is_empty() {
            tracing::info!(target: "pipeline", "no included events, skipping notification");
        } else {
            match notifier.notify(&included).await {
                Ok(()) => run.notified = true,
                Err(e) => {
                    tracing::warn!(target: "pipeline", notifier = notifier.name(), error = ?e, "notification failed");
                    run.issues.push(RunIssue::NotifyFailed {
                        reason: format!("{e:#}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Filter output, or neutral pass-through when the filter fails or answers badly.
    async fn apply_filter(
        &self,
        run: &mut PipelineRun,
        events: &[Event],
        profile: &UserProfile,
        filter: &dyn RelevanceFilter,
    ) -> Vec<FilteredEvent> {
        let reason = match filter.filter(events, profile).await {
            Ok(out) => match relevance::validate_filtered(events, &out) {
                Ok(()) => return out,
                Err(reason) => reason,
            },
            Err(e) => format!("{e:#}"),
        };
        tracing::warn!(target: "pipeline", filter = filter.name(), %reason, "filter degraded, passing events through");
        run.issues.push(RunIssue::FilterDegraded { reason });
        relevance::neutral_pass_through(events)
    }

    fn checkpoint<T: Serialize>(&self, stage: Stage, records: &[T]) -> Result<(), RunIssue> {
        self.store
            .save(stage, records)
            .map_err(|e: StoreError| RunIssue::StoreFailed {
                reason: format!("saving {stage}: {e}"),
            })
    }
}

/// The configured collaborators for scheduled and on-demand runs.
pub struct PipelineJob {
    pub sources: Vec<Box<dyn EventSource>>,
    pub profile: UserProfile,
    pub filter: DynFilter,
    pub notifier: DynNotifier,
}

impl PipelineJob {
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            sources: providers::build_sources(&cfg.sources)?,
            profile: cfg.profile.clone(),
            filter: relevance::build_filter(&cfg.ollama)?,
            notifier: Arc::new(NotifierMux::from_config(&cfg.notify)?),
        })
    }

    pub async fn run(&self, coordinator: &Coordinator) -> Result<PipelineRun, PipelineError> {
        coordinator
            .run(
                &self.sources,
                &self.profile,
                self.filter.as_ref(),
                self.notifier.as_ref(),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_follows_issues() {
        let mut run = PipelineRun::started(Utc::now());
        run.issues.push(RunIssue::SourceUnavailable {
            source: "a".into(),
            reason: "down".into(),
        });
        run.finish(PipelineState::Done, 5);
        assert_eq!(run.outcome, RunOutcome::Success);

        run.issues.push(RunIssue::NotifyFailed {
            reason: "smtp".into(),
        });
        run.finish(PipelineState::Done, 5);
        assert_eq!(run.outcome, RunOutcome::PartialSuccess);

        run.finish(PipelineState::Failed, 5);
        assert!(run.is_failed());
    }

    #[test]
    fn run_record_serializes_snake_case() {
        let mut run = PipelineRun::started(Utc::now());
        run.finish(PipelineState::Done, 1);
        let v = serde_json::to_value(&run).unwrap();
        assert_eq!(v["state"], "done");
        assert_eq!(v["outcome"], "success");
    }

    #[tokio::test]
    async fn fresh_coordinator_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let c = Coordinator::new(StageStore::open(dir.path()).unwrap());
        assert_eq!(c.current_state(), PipelineState::Idle);
        assert!(!c.is_running());
        assert!(c.latest_run().unwrap().is_none());
        assert_eq!(c.statistics().unwrap(), StageCounts::default());
    }
}
