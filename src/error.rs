//! Error types for the pipeline core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stage Store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Stage name outside raw/normalized/filtered
    #[error("unknown stage: {0}")]
    UnknownStage(String),
}

/// Errors that stop `Coordinator::run` or an admin operation outright.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A run is already in flight on this coordinator
    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Degradations absorbed during a run and reported on `PipelineRun`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunIssue {
    SourceUnavailable { source: String, reason: String },
    NoDataCollected { sources: usize },
    FilterDegraded { reason: String },
    NotifyFailed { reason: String },
    StoreFailed { reason: String },
}

impl RunIssue {
    /// Issues that demote a finished run to partial success.
    pub fn is_partial(&self) -> bool {
        matches!(self, RunIssue::FilterDegraded { .. } | RunIssue::NotifyFailed { .. })
    }
}
