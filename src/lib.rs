// src/lib.rs
// Public library surface for the service binary, tools and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod event;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod relevance;
pub mod scheduler;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::AppConfig;
pub use crate::error::{PipelineError, RunIssue, StoreError};
pub use crate::event::{Event, FilteredEvent, UserProfile};
pub use crate::ingest::types::{EventSource, RawRecord};
pub use crate::notify::{Notifier, NotifierMux};
pub use crate::pipeline::{Coordinator, PipelineJob, PipelineRun, PipelineState, RunOutcome};
pub use crate::relevance::RelevanceFilter;
pub use crate::store::{Stage, StageStore};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Events are logged under short targets, so each one is listed.
pub const DEFAULT_LOG_FILTER: &str =
    "cfp_scout=info,pipeline=info,ingest=info,relevance=info,notify=info,scheduler=info,store=info,warn";

/// Compact tracing to stderr (JSON lines with `LOG_FORMAT=json`); `RUST_LOG`
/// overrides the default filter. Later calls are no-ops.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
