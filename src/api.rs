use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use shuttle_axum::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::error::{PipelineError, StoreError};
use crate::event::{Event, FilteredEvent};
use crate::pipeline::{Coordinator, PipelineJob, PipelineRun, PipelineState};
use crate::store::{Stage, StageCounts};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub job: Arc<PipelineJob>,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>, job: Arc<PipelineJob>) -> Self {
        Self { coordinator, job }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/status", get(status))
        .route("/stats", get(stats))
        .route("/events/{stage}", get(stage_events))
        .route("/events/{stage}/{id}", get(stage_event))
        .route("/run", post(run_now))
        .route("/admin/clean-storage", post(clean_storage))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Maps core errors onto HTTP statuses with a `{ "error": .. }` body.
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::AlreadyRunning => ApiError::Conflict(e.to_string()),
            PipelineError::Store(StoreError::UnknownStage(s)) => {
                ApiError::NotFound(format!("unknown stage: {s}"))
            }
            PipelineError::Store(other) => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        PipelineError::Store(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, msg) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Internal(m) => {
                tracing::error!(error = %m, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (code, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}

#[derive(Serialize)]
struct StatusResp {
    running: bool,
    state: PipelineState,
    last_run: Option<PipelineRun>,
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResp>, ApiError> {
    let c = &state.coordinator;
    Ok(Json(StatusResp {
        running: c.is_running(),
        state: c.current_state(),
        last_run: c.latest_run()?,
    }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<StageCounts>, ApiError> {
    Ok(Json(state.coordinator.statistics()?))
}

async fn stage_events(
    State(state): State<AppState>,
    Path(stage): Path<String>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let stage: Stage = stage.parse()?;
    Ok(Json(state.coordinator.store().load(stage)?))
}

async fn stage_event(
    State(state): State<AppState>,
    Path((stage, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let store = state.coordinator.store();
    let found = match stage.parse::<Stage>()? {
        Stage::Raw => {
            return Err(ApiError::NotFound(
                "raw records have no id; use /events/raw".to_string(),
            ))
        }
        Stage::Normalized => store
            .load::<Event>(Stage::Normalized)?
            .into_iter()
            .find(|e| e.id == id)
            .map(serde_json::to_value),
        Stage::Filtered => store
            .load::<FilteredEvent>(Stage::Filtered)?
            .into_iter()
            .find(|e| e.event.id == id)
            .map(serde_json::to_value),
    };
    match found {
        Some(Ok(v)) => Ok(Json(v)),
        Some(Err(e)) => Err(ApiError::Internal(e.to_string())),
        None => Err(ApiError::NotFound(format!("no event {id} in {stage}"))),
    }
}

async fn run_now(State(state): State<AppState>) -> Result<Json<PipelineRun>, ApiError> {
    tracing::info!(target: "pipeline", "run requested over http");
    Ok(Json(state.job.run(&state.coordinator).await?))
}

async fn clean_storage(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.coordinator.clear_storage()?;
    Ok(StatusCode::NO_CONTENT)
}
