// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /status, /stats before and after POST /run
// - GET /events/{stage} and /events/{stage}/{id}, 404s
// - POST /admin/clean-storage
// - 409 while a run is in flight

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use cfp_scout::api::{self, AppState};
use cfp_scout::ingest::providers::StaticSource;
use cfp_scout::notify::{DynNotifier, LogNotifier};
use cfp_scout::relevance::{DynFilter, KeywordFilter};
use cfp_scout::{Coordinator, EventSource, PipelineJob, RawRecord, StageStore, UserProfile};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

struct Sleepy;

#[async_trait::async_trait]
impl EventSource for Sleepy {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(vec![RawRecord::new("sleepy")
            .with("title", "Late Conf")
            .with("link", "https://late.dev")])
    }
    fn name(&self) -> &str {
        "sleepy"
    }
}

fn job(sources: Vec<Box<dyn EventSource>>) -> Arc<PipelineJob> {
    let filter: DynFilter = Arc::new(KeywordFilter);
    let notifier: DynNotifier = Arc::new(LogNotifier);
    Arc::new(PipelineJob {
        sources,
        profile: UserProfile {
            interests: vec!["rust".into()],
            min_score: 0.6,
        },
        filter,
        notifier,
    })
}

fn static_job() -> Arc<PipelineJob> {
    job(vec![Box::new(StaticSource::new(
        "fixture",
        vec![
            RawRecord::new("")
                .with("title", "RustConf")
                .with("link", "https://rustconf.com")
                .with("tags", serde_json::json!(["rust"])),
            RawRecord::new("")
                .with("title", "PHP Days")
                .with("link", "https://phpdays.dev"),
        ],
    ))])
}

/// Build the same Router the binary uses, over a temp store.
fn test_app(job: Arc<PipelineJob>) -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StageStore::open(dir.path()).expect("open store");
    let coordinator = Arc::new(Coordinator::new(store));
    (dir, api::router(AppState::new(coordinator, job)))
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

async fn send_json(app: &Router, method: &str, uri: &str) -> (StatusCode, Json) {
    let (status, bytes) = send(app, method, uri).await;
    let v: Json = serde_json::from_slice(&bytes).expect("valid JSON");
    (status, v)
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let (_d, app) = test_app(static_job());
    let (status, bytes) = send(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK, "health should be 200");
    assert_eq!(String::from_utf8(bytes).unwrap().trim(), "OK");
}

#[tokio::test]
async fn status_before_any_run_is_idle() {
    let (_d, app) = test_app(static_job());
    let (status, v) = send_json(&app, "GET", "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["running"], false);
    assert_eq!(v["state"], "idle");
    assert!(v["last_run"].is_null());

    let (_, stats) = send_json(&app, "GET", "/stats").await;
    assert_eq!(stats, serde_json::json!({"raw": 0, "normalized": 0, "filtered": 0}));
}

#[tokio::test]
async fn run_then_inspect_stages() {
    let (_d, app) = test_app(static_job());

    let (status, run) = send_json(&app, "POST", "/run").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["outcome"], "success");
    assert_eq!(run["state"], "done");
    assert_eq!(run["raw_count"], 2);
    assert_eq!(run["filtered_count"], 1);

    let (_, status_body) = send_json(&app, "GET", "/status").await;
    assert_eq!(status_body["state"], "done");
    assert_eq!(status_body["last_run"]["outcome"], "success");

    let (_, stats) = send_json(&app, "GET", "/stats").await;
    assert_eq!(stats["raw"], 2);
    assert_eq!(stats["normalized"], 2);
    assert_eq!(stats["filtered"], 2);

    let (status, filtered) = send_json(&app, "GET", "/events/filtered").await;
    assert_eq!(status, StatusCode::OK);
    let arr = filtered.as_array().expect("array");
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["title"], "RustConf");
    assert_eq!(arr[0]["included"], true);

    let id = arr[0]["id"].as_str().unwrap().to_string();
    let (status, one) = send_json(&app, "GET", &format!("/events/filtered/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["link"], "https://rustconf.com");

    let (status, one) = send_json(&app, "GET", &format!("/events/normalized/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(one.get("relevance_score").is_none());
}

#[tokio::test]
async fn unknown_stage_and_event_are_404() {
    let (_d, app) = test_app(static_job());
    let (status, v) = send_json(&app, "GET", "/events/scored").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(v["error"].as_str().unwrap().contains("scored"));

    let (status, _) = send_json(&app, "GET", "/events/normalized/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn clean_storage_empties_everything() {
    let (_d, app) = test_app(static_job());
    send(&app, "POST", "/run").await;

    let (status, _) = send(&app, "POST", "/admin/clean-storage").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, stats) = send_json(&app, "GET", "/stats").await;
    assert_eq!(stats, serde_json::json!({"raw": 0, "normalized": 0, "filtered": 0}));
    let (_, v) = send_json(&app, "GET", "/status").await;
    assert!(v["last_run"].is_null());
    assert_eq!(v["state"], "idle");
}

#[tokio::test]
async fn run_in_flight_yields_409() {
    let (_d, app) = test_app(job(vec![Box::new(Sleepy)]));

    let bg = {
        let app = app.clone();
        tokio::spawn(async move { send(&app, "POST", "/run").await.0 })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (_, v) = send_json(&app, "GET", "/status").await;
    assert_eq!(v["running"], true);

    let (status, v) = send_json(&app, "POST", "/run").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(v["error"].as_str().unwrap().contains("already running"));

    let (status, _) = send_json(&app, "POST", "/admin/clean-storage").await;
    assert_eq!(status, StatusCode::CONFLICT);

    assert_eq!(bg.await.unwrap(), StatusCode::OK);
}
