//! Exercises the full HTTP surface across one ingestion cycle: schedule,
//! drain every worker item in-process, consolidate, then confirm the
//! search endpoint serves a cached page until the next consolidation
//! bumps the dataset version.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use ingest_daemon::{routes, state};
use tower::ServiceExt;

macro_rules! skip_if_no_db {
 () => {
 match std::env::var(ingest_db::ENV_DB_URL) {
 Ok(v) => v,
 Err(_) => {
 eprintln!("SKIP: INGEST_DATABASE_URL not set");
 return Ok(());
 }
 }
 };
}

async fn call(router: &axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
 let resp = router.clone().oneshot(req).await.expect("oneshot failed");
 let status = resp.status();
 let body = resp.into_body().collect().await.expect("body collect failed").to_bytes();
 (status, body)
}

#[tokio::test]
async fn scheduling_then_draining_then_consolidating_makes_rows_searchable() -> anyhow::Result<()> {
 skip_if_no_db!();
 let dir = tempfile::tempdir()?;
 let url = std::env::var(ingest_db::ENV_DB_URL)?;
 let pool = ingest_db::connect(&url).await?;
 ingest_db::migrate(&pool).await?;

 let shared = Arc::new(state::AppState::new(pool.clone(), dir.path().to_path_buf()));
 let router = routes::build_router(Arc::clone(&shared));

 let req = Request::builder()
 .method("POST")
 .uri("/v1/scheduler/run")
 .header("content-type", "application/json")
 .body(axum::body::Body::from(serde_json::json!({"feed": "demo"}).to_string()))?;
 let (status, body) = call(&router, req).await;
 assert!(status == StatusCode::ACCEPTED || status == StatusCode::OK);
 let sched: serde_json::Value = serde_json::from_slice(&body)?;

 if sched["outcome"] == "completed_immediately" {
 // An empty demo feed window legitimately produces zero partitions;
 // there is nothing further to drain or consolidate in that case.
 return Ok(());
 }

 let run_id: uuid::Uuid = serde_json::from_value(sched["run_id"].clone())?;
 let adapter = shared.feeds.get("demo").expect("demo adapter registered");

 loop {
 let outcome = ingest_worker::run_once(&pool,
 Arc::clone(&adapter),
 shared.work_items.as_ref(),
 shared.work_done.as_ref(),
 &ingest_worker::WorkerConfig::default())
 .await?;
 if matches!(outcome, ingest_worker::WorkOutcome::Idle) {
 break;
 }
 }

 let req = Request::builder()
 .method("POST")
 .uri("/v1/consolidate/run")
 .header("content-type", "application/json")
 .body(axum::body::Body::from(serde_json::json!({"run_id": run_id, "feed": "demo"}).to_string()))?;
 let (status, _body) = call(&router, req).await;
 assert_eq!(status, StatusCode::OK);

 let req = Request::builder()
 .method("GET")
 .uri("/v1/diamonds/search?feed=demo")
 .body(axum::body::Body::empty())?;
 let (status, body) = call(&router, req).await;
 assert_eq!(status, StatusCode::OK);
 let json: serde_json::Value = serde_json::from_slice(&body)?;
 assert!(!json["rows"].as_array().unwrap().is_empty());

 // Second identical request hits the in-process response cache.
 let req = Request::builder()
 .method("GET")
 .uri("/v1/diamonds/search?feed=demo")
 .body(axum::body::Body::empty())?;
 let (status, body) = call(&router, req).await;
 assert_eq!(status, StatusCode::OK);
 let json: serde_json::Value = serde_json::from_slice(&body)?;
 assert_eq!(json["cache_hit"], true);

 Ok(())
}
