//! ingest-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, connects to
//! Postgres, builds the shared state, wires middleware, and starts the
//! HTTP server. All route handlers live in `routes.rs`; all shared state
//! types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use ingest_daemon::{routes, state};
use tower_http::{
 cors::CorsLayer,
 trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
 // Load .env.local if present (dev convenience). Silent if the file
 // does not exist — production injects env vars directly.
 let _ = dotenvy::from_filename(".env.local");

 init_tracing();

 let pool = ingest_db::connect_from_env().await?;
 ingest_db::migrate(&pool).await?;

 let watermark_dir = std::env::var("INGEST_WATERMARK_DIR").unwrap_or_else(|_| "./watermarks".to_string());
 let shared = Arc::new(state::AppState::new(pool.clone(), watermark_dir));

 state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
 state::spawn_cache_poller(pool, Arc::clone(&shared.cache), Duration::from_secs(60));

 let app = routes::build_router(Arc::clone(&shared))
 .layer(TraceLayer::new_for_http()
 .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
 .on_response(DefaultOnResponse::new().level(Level::INFO)))
 .layer(cors_localhost_only());

 let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
 info!("ingest-daemon listening on http://{}", addr);

 axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
 .await
 .context("server crashed")?;

 Ok(())
}

fn init_tracing() {
 tracing_subscriber::fmt()
 .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
 .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
 std::env::var("INGEST_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
 let allowed_origins = [
 "http://localhost",
 "http://127.0.0.1",
 "http://localhost:3000",
 "http://127.0.0.1:3000",
 "http://localhost:5173",
 "http://127.0.0.1:5173",
 ];

 let origins: Vec<HeaderValue> = allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();

 CorsLayer::new()
 .allow_origin(origins)
 .allow_methods([Method::GET, Method::POST])
 .allow_headers(tower_http::cors::Any)
}
