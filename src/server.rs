//! ==============================================================================
//! server.rs - json api
//! ==============================================================================
//!
//! purpose:
//!     exposes the poll cache over HTTP:
//!     - GET /sensors  -> {"sensors":[{"id":...,"value":...},...]}
//!     - GET /health   -> {"status":"ok"|"no_data","sensors":<count>}
//!
//!     handlers only ever read the cache snapshot; they never trigger a
//!     refresh and never block the poll loop.
//!
//! relationships:
//!     - uses: cache.rs (snapshot)
//!     - used by: main.rs (bind + serve with graceful shutdown)
//!
//! ==============================================================================

use crate::cache::PollCache;
use crate::domain::Reading;

use anyhow::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

#[derive(Serialize)]
struct SensorsResponse {
    sensors: Vec<Reading>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    sensors: usize,
}

pub fn router(cache: Arc<PollCache>) -> Router {
    Router::new()
        .route("/sensors", get(sensors_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(cache)
}

/// serve the API on an already-bound listener until `shutdown` resolves.
/// binding happens in main so that a bind failure is fatal to the process.
pub async fn serve<F>(listener: TcpListener, cache: Arc<PollCache>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(cache))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn sensors_handler(State(cache): State<Arc<PollCache>>) -> Json<SensorsResponse> {
    let snapshot = cache.snapshot().await;
    Json(SensorsResponse {
        sensors: snapshot.as_ref().clone(),
    })
}

async fn health_handler(State(cache): State<Arc<PollCache>>) -> Json<HealthResponse> {
    let snapshot = cache.snapshot().await;
    let status = if snapshot.is_empty() { "no_data" } else { "ok" };
    Json(HealthResponse {
        status,
        sensors: snapshot.len(),
    })
}
