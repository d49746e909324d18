use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::Extension, extract::Query, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::Sender as BroadcastSender;
use tower_http::cors::CorsLayer;

use crate::orchestrator::{unix_now, PollStatus};
use crate::storage::buffer::Buffer;
use crate::views::{ChartKind, ChartPhase, DashboardViews, Field, RangeBucket, SeriesView, TimeBucket};

#[derive(Deserialize)]
pub struct SeriesQuery {
    pub field: Option<Field>,
    /// Override the wall clock, mostly for replaying a snapshot.
    pub now: Option<i64>,
}

#[derive(Serialize)]
pub struct StateResponse {
    pub charts: BTreeMap<ChartKind, ChartPhase>,
    pub samples: usize,
    pub last_timestamp: Option<i64>,
}

pub fn router(state: Arc<crate::AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/state", get(state_handler))
        .route("/api/status", get(status_handler))
        .route("/api/series", get(series_handler))
        .route("/api/distribution", get(distribution_handler))
        .route("/api/time-buckets", get(time_buckets_handler))
        .route("/api/current", get(current_handler))
        .layer(Extension(state))
        // the chart renderer is served from its own origin
        .layer(CorsLayer::permissive())
}

pub async fn run(state: Arc<crate::AppState>, addr: SocketAddr, shutdown: BroadcastSender<()>) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "dashboard listening");
    let mut shutdown_sub = shutdown.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_sub.recv().await;
        })
        .await?;
    Ok(())
}

/// Latest published buffer and the view cache. Each projection registers the
/// buffer with its own chart.
async fn latest(state: &crate::AppState) -> (Buffer, tokio::sync::MutexGuard<'_, DashboardViews>) {
    let buffer = state.buffer.borrow().clone();
    let views = state.views.lock().await;
    (buffer, views)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn state_handler(Extension(state): Extension<Arc<crate::AppState>>) -> Json<StateResponse> {
    let (buffer, views) = latest(&state).await;
    Json(StateResponse {
        charts: views.phases(),
        samples: buffer.len(),
        last_timestamp: buffer.last_timestamp(),
    })
}

async fn status_handler(Extension(state): Extension<Arc<crate::AppState>>) -> Json<PollStatus> {
    Json(state.status.borrow().clone())
}

async fn series_handler(
    Extension(state): Extension<Arc<crate::AppState>>,
    Query(query): Query<SeriesQuery>,
) -> Json<SeriesView> {
    let field = query.field.unwrap_or(Field::Temperature);
    let now = query.now.unwrap_or_else(unix_now);
    let (buffer, mut views) = latest(&state).await;
    Json(views.series(&buffer, field, now))
}

async fn distribution_handler(Extension(state): Extension<Arc<crate::AppState>>) -> Json<Arc<Vec<RangeBucket>>> {
    let (buffer, mut views) = latest(&state).await;
    Json(views.distribution(&buffer))
}

async fn time_buckets_handler(Extension(state): Extension<Arc<crate::AppState>>) -> Json<Arc<Vec<TimeBucket>>> {
    let (buffer, mut views) = latest(&state).await;
    Json(views.time_buckets(&buffer))
}

async fn current_handler(Extension(state): Extension<Arc<crate::AppState>>) -> Json<serde_json::Value> {
    let (buffer, mut views) = latest(&state).await;
    let current = views.current(&buffer);
    let display = current.to_string();
    let mut body = serde_json::to_value(&current).unwrap_or_default();
    if let serde_json::Value::Object(map) = &mut body {
        map.insert("display".into(), display.into());
    }
    Json(body)
}
