use crate::error::AppError;
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json,
    Router,
};
use fsimage_exporter_refresh::{
    RefreshPhase,
    RefreshStatus,
    SnapshotStore,
};
use prometheus::{
    Encoder as _,
    Registry,
    TextEncoder,
};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub store: Arc<SnapshotStore>,
    pub phase: watch::Receiver<RefreshPhase>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .with_state(state)
}

async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let families = state.registry.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    let body = String::from_utf8(buffer)?;
    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], body))
}

async fn healthz() -> &'static str {
    "OK"
}

async fn status(State(state): State<AppState>) -> Json<RefreshStatus> {
    let phase = *state.phase.borrow();
    Json(state.store.status(phase))
}
