//! Coordinator HTTP API
//!
//! The system boundary consumed by the gateway and by the registry. Quorum
//! and membership errors translate to HTTP status codes here; the protocol
//! logic itself lives in the [`Coordinator`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use super::Coordinator;
use crate::error::Result;
use crate::protocol::{
    AckResponse, CatchupRequest, KillResponse, NodeDiedRequest, ReadResponse, SpawnRequest,
    SpawnResponse, StatusResponse, WriteRequest, WriteResponse,
};

/// Build the coordinator's router
pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/write", post(handle_write))
        .route("/read/:key", get(handle_read))
        .route("/spawn", post(handle_spawn))
        .route("/kill/:node_id", post(handle_kill))
        .route("/status", get(handle_status))
        .route("/catchup", post(handle_catchup))
        .route("/node-died", post(handle_node_died))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(coordinator)
}

async fn handle_write(
    State(coordinator): State<Arc<Coordinator>>,
    Json(req): Json<WriteRequest>,
) -> Result<Json<WriteResponse>> {
    coordinator.write(req).await.map(Json)
}

async fn handle_read(
    State(coordinator): State<Arc<Coordinator>>,
    Path(key): Path<String>,
) -> Result<Json<ReadResponse>> {
    coordinator.read(&key).await.map(Json)
}

async fn handle_spawn(
    State(coordinator): State<Arc<Coordinator>>,
    req: Option<Json<SpawnRequest>>,
) -> Result<Json<SpawnResponse>> {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    coordinator.spawn(req).await.map(Json)
}

async fn handle_kill(
    State(coordinator): State<Arc<Coordinator>>,
    Path(node_id): Path<String>,
) -> Result<Json<KillResponse>> {
    coordinator.kill(&node_id).await.map(Json)
}

async fn handle_status(State(coordinator): State<Arc<Coordinator>>) -> Json<StatusResponse> {
    Json(coordinator.status().await)
}

async fn handle_catchup(
    State(coordinator): State<Arc<Coordinator>>,
    Json(req): Json<CatchupRequest>,
) -> Result<Json<AckResponse>> {
    coordinator.catch_up(&req.node_id, req.url).await?;
    Ok(Json(AckResponse::ok()))
}

async fn handle_node_died(
    State(coordinator): State<Arc<Coordinator>>,
    Json(req): Json<NodeDiedRequest>,
) -> Json<AckResponse> {
    coordinator.node_died(&req.node_id).await;
    Json(AckResponse::ok())
}

async fn handle_health(State(coordinator): State<Arc<Coordinator>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "can_write": coordinator.can_write().await,
        "can_read": coordinator.can_read().await,
    }))
}
