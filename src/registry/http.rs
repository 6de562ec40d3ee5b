//! Registry HTTP API

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use super::Registry;
use crate::protocol::{
    AckResponse, DeregisterRequest, HeartbeatRequest, HeartbeatResponse, RegistryNodesResponse,
};

/// Build the registry's router
pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/heartbeat", post(handle_heartbeat))
        .route("/deregister", post(handle_deregister))
        .route("/nodes", get(handle_nodes))
        .route("/alive", get(handle_alive))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn handle_heartbeat(
    State(registry): State<Arc<Registry>>,
    Json(req): Json<HeartbeatRequest>,
) -> Json<HeartbeatResponse> {
    let node_id = req.node_id.clone();
    let url = req.url.clone();
    let (response, needs_catchup) = registry.record_heartbeat(req).await;
    if needs_catchup {
        registry.trigger_catchup(node_id, url);
    }
    Json(response)
}

async fn handle_deregister(
    State(registry): State<Arc<Registry>>,
    Json(req): Json<DeregisterRequest>,
) -> Json<AckResponse> {
    registry.deregister(&req.node_id).await;
    Json(AckResponse::ok())
}

async fn handle_nodes(State(registry): State<Arc<Registry>>) -> Json<RegistryNodesResponse> {
    Json(RegistryNodesResponse {
        nodes: registry.list_nodes().await,
    })
}

async fn handle_alive(State(registry): State<Arc<Registry>>) -> Json<RegistryNodesResponse> {
    Json(RegistryNodesResponse {
        nodes: registry.list_alive().await,
    })
}

async fn handle_health(State(_registry): State<Arc<Registry>>) -> Json<AckResponse> {
    Json(AckResponse::ok())
}
