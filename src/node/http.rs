//! Node HTTP API
//!
//! Data, replication, snapshot, catch-up, and health endpoints. Role checks
//! live in the [`KvNode`] operations; handlers only translate between HTTP
//! and the node runtime.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use super::KvNode;
use crate::error::{Error, Result};
use crate::protocol::{
    CatchupResponse, DataDumpResponse, DataReadResponse, DataWriteRequest, DataWriteResponse,
    HealthResponse, RegisterFollowerRequest, RegisterFollowerResponse, ReplicateRequest,
    ReplicateResponse, Snapshot,
};

/// Build the node's router
pub fn router(node: Arc<KvNode>) -> Router {
    Router::new()
        .route("/data", post(handle_write).get(handle_dump))
        .route("/data/:key", get(handle_read))
        .route("/replicate", post(handle_replicate))
        .route("/catchup", post(handle_catchup))
        .route("/snapshot", get(handle_snapshot))
        .route("/register-follower", post(handle_register_follower))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

async fn handle_write(
    State(node): State<Arc<KvNode>>,
    Json(req): Json<DataWriteRequest>,
) -> Result<Json<DataWriteResponse>> {
    node.write(req).await.map(Json)
}

async fn handle_read(
    State(node): State<Arc<KvNode>>,
    Path(key): Path<String>,
) -> Result<Json<DataReadResponse>> {
    match node.store().get(&key).await {
        Some(record) => Ok(Json(DataReadResponse {
            key,
            value: record.value,
            version: record.version,
        })),
        None => Err(Error::KeyNotFound(key)),
    }
}

async fn handle_dump(State(node): State<Arc<KvNode>>) -> Json<DataDumpResponse> {
    let data = node.store().dump().await;
    let count = data.len();
    Json(DataDumpResponse { data, count })
}

async fn handle_replicate(
    State(node): State<Arc<KvNode>>,
    Json(req): Json<ReplicateRequest>,
) -> Result<Json<ReplicateResponse>> {
    node.receive_replication(req).await.map(Json)
}

async fn handle_catchup(
    State(node): State<Arc<KvNode>>,
    Json(snapshot): Json<Snapshot>,
) -> Json<CatchupResponse> {
    Json(node.receive_catchup(snapshot).await)
}

async fn handle_snapshot(State(node): State<Arc<KvNode>>) -> Json<Snapshot> {
    Json(node.snapshot().await)
}

async fn handle_register_follower(
    State(node): State<Arc<KvNode>>,
    Json(req): Json<RegisterFollowerRequest>,
) -> Result<Json<RegisterFollowerResponse>> {
    node.register_follower(req.url).await.map(Json)
}

async fn handle_health(State(node): State<Arc<KvNode>>) -> Json<HealthResponse> {
    Json(node.health())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NodeConfig, Timeouts};
    use crate::protocol::{NodeRole, ReplicateStatus};
    use reqwest::StatusCode;

    /// Bind an ephemeral port and serve a node in the background
    async fn start_node(node_id: &str, role: NodeRole) -> (Arc<KvNode>, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = NodeConfig {
            node_id: node_id.to_string(),
            host: "127.0.0.1".to_string(),
            port,
            role,
            leader_url: None,
            registry_url: "http://127.0.0.1:1".to_string(),
            replication_delay_secs: 0.0,
            timeouts: Timeouts::default(),
        };

        let node = Arc::new(KvNode::new(config).unwrap());
        let app = router(Arc::clone(&node));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = format!("http://127.0.0.1:{port}");
        (node, url)
    }

    #[tokio::test]
    async fn follower_rejects_primary_writes() {
        let (_node, url) = start_node("follower-1", NodeRole::Follower).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{url}/data"))
            .json(&DataWriteRequest {
                key: "k1".to_string(),
                value: "v1".to_string(),
                sync_followers: vec![],
                async_followers: vec![],
            })
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn leader_write_fans_out_to_sync_followers() {
        let (_leader, leader_url) = start_node("leader", NodeRole::Leader).await;
        let (_f1, f1_url) = start_node("follower-1", NodeRole::Follower).await;
        let (_f2, f2_url) = start_node("follower-2", NodeRole::Follower).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{leader_url}/data"))
            .json(&DataWriteRequest {
                key: "k1".to_string(),
                value: "hello".to_string(),
                sync_followers: vec![f1_url.clone(), f2_url.clone()],
                async_followers: vec![],
            })
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body: DataWriteResponse = resp.json().await.unwrap();
        assert_eq!(body.version, 1);
        assert_eq!(body.replication.sync_acks, 2);
        assert!(body
            .replication
            .sync_acked_by
            .contains(&"follower-1".to_string()));

        // Followers now serve the replicated value
        let read: DataReadResponse = client
            .get(format!("{f1_url}/data/k1"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(read.value, "hello");
        assert_eq!(read.version, 1);
    }

    #[tokio::test]
    async fn unreachable_sync_follower_reduces_acks() {
        let (_leader, leader_url) = start_node("leader", NodeRole::Leader).await;
        let (_f1, f1_url) = start_node("follower-1", NodeRole::Follower).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{leader_url}/data"))
            .json(&DataWriteRequest {
                key: "k1".to_string(),
                value: "v".to_string(),
                // Second target refuses connections; the write still commits
                sync_followers: vec![f1_url, "http://127.0.0.1:1".to_string()],
                async_followers: vec![],
            })
            .send()
            .await
            .unwrap();

        let body: DataWriteResponse = resp.json().await.unwrap();
        assert_eq!(body.version, 1);
        assert_eq!(body.replication.sync_acks, 1);
        assert_eq!(body.replication.sync_acked_by, vec!["follower-1"]);
    }

    #[tokio::test]
    async fn stale_replication_is_rejected_over_http() {
        let (_follower, url) = start_node("follower-1", NodeRole::Follower).await;
        let client = reqwest::Client::new();

        let newer = ReplicateRequest {
            key: "k1".to_string(),
            value: "v2".to_string(),
            version: 2,
            source: "leader".to_string(),
        };
        let resp: ReplicateResponse = client
            .post(format!("{url}/replicate"))
            .json(&newer)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resp.status, ReplicateStatus::Accepted);

        let stale = ReplicateRequest {
            key: "k1".to_string(),
            value: "v1".to_string(),
            version: 1,
            source: "leader".to_string(),
        };
        let resp: ReplicateResponse = client
            .post(format!("{url}/replicate"))
            .json(&stale)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resp.status, ReplicateStatus::Rejected);
        assert_eq!(resp.version, 2);

        // The follower still holds the newer value
        let read: DataReadResponse = client
            .get(format!("{url}/data/k1"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(read.value, "v2");
    }

    #[tokio::test]
    async fn replication_to_leader_is_forbidden() {
        let (_leader, url) = start_node("leader", NodeRole::Leader).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{url}/replicate"))
            .json(&ReplicateRequest {
                key: "k1".to_string(),
                value: "v1".to_string(),
                version: 1,
                source: "rogue".to_string(),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn snapshot_feeds_catchup() {
        let (leader, leader_url) = start_node("leader", NodeRole::Leader).await;
        let (_follower, follower_url) = start_node("follower-1", NodeRole::Follower).await;

        leader.store().write("k1", "v1").await;
        leader.store().write("k2", "v2").await;
        leader.store().write("k2", "v2b").await;

        let client = reqwest::Client::new();
        let snapshot: Snapshot = client
            .get(format!("{leader_url}/snapshot"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(snapshot.len(), 2);

        let caught_up: CatchupResponse = client
            .post(format!("{follower_url}/catchup"))
            .json(&snapshot)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(caught_up.keys_received, 2);

        // Follower state now equals the leader snapshot, versions included
        let read: DataReadResponse = client
            .get(format!("{follower_url}/data/k2"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(read.value, "v2b");
        assert_eq!(read.version, 2);
    }

    #[tokio::test]
    async fn missing_key_reads_404() {
        let (_node, url) = start_node("follower-1", NodeRole::Follower).await;
        let resp = reqwest::get(format!("{url}/data/absent")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn register_follower_is_leader_only() {
        let (_leader, leader_url) = start_node("leader", NodeRole::Leader).await;
        let (_follower, follower_url) = start_node("follower-1", NodeRole::Follower).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{follower_url}/register-follower"))
            .json(&RegisterFollowerRequest {
                url: "http://127.0.0.1:7002".to_string(),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let body: RegisterFollowerResponse = client
            .post(format!("{leader_url}/register-follower"))
            .json(&RegisterFollowerRequest {
                url: "http://127.0.0.1:7002".to_string(),
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body.followers, vec!["http://127.0.0.1:7002"]);
    }

    #[tokio::test]
    async fn health_reports_identity_and_role() {
        let (_node, url) = start_node("follower-3", NodeRole::Follower).await;
        let health: HealthResponse = reqwest::get(format!("{url}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.node_id, "follower-3");
        assert_eq!(health.role, NodeRole::Follower);
    }
}
