//! Node Runtime
//!
//! A node owns a versioned key-value map. In leader mode it accepts primary
//! writes and drives the replication fan-out; in follower mode it accepts
//! replications and catch-up snapshots. Both modes heartbeat to the registry
//! and answer health, snapshot, and data-read probes.

mod heartbeat;
mod http;

pub use http::router;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::protocol::{
    CatchupResponse, DataWriteRequest, DataWriteResponse, DeregisterRequest, HealthResponse,
    HeartbeatRequest, NodeRole, RegisterFollowerResponse, ReplicateRequest, ReplicateResponse,
    ReplicateStatus, ReplicationSummary, Snapshot,
};
use crate::store::VersionedStore;

/// A single key-value replica process, leader or follower
pub struct KvNode {
    config: NodeConfig,
    store: VersionedStore,
    /// Follower URLs registered with the leader; empty on followers
    followers: RwLock<Vec<String>>,
    client: reqwest::Client,
}

impl KvNode {
    pub fn new(config: NodeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("http client: {e}")))?;

        Ok(Self {
            config,
            store: VersionedStore::new(),
            followers: RwLock::new(Vec::new()),
            client,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub fn role(&self) -> NodeRole {
        self.config.role
    }

    pub fn store(&self) -> &VersionedStore {
        &self.store
    }

    /// Leader write: bump the key's version, commit locally, then fan out.
    ///
    /// The local commit happens first and is never rolled back; a failed sync
    /// replication only reduces the ack count reported to the coordinator.
    pub async fn write(&self, req: DataWriteRequest) -> Result<DataWriteResponse> {
        if self.config.role != NodeRole::Leader {
            return Err(Error::NotLeader(self.config.node_id.clone()));
        }

        let version = self.store.write(&req.key, &req.value).await;
        tracing::info!(key = %req.key, version, "leader write committed");

        let replication = self
            .replicate(&req.key, &req.value, version, &req.sync_followers, &req.async_followers)
            .await;

        Ok(DataWriteResponse {
            status: "ok".to_string(),
            key: req.key,
            value: req.value,
            version,
            replication,
        })
    }

    /// Fan a committed write out: wait for every sync follower (each with its
    /// own timeout), queue the async followers on a detached task.
    async fn replicate(
        &self,
        key: &str,
        value: &str,
        version: u64,
        sync_followers: &[String],
        async_followers: &[String],
    ) -> ReplicationSummary {
        let payload = ReplicateRequest {
            key: key.to_string(),
            value: value.to_string(),
            version,
            source: self.config.node_id.clone(),
        };

        let sync_delay = self.config.sync_delay();
        let timeout = self.config.timeouts.replicate();
        let sends = sync_followers.iter().map(|url| {
            let client = self.client.clone();
            let payload = payload.clone();
            let url = url.clone();
            async move {
                if !sync_delay.is_zero() {
                    tokio::time::sleep(sync_delay).await;
                }
                send_replication(&client, &url, &payload, timeout).await
            }
        });

        let results = futures::future::join_all(sends).await;

        let mut sync_acked_by = Vec::new();
        for (url, result) in sync_followers.iter().zip(results) {
            match result {
                // Only an explicit accept counts as an ack; a 2xx carrying a
                // stale rejection must not satisfy the quorum
                Ok(resp) if resp.status == ReplicateStatus::Accepted => {
                    sync_acked_by.push(resp.node_id);
                }
                Ok(resp) => {
                    tracing::warn!(
                        key,
                        version,
                        follower = %resp.node_id,
                        "sync replication rejected as stale"
                    );
                }
                Err(e) => {
                    tracing::warn!(key, version, url = %url, error = %e, "sync replication failed");
                }
            }
        }

        let async_queued = async_followers.len();
        let async_delay = self.config.async_delay();
        for url in async_followers {
            let client = self.client.clone();
            let payload = payload.clone();
            let url = url.clone();
            tokio::spawn(async move {
                if !async_delay.is_zero() {
                    tokio::time::sleep(async_delay).await;
                }
                if let Err(e) = send_replication(&client, &url, &payload, timeout).await {
                    tracing::debug!(url = %url, error = %e, "async replication failed");
                }
            });
        }

        ReplicationSummary {
            sync_acks: sync_acked_by.len(),
            sync_acked_by,
            async_queued,
        }
    }

    /// Follower replication receipt
    pub async fn receive_replication(&self, req: ReplicateRequest) -> Result<ReplicateResponse> {
        if self.config.role != NodeRole::Follower {
            return Err(Error::NotFollower(self.config.node_id.clone()));
        }

        let (accepted, version) = self
            .store
            .apply_replication(&req.key, &req.value, req.version)
            .await;

        let status = if accepted {
            tracing::debug!(key = %req.key, version, source = %req.source, "replication applied");
            ReplicateStatus::Accepted
        } else {
            tracing::debug!(
                key = %req.key,
                incoming = req.version,
                current = version,
                source = %req.source,
                "replication ignored as stale"
            );
            ReplicateStatus::Rejected
        };

        Ok(ReplicateResponse {
            status,
            node_id: self.config.node_id.clone(),
            key: req.key,
            version,
        })
    }

    /// Replace local state with a full snapshot
    pub async fn receive_catchup(&self, snapshot: Snapshot) -> CatchupResponse {
        let keys_received = self.store.apply_snapshot(&snapshot).await;
        tracing::info!(keys_received, "catch-up snapshot applied");
        CatchupResponse { keys_received }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.store.snapshot().await
    }

    /// Leader-only: remember a follower URL for status reporting
    pub async fn register_follower(&self, url: String) -> Result<RegisterFollowerResponse> {
        if self.config.role != NodeRole::Leader {
            return Err(Error::NotLeader(self.config.node_id.clone()));
        }

        let mut followers = self.followers.write().await;
        if !followers.contains(&url) {
            tracing::info!(url = %url, "follower registered");
            followers.push(url);
        }

        Ok(RegisterFollowerResponse {
            followers: followers.clone(),
        })
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            node_id: self.config.node_id.clone(),
            role: self.config.role,
        }
    }

    /// One heartbeat POST to the registry
    pub async fn send_heartbeat(&self) -> Result<()> {
        let body = HeartbeatRequest {
            node_id: self.config.node_id.clone(),
            port: self.config.port,
            url: self.config.url(),
            role: self.config.role,
        };

        let url = format!("{}/heartbeat", self.config.registry_url);
        self.client
            .post(&url)
            .timeout(self.config.timeouts.heartbeat())
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::PeerUnreachable {
                url,
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Tell the registry we are going away; used during graceful shutdown
    pub async fn deregister(&self) -> Result<()> {
        let url = format!("{}/deregister", self.config.registry_url);
        self.client
            .post(&url)
            .timeout(self.config.timeouts.heartbeat())
            .json(&DeregisterRequest {
                node_id: self.config.node_id.clone(),
            })
            .send()
            .await
            .map_err(|e| Error::PeerUnreachable {
                url,
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

async fn send_replication(
    client: &reqwest::Client,
    url: &str,
    payload: &ReplicateRequest,
    timeout: Duration,
) -> Result<ReplicateResponse> {
    let endpoint = format!("{url}/replicate");
    let response = client
        .post(&endpoint)
        .timeout(timeout)
        .json(payload)
        .send()
        .await
        .map_err(|e| Error::PeerUnreachable {
            url: endpoint.clone(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(Error::PeerUnreachable {
            url: endpoint,
            reason: format!("status {}", response.status()),
        });
    }

    response
        .json::<ReplicateResponse>()
        .await
        .map_err(|e| Error::PeerUnreachable {
            url: endpoint,
            reason: e.to_string(),
        })
}

/// Run a node process to completion: serve the HTTP API, heartbeat in the
/// background, deregister from the registry on shutdown.
pub async fn run(config: NodeConfig) -> Result<()> {
    config.validate()?;

    let node = Arc::new(KvNode::new(config)?);
    let app = http::router(Arc::clone(&node));

    let listener = tokio::net::TcpListener::bind(node.config().bind_address()).await?;
    tracing::info!(
        node_id = %node.node_id(),
        role = %node.role(),
        address = %node.config().bind_address(),
        "node listening"
    );

    let heartbeat_handle = tokio::spawn(heartbeat::run(Arc::clone(&node)));

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.map_err(|e| Error::Internal(format!("http server: {e}")))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(node_id = %node.node_id(), "shutdown signal received");
        }
    }

    heartbeat_handle.abort();
    if let Err(e) = node.deregister().await {
        tracing::warn!(error = %e, "deregistration failed during shutdown");
    }

    tracing::info!(node_id = %node.node_id(), "node stopped");
    Ok(())
}
