//! Cluster Registry
//!
//! The registry is the authoritative liveness view. Nodes announce themselves
//! with periodic heartbeats; a pruning loop converts heartbeat silence into
//! death events, notifying the coordinator and optionally requesting a
//! respawn of dead followers into their old slots. Newly arrived (or revived)
//! followers get a catch-up triggered on their behalf so they receive the
//! leader's state without a manual step.

mod http;

pub use http::router;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::protocol::{
    CatchupRequest, HeartbeatRequest, HeartbeatResponse, NodeDiedRequest, NodeRole, NodeStatus,
    NodeSummary, RegistryEntry, SpawnRequest,
};

/// One tracked node
struct TrackedNode {
    url: String,
    port: u16,
    role: NodeRole,
    status: NodeStatus,
    last_heartbeat: Instant,
    last_seen: DateTime<Utc>,
}

/// Liveness oracle for the cluster
pub struct Registry {
    config: RegistryConfig,
    nodes: RwLock<HashMap<String, TrackedNode>>,
    client: reqwest::Client,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("http client: {e}")))?;

        Ok(Self {
            config,
            nodes: RwLock::new(HashMap::new()),
            client,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Record a heartbeat. Returns the alive-node summary for the sender and
    /// whether a catch-up should be triggered (first sighting of a follower,
    /// or a dead follower coming back, since a respawned process starts empty).
    pub async fn record_heartbeat(&self, req: HeartbeatRequest) -> (HeartbeatResponse, bool) {
        let mut nodes = self.nodes.write().await;

        let previously_dead = nodes
            .get(&req.node_id)
            .map(|n| n.status == NodeStatus::Dead);
        let needs_catchup =
            req.role == NodeRole::Follower && previously_dead.unwrap_or(true);

        match nodes.get_mut(&req.node_id) {
            Some(node) => {
                if node.status == NodeStatus::Dead {
                    tracing::info!(node_id = %req.node_id, "dead node resumed heartbeating");
                }
                node.url = req.url.clone();
                node.port = req.port;
                node.role = req.role;
                node.status = NodeStatus::Alive;
                node.last_heartbeat = Instant::now();
                node.last_seen = Utc::now();
            }
            None => {
                tracing::info!(node_id = %req.node_id, role = %req.role, url = %req.url, "node registered");
                nodes.insert(
                    req.node_id.clone(),
                    TrackedNode {
                        url: req.url.clone(),
                        port: req.port,
                        role: req.role,
                        status: NodeStatus::Alive,
                        last_heartbeat: Instant::now(),
                        last_seen: Utc::now(),
                    },
                );
            }
        }

        let alive: Vec<NodeSummary> = nodes
            .iter()
            .filter(|(_, n)| n.status == NodeStatus::Alive)
            .map(|(id, n)| NodeSummary {
                node_id: id.clone(),
                url: n.url.clone(),
                role: n.role,
            })
            .collect();
        drop(nodes);

        (HeartbeatResponse { nodes: alive }, needs_catchup)
    }

    /// Fire-and-forget catch-up trigger towards the coordinator
    pub fn trigger_catchup(&self, node_id: String, url: String) {
        let client = self.client.clone();
        let endpoint = format!("{}/catchup", self.config.coordinator_url);
        let timeout = self.config.timeouts.catchup();

        tokio::spawn(async move {
            tracing::info!(node_id = %node_id, "triggering catch-up for new follower");
            let result = client
                .post(&endpoint)
                .timeout(timeout)
                .json(&CatchupRequest {
                    node_id: node_id.clone(),
                    url: Some(url),
                })
                .send()
                .await;
            match result {
                Ok(r) if r.status().is_success() => {
                    tracing::info!(node_id = %node_id, "catch-up trigger accepted");
                }
                Ok(r) => {
                    tracing::warn!(node_id = %node_id, status = %r.status(), "catch-up trigger rejected");
                }
                Err(e) => {
                    tracing::warn!(node_id = %node_id, error = %e, "catch-up trigger failed");
                }
            }
        });
    }

    /// Remove a node entirely (graceful shutdown path)
    pub async fn deregister(&self, node_id: &str) -> bool {
        let removed = self.nodes.write().await.remove(node_id).is_some();
        if removed {
            tracing::info!(node_id, "node deregistered");
        }
        removed
    }

    pub async fn list_nodes(&self) -> Vec<RegistryEntry> {
        let nodes = self.nodes.read().await;
        let mut entries: Vec<RegistryEntry> = nodes
            .iter()
            .map(|(id, n)| RegistryEntry {
                node_id: id.clone(),
                url: n.url.clone(),
                port: n.port,
                role: n.role,
                status: n.status,
                last_seen: n.last_seen,
            })
            .collect();
        entries.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        entries
    }

    pub async fn list_alive(&self) -> Vec<RegistryEntry> {
        self.list_nodes()
            .await
            .into_iter()
            .filter(|e| e.status == NodeStatus::Alive)
            .collect()
    }

    /// Flip alive nodes whose heartbeat went silent to dead.
    /// Returns the nodes that died on this pass.
    pub async fn prune(&self) -> Vec<(String, u16, NodeRole)> {
        let expiry = self.config.timeouts.registry_expiry();
        let mut nodes = self.nodes.write().await;
        let mut expired = Vec::new();

        for (id, node) in nodes.iter_mut() {
            if node.status == NodeStatus::Alive && node.last_heartbeat.elapsed() > expiry {
                node.status = NodeStatus::Dead;
                tracing::warn!(node_id = %id, "node expired, no heartbeat");
                expired.push((id.clone(), node.port, node.role));
            }
        }

        expired
    }

    /// Notify the coordinator of a death, then optionally request a respawn
    /// of the dead follower into the same slot after the configured delay
    fn handle_death(&self, node_id: String, port: u16, role: NodeRole) {
        let client = self.client.clone();
        let coordinator_url = self.config.coordinator_url.clone();
        let timeout = self.config.timeouts.heartbeat();
        let auto_spawn = self.config.auto_spawn && role == NodeRole::Follower;
        let spawn_delay = self.config.spawn_delay();

        tokio::spawn(async move {
            let endpoint = format!("{coordinator_url}/node-died");
            let result = client
                .post(&endpoint)
                .timeout(timeout)
                .json(&NodeDiedRequest {
                    node_id: node_id.clone(),
                })
                .send()
                .await;
            if let Err(e) = result {
                tracing::warn!(node_id = %node_id, error = %e, "death notification failed");
            }

            if auto_spawn {
                tokio::time::sleep(spawn_delay).await;
                tracing::info!(node_id = %node_id, port, "auto-respawning dead follower");
                let endpoint = format!("{coordinator_url}/spawn");
                let result = client
                    .post(&endpoint)
                    .timeout(timeout)
                    .json(&SpawnRequest {
                        node_id: Some(node_id.clone()),
                        port: Some(port),
                    })
                    .send()
                    .await;
                if let Err(e) = result {
                    tracing::warn!(node_id = %node_id, error = %e, "auto-respawn request failed");
                }
            }
        });
    }
}

/// Pruning loop: every tick, expire silent nodes and kick off notifications
pub async fn run_pruner(registry: Arc<Registry>) {
    let mut ticker = tokio::time::interval(registry.config().timeouts.prune_interval());
    loop {
        ticker.tick().await;
        let expired = registry.prune().await;
        for (node_id, port, role) in expired {
            registry.handle_death(node_id, port, role);
        }
    }
}

/// Run a registry process to completion
pub async fn run(config: RegistryConfig) -> Result<()> {
    let registry = Arc::new(Registry::new(config)?);
    let app = http::router(Arc::clone(&registry));

    let listener = tokio::net::TcpListener::bind(registry.config().bind_address()).await?;
    tracing::info!(
        address = %registry.config().bind_address(),
        auto_spawn = registry.config().auto_spawn,
        "registry listening"
    );

    let pruner_handle = tokio::spawn(run_pruner(Arc::clone(&registry)));

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.map_err(|e| Error::Internal(format!("http server: {e}")))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    pruner_handle.abort();
    tracing::info!("registry stopped");
    Ok(())
}
