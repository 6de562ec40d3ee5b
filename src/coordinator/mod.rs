//! Cluster Coordinator
//!
//! The coordinator owns cluster membership and the quorum data plane. It
//! spawns the leader and follower processes, routes writes through the leader
//! with a coordinator-chosen sync/async split, serves reads from a quorum of
//! followers with last-write-wins arbitration, and reacts to liveness events
//! coming from its own health checks and from the registry.

mod catchup;
mod health;
mod http;

pub use http::router;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::launcher::{LaunchSpec, NodeLauncher, NodeProcess, ProcessLauncher};
use crate::protocol::{
    DataReadResponse, DataWriteRequest, DataWriteResponse, KillResponse, NodeDescriptor, NodeRole,
    NodeStatus, ReadResponse, RegisterFollowerRequest, SpawnRequest, SpawnResponse,
    StatusResponse, WriteRequest, WriteResponse,
};

/// A node the coordinator manages: its descriptor plus the process handle
struct ManagedNode {
    descriptor: NodeDescriptor,
    handle: Option<Box<dyn NodeProcess>>,
}

impl ManagedNode {
    fn new(descriptor: NodeDescriptor, handle: Box<dyn NodeProcess>) -> Self {
        Self {
            descriptor,
            handle: Some(handle),
        }
    }
}

/// Cluster controller
pub struct Coordinator {
    config: CoordinatorConfig,
    launcher: Box<dyn NodeLauncher>,
    leader: RwLock<Option<ManagedNode>>,
    followers: RwLock<HashMap<String, ManagedNode>>,
    /// Monotonic counter for fresh follower slots
    next_slot: AtomicU64,
    client: reqwest::Client,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, launcher: Box<dyn NodeLauncher>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("http client: {e}")))?;

        Ok(Self {
            config,
            launcher,
            leader: RwLock::new(None),
            followers: RwLock::new(HashMap::new()),
            next_slot: AtomicU64::new(0),
            client,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn node_url(&self, port: u16) -> String {
        format!("http://{}:{port}", self.config.host)
    }

    fn leader_url(&self) -> String {
        self.node_url(self.config.leader_port())
    }

    fn replication_delay_arg(&self) -> Option<String> {
        if self.config.replication_delay_secs > 0.0 {
            Some(self.config.replication_delay_secs.to_string())
        } else {
            None
        }
    }

    /// Spawn the statically designated leader and the initial follower fleet
    pub async fn bootstrap(&self) -> Result<()> {
        self.config.validate()?;

        let port = self.config.leader_port();
        let spec = LaunchSpec {
            node_id: "leader".to_string(),
            port,
            role: NodeRole::Leader,
            leader_url: None,
            registry_url: self.config.registry_url.clone(),
            replication_delay: self.replication_delay_arg(),
        };
        let handle = self.launcher.launch(&spec).await?;
        let descriptor =
            NodeDescriptor::new("leader".to_string(), self.node_url(port), port, NodeRole::Leader);
        *self.leader.write().await = Some(ManagedNode::new(descriptor, handle));

        for _ in 0..self.config.followers {
            self.spawn(SpawnRequest::default()).await?;
        }

        tracing::info!(
            followers = self.config.followers,
            write_quorum = self.config.write_quorum,
            read_quorum = self.config.read_quorum,
            "cluster bootstrapped"
        );
        Ok(())
    }

    // ============ Membership views ============

    pub async fn leader_descriptor(&self) -> Option<NodeDescriptor> {
        self.leader.read().await.as_ref().map(|m| m.descriptor.clone())
    }

    /// Alive followers, sorted by ascending port
    pub async fn alive_followers(&self) -> Vec<NodeDescriptor> {
        let followers = self.followers.read().await;
        let mut alive: Vec<NodeDescriptor> = followers
            .values()
            .filter(|m| m.descriptor.is_alive())
            .map(|m| m.descriptor.clone())
            .collect();
        alive.sort_by_key(|d| d.port);
        alive
    }

    /// Sync set (W smallest ports) and async set (the rest), from the current
    /// alive followers. Port order makes the split deterministic.
    pub async fn replication_sets(&self) -> (Vec<NodeDescriptor>, Vec<NodeDescriptor>) {
        let alive = self.alive_followers().await;
        let w = self.config.write_quorum.min(alive.len());
        let sync = alive[..w].to_vec();
        let rest = alive[w..].to_vec();
        (sync, rest)
    }

    /// Read set: the R largest-port alive followers
    pub async fn read_set(&self) -> Vec<NodeDescriptor> {
        let alive = self.alive_followers().await;
        let r = self.config.read_quorum.min(alive.len());
        alive[alive.len() - r..].to_vec()
    }

    pub async fn can_write(&self) -> bool {
        let leader_alive = self
            .leader
            .read()
            .await
            .as_ref()
            .map(|m| m.descriptor.is_alive())
            .unwrap_or(false);
        leader_alive && self.alive_followers().await.len() >= self.config.write_quorum
    }

    pub async fn can_read(&self) -> bool {
        self.alive_followers().await.len() >= self.config.read_quorum
    }

    pub async fn status(&self) -> StatusResponse {
        let leader = self.leader_descriptor().await;
        let followers = self.followers.read().await;
        let mut all: Vec<NodeDescriptor> =
            followers.values().map(|m| m.descriptor.clone()).collect();
        all.sort_by_key(|d| d.port);
        drop(followers);

        StatusResponse {
            leader,
            followers: all,
            write_quorum: self.config.write_quorum,
            read_quorum: self.config.read_quorum,
            can_write: self.can_write().await,
            can_read: self.can_read().await,
        }
    }

    // ============ Data plane ============

    /// Quorum write: route through the leader with the computed fan-out split,
    /// then require at least W sync acks.
    pub async fn write(&self, req: WriteRequest) -> Result<WriteResponse> {
        let leader = self.leader_descriptor().await.ok_or(Error::NoLeader)?;
        let alive = self.alive_followers().await;
        let required = self.config.write_quorum;

        if !leader.is_alive() || alive.len() < required {
            tracing::warn!(
                key = %req.key,
                alive = alive.len(),
                required,
                leader_alive = leader.is_alive(),
                "write rejected, quorum unavailable"
            );
            return Err(Error::QuorumUnavailable {
                required,
                alive: alive.len(),
            });
        }

        let (sync_set, async_set) = self.replication_sets().await;
        tracing::info!(
            key = %req.key,
            sync = ?sync_set.iter().map(|d| d.node_id.as_str()).collect::<Vec<_>>(),
            "routing write to leader"
        );

        let body = DataWriteRequest {
            key: req.key.clone(),
            value: req.value.clone(),
            sync_followers: sync_set.iter().map(|d| d.url.clone()).collect(),
            async_followers: async_set.iter().map(|d| d.url.clone()).collect(),
        };

        let endpoint = format!("{}/data", leader.url);
        let response = self
            .client
            .post(&endpoint)
            .timeout(self.config.timeouts.write())
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::PeerUnreachable {
                url: endpoint,
                reason: e.to_string(),
            })?;

        let result: DataWriteResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("leader write response: {e}")))?;

        let acked = result.replication.sync_acks;
        if acked < required {
            // The leader has already committed; the caller sees a loud
            // failure instead of silent under-replication
            tracing::warn!(
                key = %req.key,
                version = result.version,
                acked,
                required,
                "write committed on leader but sync quorum not met"
            );
            return Err(Error::QuorumNotMet { required, acked });
        }

        Ok(WriteResponse {
            status: "ok".to_string(),
            key: result.key,
            value: result.value,
            version: result.version,
            sync_acks: acked,
            quorum: required,
            sync_replicated_to: result.replication.sync_acked_by,
        })
    }

    /// Quorum read: query the R largest-port alive followers in parallel and
    /// return the highest-versioned answer.
    pub async fn read(&self, key: &str) -> Result<ReadResponse> {
        let required = self.config.read_quorum;
        let readers = self.read_set().await;

        if readers.len() < required {
            return Err(Error::QuorumUnavailable {
                required,
                alive: readers.len(),
            });
        }

        let probes = readers.iter().map(|d| {
            let client = self.client.clone();
            let url = format!("{}/data/{key}", d.url);
            let node_id = d.node_id.clone();
            let timeout = self.config.timeouts.read();
            async move {
                let response = client.get(&url).timeout(timeout).send().await;
                match response {
                    Ok(r) if r.status().is_success() => match r.json::<DataReadResponse>().await {
                        Ok(body) => ReadProbe::Found { node_id, body },
                        Err(_) => ReadProbe::Unreachable,
                    },
                    Ok(r) if r.status() == reqwest::StatusCode::NOT_FOUND => {
                        ReadProbe::Missing
                    }
                    _ => ReadProbe::Unreachable,
                }
            }
        });

        let outcomes = futures::future::join_all(probes).await;

        let mut responses = 0usize;
        let mut best: Option<(String, DataReadResponse)> = None;
        for outcome in outcomes {
            match outcome {
                ReadProbe::Found { node_id, body } => {
                    responses += 1;
                    let better = match &best {
                        Some((_, current)) => body.version > current.version,
                        None => true,
                    };
                    if better {
                        best = Some((node_id, body));
                    }
                }
                ReadProbe::Missing => responses += 1,
                ReadProbe::Unreachable => {}
            }
        }

        if responses < required {
            return Err(Error::QuorumNotMet {
                required,
                acked: responses,
            });
        }

        match best {
            Some((served_by, body)) => Ok(ReadResponse {
                key: body.key,
                value: body.value,
                version: body.version,
                served_by,
                quorum_responses: responses,
            }),
            None => Err(Error::KeyNotFound(key.to_string())),
        }
    }

    // ============ Lifecycle management ============

    /// Spawn a follower: explicit slot hints first, then the oldest dead slot,
    /// then a fresh slot off the counter.
    pub async fn spawn(&self, req: SpawnRequest) -> Result<SpawnResponse> {
        let mut followers = self.followers.write().await;

        let (node_id, port, reused) = match (req.node_id, req.port) {
            (Some(id), Some(port)) => {
                let reused = followers.contains_key(&id);
                (id, port, reused)
            }
            (Some(id), None) => {
                let port = followers
                    .get(&id)
                    .map(|m| m.descriptor.port)
                    .ok_or_else(|| Error::UnknownNode(id.clone()))?;
                (id, port, true)
            }
            _ => {
                // Oldest dead slot = smallest port; ports grow monotonically
                let dead = followers
                    .values()
                    .filter(|m| m.descriptor.status == NodeStatus::Dead)
                    .min_by_key(|m| m.descriptor.port)
                    .map(|m| (m.descriptor.node_id.clone(), m.descriptor.port));
                match dead {
                    Some((id, port)) => (id, port, true),
                    None => {
                        let slot = self.next_slot.fetch_add(1, Ordering::SeqCst) + 1;
                        (format!("follower-{slot}"), self.config.follower_port(slot), false)
                    }
                }
            }
        };

        let spec = LaunchSpec {
            node_id: node_id.clone(),
            port,
            role: NodeRole::Follower,
            leader_url: Some(self.leader_url()),
            registry_url: self.config.registry_url.clone(),
            replication_delay: self.replication_delay_arg(),
        };
        let handle = self.launcher.launch(&spec).await?;

        let url = self.node_url(port);
        let descriptor =
            NodeDescriptor::new(node_id.clone(), url.clone(), port, NodeRole::Follower);
        followers.insert(node_id.clone(), ManagedNode::new(descriptor, handle));
        drop(followers);

        tracing::info!(node_id = %node_id, port, reused, "follower spawned");
        self.schedule_follower_registration(url.clone());

        Ok(SpawnResponse {
            status: if reused { "respawned" } else { "spawned" }.to_string(),
            node_id,
            url,
        })
    }

    /// Deferred register-follower call to the leader, giving the new process
    /// time to bind before the leader hears about it
    fn schedule_follower_registration(&self, follower_url: String) {
        let client = self.client.clone();
        let leader_url = self.leader_url();
        let delay = self.config.timeouts.register_follower_delay();
        let timeout = self.config.timeouts.health_probe();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let endpoint = format!("{leader_url}/register-follower");
            let result = client
                .post(&endpoint)
                .timeout(timeout)
                .json(&RegisterFollowerRequest {
                    url: follower_url.clone(),
                })
                .send()
                .await;
            if let Err(e) = result {
                tracing::warn!(url = %follower_url, error = %e, "follower registration failed");
            }
        });
    }

    /// Kill a follower process. The slot stays in the map for future reuse.
    pub async fn kill(&self, node_id: &str) -> Result<KillResponse> {
        let mut followers = self.followers.write().await;
        let entry = followers
            .get_mut(node_id)
            .ok_or_else(|| Error::UnknownNode(node_id.to_string()))?;

        if let Some(handle) = entry.handle.as_mut() {
            if let Err(e) = handle.terminate().await {
                tracing::warn!(node_id, error = %e, "terminate failed");
            }
        }
        entry.descriptor.status = NodeStatus::Dead;
        drop(followers);

        let can_write = self.can_write().await;
        tracing::info!(node_id, can_write, "follower killed");
        if !can_write {
            tracing::warn!("write quorum lost");
        }

        Ok(KillResponse {
            status: "killed".to_string(),
            node_id: node_id.to_string(),
            can_write,
        })
    }

    /// Death notification from the registry
    pub async fn node_died(&self, node_id: &str) {
        if node_id == "leader" {
            let mut leader = self.leader.write().await;
            if let Some(managed) = leader.as_mut() {
                if managed.descriptor.status != NodeStatus::Dead {
                    managed.descriptor.status = NodeStatus::Dead;
                    tracing::error!("leader reported dead, writes unavailable");
                }
            }
            return;
        }

        let mut followers = self.followers.write().await;
        let newly_dead = match followers.get_mut(node_id) {
            Some(entry) if entry.descriptor.status != NodeStatus::Dead => {
                entry.descriptor.status = NodeStatus::Dead;
                true
            }
            Some(_) => false,
            None => {
                tracing::debug!(node_id, "death notice for unknown node ignored");
                false
            }
        };
        drop(followers);

        if newly_dead {
            tracing::warn!(node_id, "registry reported node dead");
            self.log_quorum_impact().await;
        }
    }

    async fn log_quorum_impact(&self) {
        if !self.can_write().await {
            tracing::warn!("write quorum lost");
        }
        if !self.can_read().await {
            tracing::warn!("read quorum lost");
        }
    }

    /// Probe every managed node's /health and apply status transitions.
    /// Only alive nodes degrade to dead on a failed probe: a starting node
    /// that has not bound yet keeps its status until the first success.
    pub async fn run_health_checks(&self) {
        let mut targets: Vec<(String, String, NodeStatus)> = Vec::new();
        if let Some(leader) = self.leader.read().await.as_ref() {
            targets.push((
                leader.descriptor.node_id.clone(),
                leader.descriptor.url.clone(),
                leader.descriptor.status,
            ));
        }
        for entry in self.followers.read().await.values() {
            targets.push((
                entry.descriptor.node_id.clone(),
                entry.descriptor.url.clone(),
                entry.descriptor.status,
            ));
        }

        let timeout = self.config.timeouts.health_probe();
        let probes = targets.into_iter().map(|(node_id, url, status)| {
            let client = self.client.clone();
            async move {
                let healthy = client
                    .get(format!("{url}/health"))
                    .timeout(timeout)
                    .send()
                    .await
                    .map(|r| r.status().is_success())
                    .unwrap_or(false);
                (node_id, status, healthy)
            }
        });

        let results = futures::future::join_all(probes).await;
        let mut went_dead = false;

        for (node_id, previous, healthy) in results {
            let next = match (previous, healthy) {
                (_, true) => NodeStatus::Alive,
                (NodeStatus::Alive, false) => NodeStatus::Dead,
                (other, false) => other,
            };

            if healthy {
                self.touch(&node_id).await;
            }

            if next != previous {
                self.set_status(&node_id, next).await;
                tracing::info!(node_id = %node_id, from = %previous, to = %next, "node status changed");
                if next == NodeStatus::Dead {
                    went_dead = true;
                }
            }
        }

        if went_dead {
            self.log_quorum_impact().await;
        }
    }

    async fn touch(&self, node_id: &str) {
        let now = Some(Utc::now());
        if node_id == "leader" {
            if let Some(leader) = self.leader.write().await.as_mut() {
                leader.descriptor.last_heartbeat = now;
            }
            return;
        }
        if let Some(entry) = self.followers.write().await.get_mut(node_id) {
            entry.descriptor.last_heartbeat = now;
        }
    }

    async fn set_status(&self, node_id: &str, status: NodeStatus) {
        if node_id == "leader" {
            if let Some(leader) = self.leader.write().await.as_mut() {
                leader.descriptor.status = status;
            }
            return;
        }
        if let Some(entry) = self.followers.write().await.get_mut(node_id) {
            entry.descriptor.status = status;
        }
    }

    /// Terminate every child process; used during coordinator shutdown
    pub async fn shutdown_children(&self) {
        let mut followers = self.followers.write().await;
        for (node_id, entry) in followers.iter_mut() {
            if let Some(handle) = entry.handle.as_mut() {
                if let Err(e) = handle.terminate().await {
                    tracing::warn!(node_id, error = %e, "terminate failed during shutdown");
                }
            }
            entry.descriptor.status = NodeStatus::Dead;
        }
        drop(followers);

        let mut leader = self.leader.write().await;
        if let Some(managed) = leader.as_mut() {
            if let Some(handle) = managed.handle.as_mut() {
                if let Err(e) = handle.terminate().await {
                    tracing::warn!(error = %e, "leader terminate failed during shutdown");
                }
            }
            managed.descriptor.status = NodeStatus::Dead;
        }
        tracing::info!("all node processes terminated");
    }
}

enum ReadProbe {
    Found {
        node_id: String,
        body: DataReadResponse,
    },
    Missing,
    Unreachable,
}

/// Run a coordinator process to completion
pub async fn run(config: CoordinatorConfig) -> Result<()> {
    config.validate()?;

    let launcher = Box::new(ProcessLauncher::from_current_exe()?);
    let coordinator = Arc::new(Coordinator::new(config, launcher)?);
    coordinator.bootstrap().await?;

    let app = http::router(Arc::clone(&coordinator));
    let listener =
        tokio::net::TcpListener::bind(coordinator.config().bind_address()).await?;
    tracing::info!(
        address = %coordinator.config().bind_address(),
        "coordinator listening"
    );

    let health_handle = tokio::spawn(health::run(Arc::clone(&coordinator)));

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.map_err(|e| Error::Internal(format!("http server: {e}")))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    health_handle.abort();
    coordinator.shutdown_children().await;
    tracing::info!("coordinator stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timeouts;
    use crate::launcher::RecordingLauncher;

    fn test_config(followers: usize, write_quorum: usize, read_quorum: usize) -> CoordinatorConfig {
        CoordinatorConfig {
            followers,
            write_quorum,
            read_quorum,
            timeouts: Timeouts::default(),
            ..Default::default()
        }
    }

    async fn bootstrapped(
        followers: usize,
        w: usize,
        r: usize,
    ) -> (Arc<Coordinator>, Arc<RecordingLauncher>) {
        let launcher = Arc::new(RecordingLauncher::new());
        let coordinator = Arc::new(
            Coordinator::new(
                test_config(followers, w, r),
                Box::new(SharedLauncher(Arc::clone(&launcher))),
            )
            .unwrap(),
        );
        coordinator.bootstrap().await.unwrap();
        (coordinator, launcher)
    }

    /// Wrap an Arc'd RecordingLauncher so tests can inspect launches
    struct SharedLauncher(Arc<RecordingLauncher>);

    #[async_trait::async_trait]
    impl NodeLauncher for SharedLauncher {
        async fn launch(
            &self,
            spec: &LaunchSpec,
        ) -> crate::error::Result<Box<dyn NodeProcess>> {
            self.0.launch(spec).await
        }
    }

    async fn mark_all_alive(coordinator: &Coordinator) {
        let ids: Vec<String> = coordinator
            .followers
            .read()
            .await
            .keys()
            .cloned()
            .collect();
        for id in ids {
            coordinator.set_status(&id, NodeStatus::Alive).await;
        }
        coordinator.set_status("leader", NodeStatus::Alive).await;
    }

    #[tokio::test]
    async fn bootstrap_spawns_leader_and_fleet() {
        let (coordinator, launcher) = bootstrapped(3, 2, 1).await;

        let launched = launcher.launched.lock().unwrap().clone();
        assert_eq!(launched.len(), 4);
        assert_eq!(launched[0].node_id, "leader");
        assert_eq!(launched[0].port, 7001);
        assert_eq!(launched[1].node_id, "follower-1");
        assert_eq!(launched[1].port, 7002);
        assert_eq!(launched[3].node_id, "follower-3");
        assert_eq!(launched[3].port, 7004);

        // Followers start in starting state; quorum is not yet available
        assert!(!coordinator.can_write().await);
        assert!(!coordinator.can_read().await);

        mark_all_alive(&coordinator).await;
        assert!(coordinator.can_write().await);
        assert!(coordinator.can_read().await);
    }

    #[tokio::test]
    async fn sync_set_is_smallest_ports_read_set_largest() {
        let (coordinator, _launcher) = bootstrapped(3, 2, 2).await;
        mark_all_alive(&coordinator).await;

        let (sync, rest) = coordinator.replication_sets().await;
        let sync_ids: Vec<&str> = sync.iter().map(|d| d.node_id.as_str()).collect();
        assert_eq!(sync_ids, vec!["follower-1", "follower-2"]);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].node_id, "follower-3");

        let read = coordinator.read_set().await;
        let read_ids: Vec<&str> = read.iter().map(|d| d.node_id.as_str()).collect();
        // R largest ports; follower-2 belongs to both sets since W + R > 3
        assert_eq!(read_ids, vec!["follower-2", "follower-3"]);
    }

    #[tokio::test]
    async fn dead_followers_drop_out_of_the_sets() {
        let (coordinator, _launcher) = bootstrapped(3, 2, 1).await;
        mark_all_alive(&coordinator).await;
        coordinator.set_status("follower-1", NodeStatus::Dead).await;

        let (sync, _) = coordinator.replication_sets().await;
        let sync_ids: Vec<&str> = sync.iter().map(|d| d.node_id.as_str()).collect();
        assert_eq!(sync_ids, vec!["follower-2", "follower-3"]);
        assert!(coordinator.can_write().await);

        coordinator.set_status("follower-2", NodeStatus::Dead).await;
        assert!(!coordinator.can_write().await);
        assert!(coordinator.can_read().await);
    }

    #[tokio::test]
    async fn spawn_reuses_the_oldest_dead_slot() {
        let (coordinator, launcher) = bootstrapped(3, 2, 1).await;
        mark_all_alive(&coordinator).await;

        coordinator.kill("follower-2").await.unwrap();
        coordinator.kill("follower-1").await.unwrap();

        // Oldest dead slot (smallest port) wins
        let respawned = coordinator.spawn(SpawnRequest::default()).await.unwrap();
        assert_eq!(respawned.status, "respawned");
        assert_eq!(respawned.node_id, "follower-1");
        let last = launcher.launched.lock().unwrap().last().unwrap().clone();
        assert_eq!(last.port, 7002);

        let second = coordinator.spawn(SpawnRequest::default()).await.unwrap();
        assert_eq!(second.node_id, "follower-2");

        // No dead slots left: a fresh one is allocated
        mark_all_alive(&coordinator).await;
        let fresh = coordinator.spawn(SpawnRequest::default()).await.unwrap();
        assert_eq!(fresh.status, "spawned");
        assert_eq!(fresh.node_id, "follower-4");
        let last = launcher.launched.lock().unwrap().last().unwrap().clone();
        assert_eq!(last.port, 7005);
    }

    #[tokio::test]
    async fn spawn_honors_explicit_slot_hints() {
        let (coordinator, launcher) = bootstrapped(1, 1, 1).await;

        let resp = coordinator
            .spawn(SpawnRequest {
                node_id: Some("follower-1".to_string()),
                port: Some(7002),
            })
            .await
            .unwrap();
        assert_eq!(resp.status, "respawned");
        assert_eq!(resp.node_id, "follower-1");
        let last = launcher.launched.lock().unwrap().last().unwrap().clone();
        assert_eq!(last.port, 7002);
        assert_eq!(last.role, NodeRole::Follower);
    }

    #[tokio::test]
    async fn kill_unknown_node_fails() {
        let (coordinator, _launcher) = bootstrapped(1, 1, 1).await;
        let err = coordinator.kill("follower-9").await.unwrap_err();
        assert!(matches!(err, Error::UnknownNode(_)));
    }

    #[tokio::test]
    async fn registry_death_notice_marks_node_dead() {
        let (coordinator, _launcher) = bootstrapped(2, 1, 1).await;
        mark_all_alive(&coordinator).await;

        coordinator.node_died("follower-2").await;
        let alive = coordinator.alive_followers().await;
        assert_eq!(alive.len(), 1);
        assert_eq!(alive[0].node_id, "follower-1");

        coordinator.node_died("leader").await;
        assert!(!coordinator.can_write().await);
    }

    #[tokio::test]
    async fn write_without_quorum_is_rejected() {
        let (coordinator, _launcher) = bootstrapped(3, 2, 1).await;
        mark_all_alive(&coordinator).await;
        coordinator.set_status("follower-1", NodeStatus::Dead).await;
        coordinator.set_status("follower-2", NodeStatus::Dead).await;

        let err = coordinator
            .write(WriteRequest {
                key: "k".to_string(),
                value: "fail".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::QuorumUnavailable {
                required: 2,
                alive: 1
            }
        ));
    }

    #[tokio::test]
    async fn status_reports_full_cluster_view() {
        let (coordinator, _launcher) = bootstrapped(3, 2, 2).await;
        mark_all_alive(&coordinator).await;

        let status = coordinator.status().await;
        assert_eq!(status.leader.unwrap().node_id, "leader");
        assert_eq!(status.followers.len(), 3);
        assert_eq!(status.followers[0].node_id, "follower-1");
        assert_eq!(status.write_quorum, 2);
        assert_eq!(status.read_quorum, 2);
        assert!(status.can_write);
        assert!(status.can_read);
    }
}
