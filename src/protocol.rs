//! Cluster Protocol
//!
//! Wire types for the HTTP/JSON protocol spoken between the coordinator,
//! the nodes, and the registry. Every request and response body exchanged
//! inside the cluster is defined here so the three process types stay in
//! lockstep.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a node in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// The single node accepting primary writes
    Leader,
    /// A replica receiving replication and serving reads
    Follower,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Leader => write!(f, "leader"),
            NodeRole::Follower => write!(f, "follower"),
        }
    }
}

impl std::str::FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "leader" => Ok(NodeRole::Leader),
            "follower" => Ok(NodeRole::Follower),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Lifecycle status of a node: starting -> alive -> dead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Process launched, first health probe not yet answered
    Starting,
    /// Answering health probes / heartbeating
    Alive,
    /// Probes failing, killed, or pruned by the registry
    Dead,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Starting => write!(f, "starting"),
            NodeStatus::Alive => write!(f, "alive"),
            NodeStatus::Dead => write!(f, "dead"),
        }
    }
}

/// Descriptor for a cluster node, as held by the coordinator and registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Unique node identifier; the leader uses the reserved id "leader",
    /// followers are named follower-N
    pub node_id: String,
    /// Base URL, e.g. http://127.0.0.1:7002
    pub url: String,
    /// HTTP port
    pub port: u16,
    /// Leader or follower
    pub role: NodeRole,
    /// Current lifecycle status
    pub status: NodeStatus,
    /// Last time this node was seen alive (heartbeat or health probe)
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl NodeDescriptor {
    pub fn new(node_id: String, url: String, port: u16, role: NodeRole) -> Self {
        Self {
            node_id,
            url,
            port,
            role,
            status: NodeStatus::Starting,
            last_heartbeat: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status == NodeStatus::Alive
    }
}

// ============ Coordinator API ============

/// Client-facing write request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub key: String,
    pub value: String,
}

/// Client-facing write response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub status: String,
    pub key: String,
    pub value: String,
    pub version: u64,
    pub sync_acks: usize,
    /// The write quorum W that was required
    pub quorum: usize,
    /// Node ids that acknowledged the synchronous replication
    pub sync_replicated_to: Vec<String>,
}

/// Client-facing read response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    pub key: String,
    pub value: String,
    pub version: u64,
    /// Node id whose answer won conflict resolution
    pub served_by: String,
    /// Number of followers that answered within the timeout
    pub quorum_responses: usize,
}

/// Spawn request; both fields optional (registry-driven revival supplies them)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpawnRequest {
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnResponse {
    pub status: String,
    pub node_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillResponse {
    pub status: String,
    pub node_id: String,
    pub can_write: bool,
}

/// Coordinator status report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub leader: Option<NodeDescriptor>,
    pub followers: Vec<NodeDescriptor>,
    pub write_quorum: usize,
    pub read_quorum: usize,
    pub can_write: bool,
    pub can_read: bool,
}

/// Catch-up trigger from the registry (url resolved from membership if absent)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchupRequest {
    pub node_id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Death notification from the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDiedRequest {
    pub node_id: String,
}

/// Generic acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: String,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

// ============ Node API ============

/// Leader write with the replication fan-out targets chosen by the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataWriteRequest {
    pub key: String,
    pub value: String,
    /// Followers whose acknowledgement is awaited before the write returns
    #[serde(default)]
    pub sync_followers: Vec<String>,
    /// Followers replicated to on a detached task
    #[serde(default)]
    pub async_followers: Vec<String>,
}

/// Outcome of the leader's replication fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationSummary {
    pub sync_acks: usize,
    pub sync_acked_by: Vec<String>,
    pub async_queued: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataWriteResponse {
    pub status: String,
    pub key: String,
    pub value: String,
    pub version: u64,
    pub replication: ReplicationSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataReadResponse {
    pub key: String,
    pub value: String,
    pub version: u64,
}

/// One stored record, as exposed by the full-dump endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub value: String,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataDumpResponse {
    pub data: HashMap<String, KeyRecord>,
    pub count: usize,
}

/// Replication of a single write from the leader to a follower
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateRequest {
    pub key: String,
    pub value: String,
    pub version: u64,
    /// Node id of the replication source (the leader)
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicateStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateResponse {
    pub status: ReplicateStatus,
    pub node_id: String,
    pub key: String,
    /// The follower's version for the key after handling the request
    pub version: u64,
}

/// Full snapshot of a node's state: parallel data and version maps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub data: HashMap<String, String>,
    pub versions: HashMap<String, u64>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchupResponse {
    pub keys_received: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterFollowerRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterFollowerResponse {
    pub followers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub role: NodeRole,
}

// ============ Registry API ============

/// Heartbeat sent by every node each interval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub node_id: String,
    pub port: u16,
    pub url: String,
    pub role: NodeRole,
}

/// Brief node summary returned to heartbeating nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSummary {
    pub node_id: String,
    pub url: String,
    pub role: NodeRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub nodes: Vec<NodeSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeregisterRequest {
    pub node_id: String,
}

/// Registry's view of a node, with last-seen timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub node_id: String,
    pub url: String,
    pub port: u16,
    pub role: NodeRole,
    pub status: NodeStatus,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryNodesResponse {
    pub nodes: Vec<RegistryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&NodeRole::Leader).unwrap(), "\"leader\"");
        assert_eq!(
            serde_json::to_string(&NodeStatus::Starting).unwrap(),
            "\"starting\""
        );
        assert_eq!(
            serde_json::to_string(&ReplicateStatus::Accepted).unwrap(),
            "\"accepted\""
        );
    }

    #[test]
    fn role_parses_from_cli_string() {
        assert_eq!("leader".parse::<NodeRole>().unwrap(), NodeRole::Leader);
        assert_eq!("follower".parse::<NodeRole>().unwrap(), NodeRole::Follower);
        assert!("candidate".parse::<NodeRole>().is_err());
    }

    #[test]
    fn write_request_optional_fanout_lists_default_empty() {
        let req: DataWriteRequest =
            serde_json::from_str(r#"{"key": "k1", "value": "v1"}"#).unwrap();
        assert!(req.sync_followers.is_empty());
        assert!(req.async_followers.is_empty());
    }

    #[test]
    fn descriptor_starts_in_starting_state() {
        let desc = NodeDescriptor::new(
            "follower-1".to_string(),
            "http://127.0.0.1:7002".to_string(),
            7002,
            NodeRole::Follower,
        );
        assert_eq!(desc.status, NodeStatus::Starting);
        assert!(!desc.is_alive());
    }
}
