//! QuorumKV Configuration
//!
//! Per-process configuration for the coordinator, node, and registry
//! binaries. CLI flags are the primary source; an optional TOML file can
//! override the protocol timeouts.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::NodeRole;

/// Default registry port
pub const DEFAULT_REGISTRY_PORT: u16 = 9000;
/// Default coordinator port; the leader binds base + 1, follower N binds base + 1 + N
pub const DEFAULT_BASE_PORT: u16 = 7000;

/// Protocol timeouts and loop intervals, in seconds.
///
/// Defaults follow the cluster protocol: short probes for liveness, longer
/// windows for data-plane calls that fan out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    /// Health probe timeout
    #[serde(default = "default_health_probe_secs")]
    pub health_probe_secs: u64,

    /// Heartbeat POST timeout
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Single replication RPC timeout
    #[serde(default = "default_replicate_secs")]
    pub replicate_secs: u64,

    /// Snapshot fetch timeout
    #[serde(default = "default_snapshot_secs")]
    pub snapshot_secs: u64,

    /// Catch-up send timeout
    #[serde(default = "default_catchup_secs")]
    pub catchup_secs: u64,

    /// Leader write end-to-end timeout
    #[serde(default = "default_write_secs")]
    pub write_secs: u64,

    /// Coordinator read fan-out timeout
    #[serde(default = "default_read_secs")]
    pub read_secs: u64,

    /// Node heartbeat emission interval
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Coordinator health-check loop interval
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,

    /// Registry pruning loop interval
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    /// Heartbeat age after which the registry declares a node dead
    #[serde(default = "default_registry_expiry_secs")]
    pub registry_expiry_secs: u64,

    /// Delay before registering a freshly spawned follower with the leader,
    /// giving the new process time to bind
    #[serde(default = "default_register_follower_delay_secs")]
    pub register_follower_delay_secs: u64,

    /// Catch-up send attempts before reporting failure
    #[serde(default = "default_catchup_retries")]
    pub catchup_retries: u32,

    /// Fixed delay between catch-up attempts
    #[serde(default = "default_catchup_retry_delay_secs")]
    pub catchup_retry_delay_secs: u64,
}

fn default_health_probe_secs() -> u64 {
    2
}

fn default_heartbeat_secs() -> u64 {
    2
}

fn default_replicate_secs() -> u64 {
    10
}

fn default_snapshot_secs() -> u64 {
    5
}

fn default_catchup_secs() -> u64 {
    10
}

fn default_write_secs() -> u64 {
    30
}

fn default_read_secs() -> u64 {
    10
}

fn default_heartbeat_interval_secs() -> u64 {
    2
}

fn default_health_interval_secs() -> u64 {
    2
}

fn default_prune_interval_secs() -> u64 {
    1
}

fn default_registry_expiry_secs() -> u64 {
    5
}

fn default_register_follower_delay_secs() -> u64 {
    2
}

fn default_catchup_retries() -> u32 {
    5
}

fn default_catchup_retry_delay_secs() -> u64 {
    2
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            health_probe_secs: default_health_probe_secs(),
            heartbeat_secs: default_heartbeat_secs(),
            replicate_secs: default_replicate_secs(),
            snapshot_secs: default_snapshot_secs(),
            catchup_secs: default_catchup_secs(),
            write_secs: default_write_secs(),
            read_secs: default_read_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            health_interval_secs: default_health_interval_secs(),
            prune_interval_secs: default_prune_interval_secs(),
            registry_expiry_secs: default_registry_expiry_secs(),
            register_follower_delay_secs: default_register_follower_delay_secs(),
            catchup_retries: default_catchup_retries(),
            catchup_retry_delay_secs: default_catchup_retry_delay_secs(),
        }
    }
}

impl Timeouts {
    /// Load timeout overrides from a TOML file with a `[timeouts]` table
    pub fn from_file(path: &Path) -> Result<Self> {
        #[derive(Deserialize)]
        struct File {
            #[serde(default)]
            timeouts: Option<Timeouts>,
        }
        let content = std::fs::read_to_string(path)?;
        let file: File = toml::from_str(&content)?;
        Ok(file.timeouts.unwrap_or_default())
    }

    pub fn health_probe(&self) -> Duration {
        Duration::from_secs(self.health_probe_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn replicate(&self) -> Duration {
        Duration::from_secs(self.replicate_secs)
    }

    pub fn snapshot(&self) -> Duration {
        Duration::from_secs(self.snapshot_secs)
    }

    pub fn catchup(&self) -> Duration {
        Duration::from_secs(self.catchup_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }

    pub fn registry_expiry(&self) -> Duration {
        Duration::from_secs(self.registry_expiry_secs)
    }

    pub fn register_follower_delay(&self) -> Duration {
        Duration::from_secs(self.register_follower_delay_secs)
    }

    pub fn catchup_retry_delay(&self) -> Duration {
        Duration::from_secs(self.catchup_retry_delay_secs)
    }
}

/// Coordinator process configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Host used both for binding and for the URLs handed to peers
    pub host: String,
    /// Coordinator HTTP port
    pub port: u16,
    /// Number of followers spawned at startup
    pub followers: usize,
    /// Write quorum W
    pub write_quorum: usize,
    /// Read quorum R
    pub read_quorum: usize,
    /// Registry base URL
    pub registry_url: String,
    /// Base port: leader binds base + 1, follower N binds base + 1 + N
    pub base_port: u16,
    /// Cosmetic replication delay forwarded to spawned nodes
    pub replication_delay_secs: f64,
    pub timeouts: Timeouts,
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.followers == 0 {
            return Err(Error::Config("at least one follower is required".into()));
        }
        if self.write_quorum == 0 || self.read_quorum == 0 {
            return Err(Error::Config("quorums must be at least 1".into()));
        }
        if self.write_quorum > self.followers {
            return Err(Error::Config(format!(
                "write quorum {} exceeds follower count {}; writes could never reach quorum",
                self.write_quorum, self.followers
            )));
        }
        if self.read_quorum > self.followers {
            return Err(Error::Config(format!(
                "read quorum {} exceeds follower count {}",
                self.read_quorum, self.followers
            )));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Port assigned to the leader
    pub fn leader_port(&self) -> u16 {
        self.base_port + 1
    }

    /// Port assigned to follower slot N (1-based)
    pub fn follower_port(&self, slot: u64) -> u16 {
        self.base_port + 1 + slot as u16
    }

    pub fn replication_delay(&self) -> Duration {
        Duration::from_secs_f64(self.replication_delay_secs)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_BASE_PORT,
            followers: 3,
            write_quorum: 2,
            read_quorum: 1,
            registry_url: format!("http://127.0.0.1:{DEFAULT_REGISTRY_PORT}"),
            base_port: DEFAULT_BASE_PORT,
            replication_delay_secs: 0.0,
            timeouts: Timeouts::default(),
        }
    }
}

/// Node process configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    pub host: String,
    pub port: u16,
    pub role: NodeRole,
    /// Leader base URL; only meaningful for followers
    pub leader_url: Option<String>,
    pub registry_url: String,
    /// Cosmetic delay before each sync replication; async replication
    /// waits three times as long to make the split observable
    pub replication_delay_secs: f64,
    pub timeouts: Timeouts,
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            return Err(Error::Config("node id cannot be empty".into()));
        }
        if self.role == NodeRole::Leader && self.node_id != "leader" {
            return Err(Error::Config(format!(
                "the leader must use the reserved id \"leader\", got {:?}",
                self.node_id
            )));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn sync_delay(&self) -> Duration {
        Duration::from_secs_f64(self.replication_delay_secs)
    }

    pub fn async_delay(&self) -> Duration {
        Duration::from_secs_f64(self.replication_delay_secs * 3.0)
    }
}

/// Registry process configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub host: String,
    pub port: u16,
    /// Coordinator base URL, target of /catchup, /node-died and /spawn calls
    pub coordinator_url: String,
    /// Automatically request respawn of dead followers
    pub auto_spawn: bool,
    /// Delay before the auto-respawn request
    pub spawn_delay_secs: u64,
    pub timeouts: Timeouts,
}

impl RegistryConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn spawn_delay(&self) -> Duration {
        Duration::from_secs(self.spawn_delay_secs)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_REGISTRY_PORT,
            coordinator_url: format!("http://127.0.0.1:{DEFAULT_BASE_PORT}"),
            auto_spawn: false,
            spawn_delay_secs: 3,
            timeouts: Timeouts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn default_timeouts_match_protocol() {
        let t = Timeouts::default();
        assert_eq!(t.health_probe(), Duration::from_secs(2));
        assert_eq!(t.replicate(), Duration::from_secs(10));
        assert_eq!(t.write(), Duration::from_secs(30));
        assert_eq!(t.registry_expiry(), Duration::from_secs(5));
        assert_eq!(t.catchup_retries, 5);
    }

    #[test]
    fn timeout_file_overrides_selected_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[timeouts]\nreplicate_secs = 3\nregistry_expiry_secs = 8"
        )
        .unwrap();

        let t = Timeouts::from_file(file.path()).unwrap();
        assert_eq!(t.replicate(), Duration::from_secs(3));
        assert_eq!(t.registry_expiry(), Duration::from_secs(8));
        // Untouched fields keep their defaults
        assert_eq!(t.write(), Duration::from_secs(30));
    }

    #[test]
    fn write_quorum_larger_than_cluster_is_rejected() {
        let config = CoordinatorConfig {
            followers: 2,
            write_quorum: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn quorum_of_zero_is_rejected() {
        let config = CoordinatorConfig {
            read_quorum: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn follower_ports_derive_from_base() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.leader_port(), 7001);
        assert_eq!(config.follower_port(1), 7002);
        assert_eq!(config.follower_port(3), 7004);
    }

    #[test]
    fn leader_id_is_reserved() {
        let config = NodeConfig {
            node_id: "node-7".to_string(),
            host: "127.0.0.1".to_string(),
            port: 7001,
            role: NodeRole::Leader,
            leader_url: None,
            registry_url: "http://127.0.0.1:9000".to_string(),
            replication_delay_secs: 0.0,
            timeouts: Timeouts::default(),
        };
        assert!(config.validate().is_err());
    }
}
