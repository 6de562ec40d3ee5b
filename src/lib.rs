//! QuorumKV - Quorum-Replicated Key-Value Store
//!
//! A small cluster of cooperating processes implementing a single-leader,
//! quorum-replicated key-value store over HTTP/JSON.
//!
//! # Architecture
//!
//! A coordinator fronts the cluster: it spawns one statically designated
//! leader and a fleet of followers, routes writes through the leader with a
//! synchronous fan-out to the W smallest-port alive followers (the rest catch
//! up asynchronously), and serves reads from the R largest-port alive
//! followers with highest-version-wins conflict resolution. A registry tracks
//! liveness through heartbeats, converts silence into death events, triggers
//! catch-up for newly joined followers, and can request automatic respawn of
//! dead followers into their old slots.
//!
//! # Features
//!
//! - Per-key monotonic versions assigned only by the leader
//! - Deterministic, port-ordered sync/async/read follower selection
//! - Quorum-gated writes that fail loudly instead of under-replicating
//! - Follower slot identity that survives death and respawn
//! - Full-snapshot catch-up for new and revived followers
//! - In-memory state throughout; every process rebuilds from heartbeats

pub mod config;
pub mod coordinator;
pub mod error;
pub mod launcher;
pub mod node;
pub mod protocol;
pub mod registry;
pub mod store;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CoordinatorConfig, NodeConfig, RegistryConfig, Timeouts};
    pub use crate::coordinator::Coordinator;
    pub use crate::error::{Error, Result};
    pub use crate::node::KvNode;
    pub use crate::protocol::{NodeDescriptor, NodeRole, NodeStatus, Snapshot};
    pub use crate::registry::Registry;
    pub use crate::store::VersionedStore;
}
