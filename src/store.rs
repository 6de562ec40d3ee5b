//! Versioned Key-Value Store
//!
//! The in-memory map each node owns. Versions are per-key monotonic counters
//! assigned only by the leader; followers apply incoming versions and reject
//! anything that does not strictly advance their local view.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::protocol::{KeyRecord, Snapshot};

/// A single stored record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub value: String,
    pub version: u64,
}

/// Versioned in-memory key-value map.
///
/// All mutations take the write lock so the read-increment-write on a key's
/// version is a single critical section; concurrent leader writes to the same
/// key can never observe the same version.
#[derive(Debug, Default)]
pub struct VersionedStore {
    entries: RwLock<HashMap<String, Record>>,
}

impl VersionedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leader write: bump the key's version by one and store the value.
    /// Returns the newly assigned version.
    pub async fn write(&self, key: &str, value: &str) -> u64 {
        let mut entries = self.entries.write().await;
        let version = entries.get(key).map(|r| r.version).unwrap_or(0) + 1;
        entries.insert(
            key.to_string(),
            Record {
                value: value.to_string(),
                version,
            },
        );
        version
    }

    /// Read a record
    pub async fn get(&self, key: &str) -> Option<Record> {
        self.entries.read().await.get(key).cloned()
    }

    /// Follower replication receipt: accept only if the incoming version
    /// strictly exceeds the local one. Returns the local version for the key
    /// after the call together with whether the write was applied.
    pub async fn apply_replication(&self, key: &str, value: &str, version: u64) -> (bool, u64) {
        let mut entries = self.entries.write().await;
        let current = entries.get(key).map(|r| r.version).unwrap_or(0);
        if version > current {
            entries.insert(
                key.to_string(),
                Record {
                    value: value.to_string(),
                    version,
                },
            );
            (true, version)
        } else {
            (false, current)
        }
    }

    /// Wholesale replacement of the local state with a snapshot. Idempotent:
    /// applying the same snapshot twice leaves the store identical.
    pub async fn apply_snapshot(&self, snapshot: &Snapshot) -> usize {
        let mut entries = self.entries.write().await;
        entries.clear();
        for (key, value) in &snapshot.data {
            let version = snapshot.versions.get(key).copied().unwrap_or(1);
            entries.insert(
                key.clone(),
                Record {
                    value: value.clone(),
                    version,
                },
            );
        }
        entries.len()
    }

    /// Produce the parallel data/version maps sent over the wire
    pub async fn snapshot(&self) -> Snapshot {
        let entries = self.entries.read().await;
        let mut snapshot = Snapshot::default();
        for (key, record) in entries.iter() {
            snapshot.data.insert(key.clone(), record.value.clone());
            snapshot.versions.insert(key.clone(), record.version);
        }
        snapshot
    }

    /// Full dump with nested records, for the data listing endpoint
    pub async fn dump(&self) -> HashMap<String, KeyRecord> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(k, r)| {
                (
                    k.clone(),
                    KeyRecord {
                        value: r.value.clone(),
                        version: r.version,
                    },
                )
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_assign_monotonic_versions() {
        let store = VersionedStore::new();
        assert_eq!(store.write("k1", "a").await, 1);
        assert_eq!(store.write("k1", "b").await, 2);
        assert_eq!(store.write("k1", "c").await, 3);
        // Independent keys version independently
        assert_eq!(store.write("k2", "x").await, 1);

        let record = store.get("k1").await.unwrap();
        assert_eq!(record.value, "c");
        assert_eq!(record.version, 3);
    }

    #[tokio::test]
    async fn stale_replication_is_rejected() {
        let store = VersionedStore::new();

        let (accepted, version) = store.apply_replication("k1", "new", 2).await;
        assert!(accepted);
        assert_eq!(version, 2);

        // Delivering the older version afterwards must not regress the store
        let (accepted, version) = store.apply_replication("k1", "old", 1).await;
        assert!(!accepted);
        assert_eq!(version, 2);
        assert_eq!(store.get("k1").await.unwrap().value, "new");

        // Equal versions are stale too
        let (accepted, _) = store.apply_replication("k1", "dup", 2).await;
        assert!(!accepted);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_catchup() {
        let source = VersionedStore::new();
        source.write("k1", "v1").await;
        source.write("k2", "v2").await;
        source.write("k2", "v2b").await;

        let snapshot = source.snapshot().await;

        let target = VersionedStore::new();
        target.write("stale", "leftover").await;
        let received = target.apply_snapshot(&snapshot).await;
        assert_eq!(received, 2);

        // Old local keys are gone, source keys present at source versions
        assert!(target.get("stale").await.is_none());
        assert_eq!(target.get("k1").await.unwrap().version, 1);
        let k2 = target.get("k2").await.unwrap();
        assert_eq!(k2.value, "v2b");
        assert_eq!(k2.version, 2);
    }

    #[tokio::test]
    async fn catchup_is_idempotent() {
        let source = VersionedStore::new();
        source.write("k1", "v1").await;
        let snapshot = source.snapshot().await;

        let target = VersionedStore::new();
        target.apply_snapshot(&snapshot).await;
        let once = target.snapshot().await;
        target.apply_snapshot(&snapshot).await;
        let twice = target.snapshot().await;
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn concurrent_writes_never_share_a_version() {
        let store = std::sync::Arc::new(VersionedStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(
                async move { store.write("hot", "value").await },
            ));
        }

        let mut versions = Vec::new();
        for handle in handles {
            versions.push(handle.await.unwrap());
        }
        versions.sort_unstable();
        versions.dedup();
        assert_eq!(versions.len(), 50);
        assert_eq!(store.get("hot").await.unwrap().version, 50);
    }
}
