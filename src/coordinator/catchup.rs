//! Catch-up Orchestration
//!
//! On a registry trigger the coordinator pulls the leader's full snapshot and
//! pushes it to the target follower. The send is retried a bounded number of
//! times with a fixed delay to absorb the follower's startup window.

use crate::error::{Error, Result};
use crate::protocol::{CatchupResponse, Snapshot};

use super::Coordinator;

impl Coordinator {
    /// Deliver the leader's state to a follower. `url` overrides the
    /// membership lookup when the registry already knows the address.
    pub async fn catch_up(&self, node_id: &str, url: Option<String>) -> Result<()> {
        let target_url = match url {
            Some(u) => u,
            None => self
                .followers
                .read()
                .await
                .get(node_id)
                .map(|m| m.descriptor.url.clone())
                .ok_or_else(|| Error::UnknownNode(node_id.to_string()))?,
        };

        let leader = self.leader_descriptor().await.ok_or(Error::NoLeader)?;

        let attempts = self.config.timeouts.catchup_retries;
        for attempt in 1..=attempts {
            match self.try_catch_up(&leader.url, &target_url).await {
                Ok(keys) => {
                    tracing::info!(node_id, keys, attempt, "catch-up complete");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(node_id, attempt, attempts, error = %e, "catch-up attempt failed");
                    if attempt < attempts {
                        tokio::time::sleep(self.config.timeouts.catchup_retry_delay()).await;
                    }
                }
            }
        }

        Err(Error::CatchupFailed {
            node_id: node_id.to_string(),
            attempts,
        })
    }

    async fn try_catch_up(&self, leader_url: &str, target_url: &str) -> Result<usize> {
        let snapshot_endpoint = format!("{leader_url}/snapshot");
        let snapshot: Snapshot = self
            .client
            .get(&snapshot_endpoint)
            .timeout(self.config.timeouts.snapshot())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::PeerUnreachable {
                url: snapshot_endpoint.clone(),
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| Error::PeerUnreachable {
                url: snapshot_endpoint,
                reason: e.to_string(),
            })?;

        let catchup_endpoint = format!("{target_url}/catchup");
        let received: CatchupResponse = self
            .client
            .post(&catchup_endpoint)
            .timeout(self.config.timeouts.catchup())
            .json(&snapshot)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::PeerUnreachable {
                url: catchup_endpoint.clone(),
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| Error::PeerUnreachable {
                url: catchup_endpoint,
                reason: e.to_string(),
            })?;

        Ok(received.keys_received)
    }
}
