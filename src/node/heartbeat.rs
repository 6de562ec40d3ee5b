//! Heartbeat Loop
//!
//! Every node periodically announces itself to the registry. A failed POST is
//! logged and retried on the next tick; the node keeps serving local reads
//! even when the registry is unreachable.

use std::sync::Arc;

use super::KvNode;

pub async fn run(node: Arc<KvNode>) {
    let mut ticker = tokio::time::interval(node.config().timeouts.heartbeat_interval());
    // The first tick fires immediately, registering the node right away
    loop {
        ticker.tick().await;
        match node.send_heartbeat().await {
            Ok(()) => {
                tracing::trace!(node_id = %node.node_id(), "heartbeat sent");
            }
            Err(e) => {
                tracing::warn!(
                    node_id = %node.node_id(),
                    error = %e,
                    "heartbeat failed, retrying next tick"
                );
            }
        }
    }
}
