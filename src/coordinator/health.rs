//! Health-check Loop
//!
//! Probes every managed node's /health on a fixed interval. Transitions are
//! applied and logged by the coordinator; this loop only supplies the tick.

use std::sync::Arc;

use super::Coordinator;

pub async fn run(coordinator: Arc<Coordinator>) {
    let mut ticker = tokio::time::interval(coordinator.config().timeouts.health_interval());
    loop {
        ticker.tick().await;
        coordinator.run_health_checks().await;
    }
}
