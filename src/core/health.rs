// src/core/health.rs

//! The Health Checker (§4.7): a periodic sweep that derives node health from
//! control-channel presence — a tick loop that re-evaluates every monitored
//! target and pushes the result through the repository, logging and
//! continuing on failure rather than aborting the task.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::core::registry::AgentRegistry;
use crate::core::repository::{GroupRepository, NodeRepository};

pub struct HealthChecker {
    registry: Arc<AgentRegistry>,
    groups: Arc<dyn GroupRepository>,
    nodes: Arc<dyn NodeRepository>,
}

impl HealthChecker {
    pub fn new(
        registry: Arc<AgentRegistry>,
        groups: Arc<dyn GroupRepository>,
        nodes: Arc<dyn NodeRepository>,
    ) -> Self {
        Self {
            registry,
            groups,
            nodes,
        }
    }

    /// One full sweep over every health-check-enabled group, per the
    /// pseudocode in §4.7. Storage failures on an individual node are logged
    /// and the sweep continues with the next node.
    pub async fn run_sweep(&self) {
        let groups = match self.groups.list_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                error!("health sweep: failed to list groups: {e}");
                return;
            }
        };

        for group in groups.iter().filter(|g| g.health_check.enabled) {
            let nodes = match self.nodes.list_nodes(group.id).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    error!("health sweep: failed to list nodes for group {}: {e}", group.id.0);
                    continue;
                }
            };

            for node in nodes {
                let healthy = self.registry.is_online(&node.agent_id);

                if let Err(e) = self.nodes.update_node_health(node.id, healthy).await {
                    warn!("health sweep: failed to update health for node {}: {e}", node.id.0);
                    continue;
                }

                if !healthy {
                    let refreshed = match self.nodes.get_node(node.id).await {
                        Ok(Some(n)) => n,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!("health sweep: failed to reload node {}: {e}", node.id.0);
                            continue;
                        }
                    };
                    if refreshed.fail_count >= group.health_check.retries {
                        if let Err(e) = self.nodes.mark_node_unhealthy(node.id).await {
                            warn!("health sweep: failed to mark node {} unhealthy: {e}", node.id.0);
                        } else {
                            crate::core::metrics::NODES_MARKED_UNHEALTHY_TOTAL.inc();
                        }
                    }
                }
            }
        }

        crate::core::metrics::HEALTH_SWEEPS_TOTAL.inc();
    }

    /// Runs the sweep on a fixed interval until `shutdown` resolves.
    pub async fn run_tick_loop(self: Arc<Self>, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_sweep().await;
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }
    }
}
