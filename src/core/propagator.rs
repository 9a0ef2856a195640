// src/core/propagator.rs

//! The Rule Propagator (§4.4): fans rule mutations out to affected agents
//! and, for a listener move, probes the new owner before the mutation is
//! allowed to become durable.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::core::errors::CoreError;
use crate::core::model::{AgentId, RuleId};
use crate::core::registry::AgentRegistry;
use std::sync::Arc;

const RULES_UPDATED: &str = "rules_updated";
const CHECK_PORT: &str = "check_port";

#[derive(Debug, Serialize)]
struct CheckPortParams {
    rule_id: u64,
    listen_addr: String,
}

#[derive(Debug, Deserialize)]
struct CheckPortResult {
    available: bool,
    #[serde(default)]
    reason: Option<String>,
}

pub struct RulePropagator {
    registry: Arc<AgentRegistry>,
    pub probe_timeout: Duration,
    pub settle_delay: Duration,
}

impl RulePropagator {
    pub fn new(registry: Arc<AgentRegistry>, probe_timeout: Duration, settle_delay: Duration) -> Self {
        Self {
            registry,
            probe_timeout,
            settle_delay,
        }
    }

    /// Pushes `rules_updated` to `agent_id`'s session if one exists. The
    /// agent is expected to reconcile by calling `clientGetRules`. Returns
    /// whether a session existed to push to.
    pub fn notify(&self, agent_id: &AgentId) -> bool {
        let Some(session) = self.registry.get(agent_id) else {
            crate::core::metrics::RULE_PUSHES_TOTAL
                .with_label_values(&["no_session"])
                .inc();
            return false;
        };
        let delivered = session.push(RULES_UPDATED, serde_json::Value::Null).is_ok();
        crate::core::metrics::RULE_PUSHES_TOTAL
            .with_label_values(&[if delivered { "delivered" } else { "no_session" }])
            .inc();
        delivered
    }

    /// Issues a `check_port` request on `agent_id`'s session, excluding
    /// collisions from `rule_id` itself. A negative or timed-out probe is a
    /// conflict — the caller MUST NOT durably commit the listener move.
    pub async fn check_port_available(
        &self,
        agent_id: &AgentId,
        rule_id: RuleId,
        listen_addr: &str,
    ) -> Result<(), CoreError> {
        let session = self
            .registry
            .get(agent_id)
            .ok_or_else(|| CoreError::Conflict(format!("agent {agent_id} is not connected")))?;

        let params = json!(CheckPortParams {
            rule_id: rule_id.0,
            listen_addr: listen_addr.to_string(),
        });

        let response = session.call(CHECK_PORT, params, self.probe_timeout).await?;
        let parsed: CheckPortResult = serde_json::from_value(response)
            .map_err(|e| CoreError::Internal(format!("malformed check_port response: {e}")))?;

        if parsed.available {
            Ok(())
        } else {
            Err(CoreError::Conflict(parsed.reason.unwrap_or_else(|| {
                format!("listen_addr {listen_addr} is unavailable on agent {agent_id}")
            })))
        }
    }

    /// Orchestrates a listener move from `old_agent` to `new_agent`: probes
    /// the new owner first (refusing the mutation on a negative/timed-out
    /// probe, before anything is committed), then notifies the old owner,
    /// waits `settle_delay` for it to release the port, then notifies the
    /// new owner (§4.4 ordering guarantee).
    pub async fn propagate_listener_move(
        &self,
        rule_id: RuleId,
        old_agent: &AgentId,
        new_agent: &AgentId,
        listen_addr: &str,
    ) -> Result<(), CoreError> {
        self.check_port_available(new_agent, rule_id, listen_addr).await?;

        info!("listener move for rule {}: notifying old owner {old_agent}", rule_id.0);
        self.notify(old_agent);

        tokio::time::sleep(self.settle_delay).await;

        info!("listener move for rule {}: notifying new owner {new_agent}", rule_id.0);
        if !self.notify(new_agent) {
            warn!("new owner {new_agent} has no active session to receive rules_updated");
        }

        Ok(())
    }
}
