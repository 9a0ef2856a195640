// src/core/rpc/get_rules.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::ManagerState;
use crate::core::errors::CoreError;
use crate::core::model::{AgentId, ForwardRule};

#[derive(Debug, Deserialize)]
pub struct GetRulesParams {
    pub agent_id: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct GetRulesResult {
    pub rules: Vec<ForwardRule>,
    /// Monotonic timestamp the agent can use to detect staleness across pushes.
    pub version: i64,
}

/// `clientGetRules` (§4.8): lists the agent's enabled rules, pre-normalising
/// any `@name` relay-chain reference to `@id` where the group name resolves
/// (§9 Open Question: only the Manager-side pre-normalisation is in scope;
/// full data-plane relay resolution happens per-hop at the agents).
pub async fn client_get_rules(state: &ManagerState, params: GetRulesParams) -> Result<GetRulesResult, CoreError> {
    let agent_id = AgentId::from(params.agent_id);
    let mut rules = state.rules.list_enabled_for_agent(&agent_id).await?;

    for rule in rules.iter_mut() {
        for hop in rule.relay_chain.iter_mut() {
            if let Some(reference) = hop.strip_prefix('@') {
                if reference.parse::<u64>().is_ok() {
                    continue; // already an id
                }
                if let Ok(group) = state.balancer.lookup_group(reference).await {
                    *hop = format!("@{}", group.id.0);
                }
                // unresolvable names are left as-is; the agent's own
                // relay-time resolution gets another chance.
            }
        }
    }

    Ok(GetRulesResult {
        rules,
        version: Utc::now().timestamp_millis(),
    })
}
