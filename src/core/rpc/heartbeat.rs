// src/core/rpc/heartbeat.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::ManagerState;
use crate::core::errors::CoreError;
use crate::core::model::{AgentId, AgentStatus};

#[derive(Debug, Deserialize)]
pub struct HeartbeatParams {
    pub agent_id: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HeartbeatResult {
    pub ack: bool,
    pub server_time: i64,
}

/// `clientHeartbeat` (§4.8): touches liveness only. Per §9's Open Question,
/// this is treated as a redundant refresh alongside the channel's presence
/// in the Agent Registry, which is the authoritative liveness signal used by
/// the Health Checker.
pub async fn client_heartbeat(state: &ManagerState, params: HeartbeatParams) -> Result<HeartbeatResult, CoreError> {
    let agent_id = AgentId::from(params.agent_id);
    let now = Utc::now();
    state
        .clients
        .update_liveness(&agent_id, AgentStatus::Online, None, now)
        .await?;
    Ok(HeartbeatResult {
        ack: true,
        server_time: now.timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Agent;
    use crate::core::repository::memory::MemoryRepositories;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn heartbeat_touches_liveness() {
        let repo = Arc::new(MemoryRepositories::new());
        repo.insert_agent(Agent {
            agent_id: AgentId::from("a1"),
            token: "tok".into(),
            secret_key: "s".into(),
            status: AgentStatus::Offline,
            last_ip: None,
            last_seen: None,
            hostname: None,
            version: None,
        });
        let registry = Arc::new(crate::core::registry::AgentRegistry::new());
        let state = super::super::ManagerState {
            clients: repo.clone(),
            rules: repo.clone(),
            groups: repo.clone(),
            nodes: repo.clone(),
            registry: registry.clone(),
            traffic: Arc::new(crate::core::traffic::TrafficCounter::new(repo.clone())),
            balancer: Arc::new(crate::core::balancer::LoadBalancer::new(repo.clone(), repo.clone())),
            propagator: Arc::new(crate::core::propagator::RulePropagator::new(
                registry,
                Duration::from_secs(5),
                Duration::from_millis(500),
            )),
            heartbeat_interval: Duration::from_secs(30),
            channel_path: "/ws/agent".into(),
        };

        let result = client_heartbeat(&state, HeartbeatParams { agent_id: "a1".into() }).await.unwrap();
        assert!(result.ack);
        let agent = repo.get_by_id(&AgentId::from("a1")).await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Online);
        assert!(agent.last_seen.is_some());
    }
}
