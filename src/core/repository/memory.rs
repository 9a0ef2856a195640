// src/core/repository/memory.rs

//! An in-memory reference implementation of the repository traits, backed by
//! `dashmap`-keyed tables. Real deployments are expected to substitute a
//! durable implementation; this one exists so the binary and the test suite
//! have something to run against.

use super::clients::ClientRepository;
use super::groups::{GroupRepository, NodeRepository};
use super::rules::RuleRepository;
use super::traffic::TrafficRowRepository;
use crate::core::errors::CoreError;
use crate::core::model::{
    Agent, AgentId, AgentStatus, ForwardRule, GroupId, Node, NodeId, NodeStatus, ProxyGroup,
    RuleId, RuleStatus, TrafficRow,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

/// A single in-process store for all five tables, sufficient for the shipped
/// binary's default mode and for exercising the core in tests.
#[derive(Default)]
pub struct MemoryRepositories {
    pub clients: DashMap<AgentId, Agent>,
    pub rules: DashMap<RuleId, ForwardRule>,
    pub groups: DashMap<GroupId, ProxyGroup>,
    pub nodes: DashMap<NodeId, Node>,
    pub traffic_rows: Mutex<Vec<TrafficRow>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_agent(&self, agent: Agent) {
        self.clients.insert(agent.agent_id.clone(), agent);
    }

    pub fn insert_rule(&self, rule: ForwardRule) {
        self.rules.insert(rule.id, rule);
    }

    pub fn insert_group(&self, group: ProxyGroup) {
        self.groups.insert(group.id, group);
    }

    pub fn insert_node(&self, node: Node) {
        self.nodes.insert(node.id, node);
    }
}

#[async_trait]
impl ClientRepository for MemoryRepositories {
    async fn get_by_id(&self, id: &AgentId) -> Result<Option<Agent>, CoreError> {
        Ok(self.clients.get(id).map(|e| e.value().clone()))
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Agent>, CoreError> {
        Ok(self
            .clients
            .iter()
            .find(|e| e.value().token == token)
            .map(|e| e.value().clone()))
    }

    async fn update_liveness(
        &self,
        id: &AgentId,
        status: AgentStatus,
        last_ip: Option<String>,
        last_seen: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut entry = self
            .clients
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("agent {id}")))?;
        entry.status = status;
        if last_ip.is_some() {
            entry.last_ip = last_ip;
        }
        entry.last_seen = Some(last_seen);
        Ok(())
    }

    async fn update_profile(
        &self,
        id: &AgentId,
        hostname: Option<String>,
        version: Option<String>,
        secret_key: Option<String>,
    ) -> Result<(), CoreError> {
        let mut entry = self
            .clients
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("agent {id}")))?;
        if hostname.is_some() {
            entry.hostname = hostname;
        }
        if version.is_some() {
            entry.version = version;
        }
        if let Some(secret) = secret_key {
            entry.secret_key = secret;
        }
        Ok(())
    }
}

#[async_trait]
impl RuleRepository for MemoryRepositories {
    async fn list_enabled_for_agent(&self, agent_id: &AgentId) -> Result<Vec<ForwardRule>, CoreError> {
        Ok(self
            .rules
            .iter()
            .filter(|e| e.value().enabled && &e.value().listen_agent == agent_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn get_by_id(&self, id: RuleId) -> Result<Option<ForwardRule>, CoreError> {
        Ok(self.rules.get(&id).map(|e| e.value().clone()))
    }

    async fn update_status(
        &self,
        id: RuleId,
        status: RuleStatus,
        last_error: Option<String>,
    ) -> Result<(), CoreError> {
        let mut entry = self
            .rules
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("rule {}", id.0)))?;
        entry.status = status;
        entry.last_error = last_error;
        Ok(())
    }

    async fn reset_all_statuses_for_agent(&self, agent_id: &AgentId) -> Result<(), CoreError> {
        for mut entry in self.rules.iter_mut() {
            if &entry.value().listen_agent == agent_id {
                entry.status = RuleStatus::Pending;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GroupRepository for MemoryRepositories {
    async fn list_groups(&self) -> Result<Vec<ProxyGroup>, CoreError> {
        Ok(self.groups.iter().map(|e| e.value().clone()).collect())
    }

    async fn get_group_by_id(&self, id: GroupId) -> Result<Option<ProxyGroup>, CoreError> {
        Ok(self.groups.get(&id).map(|e| e.value().clone()))
    }

    async fn get_group_by_name(&self, name: &str) -> Result<Option<ProxyGroup>, CoreError> {
        Ok(self
            .groups
            .iter()
            .find(|e| e.value().name == name)
            .map(|e| e.value().clone()))
    }
}

#[async_trait]
impl NodeRepository for MemoryRepositories {
    async fn list_nodes(&self, group_id: GroupId) -> Result<Vec<Node>, CoreError> {
        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|e| e.value().group_id == group_id)
            .map(|e| e.value().clone())
            .collect();
        nodes.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(nodes)
    }

    async fn list_healthy_nodes(&self, group_id: GroupId) -> Result<Vec<Node>, CoreError> {
        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|e| e.value().group_id == group_id && e.value().status == NodeStatus::Healthy)
            .map(|e| e.value().clone())
            .collect();
        nodes.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.active_conns.cmp(&b.active_conns))
        });
        Ok(nodes)
    }

    async fn get_node(&self, node_id: NodeId) -> Result<Option<Node>, CoreError> {
        Ok(self.nodes.get(&node_id).map(|e| e.value().clone()))
    }

    async fn update_node_health(&self, node_id: NodeId, healthy: bool) -> Result<(), CoreError> {
        let mut entry = self
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| CoreError::NotFound(format!("node {}", node_id.0)))?;
        if healthy {
            entry.status = NodeStatus::Healthy;
            entry.fail_count = 0;
        } else {
            entry.fail_count += 1;
        }
        entry.last_check_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_node_unhealthy(&self, node_id: NodeId) -> Result<(), CoreError> {
        let mut entry = self
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| CoreError::NotFound(format!("node {}", node_id.0)))?;
        entry.status = NodeStatus::Unhealthy;
        Ok(())
    }

    async fn increment_active_conns(&self, node_id: NodeId) -> Result<(), CoreError> {
        let mut entry = self
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| CoreError::NotFound(format!("node {}", node_id.0)))?;
        entry.active_conns += 1;
        entry.total_conns += 1;
        Ok(())
    }

    async fn decrement_active_conns(&self, node_id: NodeId) -> Result<(), CoreError> {
        let mut entry = self
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| CoreError::NotFound(format!("node {}", node_id.0)))?;
        if entry.active_conns > 0 {
            entry.active_conns -= 1;
        }
        Ok(())
    }
}

#[async_trait]
impl TrafficRowRepository for MemoryRepositories {
    async fn insert_batch(&self, rows: Vec<TrafficRow>) -> Result<(), CoreError> {
        self.traffic_rows.lock().extend(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str) -> Agent {
        Agent {
            agent_id: AgentId::from(id),
            token: format!("tok-{id}"),
            secret_key: String::new(),
            status: AgentStatus::Offline,
            last_ip: None,
            last_seen: None,
            hostname: None,
            version: None,
        }
    }

    #[tokio::test]
    async fn get_by_token_finds_agent() {
        let repo = MemoryRepositories::new();
        repo.insert_agent(agent("a1"));
        let found = repo.get_by_token("tok-a1").await.unwrap().unwrap();
        assert_eq!(found.agent_id, AgentId::from("a1"));
    }

    #[tokio::test]
    async fn decrement_active_conns_floors_at_zero() {
        let repo = MemoryRepositories::new();
        let node = Node {
            id: NodeId(1),
            group_id: GroupId(1),
            agent_id: AgentId::from("a1"),
            priority: 0,
            weight: 1,
            active_conns: 0,
            total_conns: 0,
            status: NodeStatus::Healthy,
            fail_count: 0,
            last_check_at: None,
            created_at: Utc::now(),
        };
        repo.insert_node(node);
        repo.decrement_active_conns(NodeId(1)).await.unwrap();
        let n = repo.get_node(NodeId(1)).await.unwrap().unwrap();
        assert_eq!(n.active_conns, 0);
    }

    #[tokio::test]
    async fn list_healthy_nodes_sorted_by_priority_then_active_conns() {
        let repo = MemoryRepositories::new();
        let mk = |id, priority, active_conns| Node {
            id: NodeId(id),
            group_id: GroupId(1),
            agent_id: AgentId::from("a"),
            priority,
            weight: 1,
            active_conns,
            total_conns: 0,
            status: NodeStatus::Healthy,
            fail_count: 0,
            last_check_at: None,
            created_at: Utc::now(),
        };
        repo.insert_node(mk(1, 0, 5));
        repo.insert_node(mk(2, 0, 2));
        repo.insert_node(mk(3, 0, 10));
        let nodes = repo.list_healthy_nodes(GroupId(1)).await.unwrap();
        let ids: Vec<u64> = nodes.iter().map(|n| n.id.0).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }
}
