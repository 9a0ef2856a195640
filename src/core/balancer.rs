// src/core/balancer.rs

//! The Load Balancer (§4.6): target resolution between a bare agent id and a
//! `@group` reference, and node selection across the policies described in
//! §3's Polymorphism note — a tagged `SelectionPolicy` dispatched once per
//! `resolve()` call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;

use crate::core::errors::CoreError;
use crate::core::model::{AgentId, GroupId, LbPolicy, Node, NodeId};
use crate::core::repository::{GroupRepository, NodeRepository};

/// The resolved target of a `relay_chain` hop or a direct rule's
/// `listen_agent`/`target_addr`: either a bare agent id, or a node picked
/// from a group's healthy set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub agent_id: AgentId,
    pub node_id: Option<NodeId>,
}

pub struct LoadBalancer {
    groups: Arc<dyn GroupRepository>,
    nodes: Arc<dyn NodeRepository>,
    /// Lazily created, never removed — bounded by group count (§3 Ownership).
    round_robin_cursors: DashMap<GroupId, AtomicU64>,
}

impl LoadBalancer {
    pub fn new(groups: Arc<dyn GroupRepository>, nodes: Arc<dyn NodeRepository>) -> Self {
        Self {
            groups,
            nodes,
            round_robin_cursors: DashMap::new(),
        }
    }

    /// Resolves `target` against `client_ip`: a bare agent id passes
    /// through unchanged; a `@X` reference is looked up as a group id then a
    /// group name, and a node is selected from its healthy set.
    pub async fn resolve(&self, target: &str, client_ip: &str) -> Result<ResolvedTarget, CoreError> {
        let Some(reference) = target.strip_prefix('@') else {
            return Ok(ResolvedTarget {
                agent_id: AgentId::from(target),
                node_id: None,
            });
        };

        let group = self.lookup_group(reference).await?;
        let healthy = self.nodes.list_healthy_nodes(group.id).await?;
        if healthy.is_empty() {
            return Err(CoreError::NotFound(format!(
                "no healthy nodes in group {}",
                group.name
            )));
        }

        let picked = self.select(group.id, group.policy, &healthy, client_ip);
        Ok(ResolvedTarget {
            agent_id: picked.agent_id.clone(),
            node_id: Some(picked.id),
        })
    }

    /// Looks a `@X` reference up as a group id first, then a group name.
    /// Exposed so callers like `clientGetRules` can pre-normalise
    /// `@name` → `@id` in a relay chain without duplicating this lookup.
    pub async fn lookup_group(&self, reference: &str) -> Result<crate::core::model::ProxyGroup, CoreError> {
        if let Ok(id) = reference.parse::<u64>() {
            if let Some(group) = self.groups.get_group_by_id(GroupId(id)).await? {
                return Ok(group);
            }
        }
        self.groups
            .get_group_by_name(reference)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("group {reference} not found")))
    }

    /// Picks one node from `healthy`, which is already ordered by
    /// (priority asc, active_conns asc) per the repository contract.
    fn select<'a>(&self, group_id: GroupId, policy: LbPolicy, healthy: &'a [Node], client_ip: &str) -> &'a Node {
        match policy {
            LbPolicy::RoundRobin => {
                let cursor = self
                    .round_robin_cursors
                    .entry(group_id)
                    .or_insert_with(|| AtomicU64::new(0));
                let idx = cursor.fetch_add(1, Ordering::Relaxed) as usize % healthy.len();
                &healthy[idx]
            }
            LbPolicy::Random => {
                let idx = rand::thread_rng().gen_range(0..healthy.len());
                &healthy[idx]
            }
            LbPolicy::LeastConn => &healthy[0],
            LbPolicy::IpHash => {
                let idx = fnv1a_32(client_ip.as_bytes()) as usize % healthy.len();
                &healthy[idx]
            }
        }
    }

    pub async fn on_acquire(&self, node_id: NodeId) -> Result<(), CoreError> {
        self.nodes.increment_active_conns(node_id).await
    }

    pub async fn on_release(&self, node_id: NodeId) -> Result<(), CoreError> {
        self.nodes.decrement_active_conns(node_id).await
    }
}

/// 32-bit FNV-1a, used for ip_hash (§4.6): stable across calls given the
/// same bytes and the same healthy-set length.
fn fnv1a_32(bytes: &[u8]) -> u32 {
    const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;
    const FNV_PRIME: u32 = 0x01000193;
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
