// src/core/repository/groups.rs

use crate::core::errors::CoreError;
use crate::core::model::{GroupId, Node, NodeId, ProxyGroup};
use async_trait::async_trait;

/// Abstract access to proxy groups.
#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<ProxyGroup>, CoreError>;

    async fn get_group_by_id(&self, id: GroupId) -> Result<Option<ProxyGroup>, CoreError>;

    async fn get_group_by_name(&self, name: &str) -> Result<Option<ProxyGroup>, CoreError>;
}

/// Abstract access to proxy group nodes. Implementations MUST respect the
/// ordering contracts below: they are what makes least-connections selection
/// an O(1) "take the first element" operation.
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// All nodes of a group, ordered by `priority` ascending, then `created_at`
    /// ascending.
    async fn list_nodes(&self, group_id: GroupId) -> Result<Vec<Node>, CoreError>;

    /// Only the healthy nodes of a group, ordered by `priority` ascending,
    /// then `active_conns` ascending.
    async fn list_healthy_nodes(&self, group_id: GroupId) -> Result<Vec<Node>, CoreError>;

    async fn get_node(&self, node_id: NodeId) -> Result<Option<Node>, CoreError>;

    /// Records a health probe outcome. `true` sets `status = healthy` and
    /// resets `fail_count` to zero; `false` increments `fail_count` only —
    /// the caller decides whether the new count crosses the group's retry
    /// threshold and, if so, calls [`NodeRepository::mark_node_unhealthy`].
    async fn update_node_health(&self, node_id: NodeId, healthy: bool) -> Result<(), CoreError>;

    /// Sets `status = unhealthy` unconditionally.
    async fn mark_node_unhealthy(&self, node_id: NodeId) -> Result<(), CoreError>;

    async fn increment_active_conns(&self, node_id: NodeId) -> Result<(), CoreError>;

    /// Decrements `active_conns`; a no-op when the counter is already zero
    /// (invariant (b): `active_conns >= 0`).
    async fn decrement_active_conns(&self, node_id: NodeId) -> Result<(), CoreError>;
}
