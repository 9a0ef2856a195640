// src/core/repository/rules.rs

use crate::core::errors::CoreError;
use crate::core::model::{AgentId, ForwardRule, RuleId, RuleStatus};
use async_trait::async_trait;

/// Abstract access to forward rules.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn list_enabled_for_agent(&self, agent_id: &AgentId) -> Result<Vec<ForwardRule>, CoreError>;

    async fn get_by_id(&self, id: RuleId) -> Result<Option<ForwardRule>, CoreError>;

    async fn update_status(
        &self,
        id: RuleId,
        status: RuleStatus,
        last_error: Option<String>,
    ) -> Result<(), CoreError>;

    /// Resets every rule owned by `agent_id` to `pending`. Invoked when the
    /// agent's session is torn down, so a reconnect starts from a known state.
    async fn reset_all_statuses_for_agent(&self, agent_id: &AgentId) -> Result<(), CoreError>;
}
