// src/core/repository/clients.rs

use crate::core::errors::CoreError;
use crate::core::model::{Agent, AgentId, AgentStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Abstract access to the agent/client inventory.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn get_by_id(&self, id: &AgentId) -> Result<Option<Agent>, CoreError>;

    async fn get_by_token(&self, token: &str) -> Result<Option<Agent>, CoreError>;

    /// Updates liveness fields only; does not touch the profile.
    async fn update_liveness(
        &self,
        id: &AgentId,
        status: AgentStatus,
        last_ip: Option<String>,
        last_seen: DateTime<Utc>,
    ) -> Result<(), CoreError>;

    /// Updates profile fields reported at registration time. `secret_key` is
    /// only written when `Some` (idempotent re-registration keeps the
    /// previously issued secret).
    async fn update_profile(
        &self,
        id: &AgentId,
        hostname: Option<String>,
        version: Option<String>,
        secret_key: Option<String>,
    ) -> Result<(), CoreError>;
}
