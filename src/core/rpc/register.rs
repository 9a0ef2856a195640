// src/core/rpc/register.rs

use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::ManagerState;
use crate::core::errors::CoreError;
use crate::core::model::AgentStatus;

#[derive(Debug, Deserialize)]
pub struct RegisterParams {
    pub token: String,
    pub hostname: Option<String>,
    pub version: Option<String>,
    pub reported_ip: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RegisterResult {
    pub agent_id: String,
    pub secret_key: String,
    pub control_channel_endpoint: String,
    pub heartbeat_interval_secs: u64,
}

/// `clientRegister` (§4.8): resolves the agent by its pre-shared token, sets
/// it online, and returns the credential it should use for the persistent
/// channel. Idempotent — re-registering with the same token re-uses the
/// already-issued `secret_key` rather than minting a new one (§8 Round-trips).
pub async fn client_register(state: &ManagerState, params: RegisterParams) -> Result<RegisterResult, CoreError> {
    let agent = state
        .clients
        .get_by_token(&params.token)
        .await?
        .ok_or_else(|| CoreError::NotFound("no agent registered for this token".into()))?;

    let secret_key = if agent.secret_key.is_empty() {
        generate_secret()
    } else {
        agent.secret_key.clone()
    };

    state
        .clients
        .update_profile(&agent.agent_id, params.hostname, params.version, Some(secret_key.clone()))
        .await?;
    state
        .clients
        .update_liveness(&agent.agent_id, AgentStatus::Online, params.reported_ip, Utc::now())
        .await?;

    Ok(RegisterResult {
        agent_id: agent.agent_id.0,
        secret_key,
        control_channel_endpoint: state.channel_path.clone(),
        heartbeat_interval_secs: state.heartbeat_interval.as_secs(),
    })
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
