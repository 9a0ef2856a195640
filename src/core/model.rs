// src/core/model.rs

//! Entities and value types of the data model: agents, forward rules, proxy
//! groups and nodes, and traffic rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier for an agent, assigned at provisioning time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        AgentId(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        AgentId(s)
    }
}

/// Server-assigned identifier for a forward rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub u64);

/// Server-assigned identifier for a proxy group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u64);

/// Server-assigned identifier for a node (a group/agent binding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Liveness status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
}

/// A registered forwarding agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    /// Pre-shared registration capability token.
    pub token: String,
    /// Server-issued post-registration credential.
    pub secret_key: String,
    pub status: AgentStatus,
    pub last_ip: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub hostname: Option<String>,
    pub version: Option<String>,
}

/// The kind of forward rule: a direct forward, or a relay through a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RuleType {
    Direct,
    Relay,
}

/// The runtime status of a forward rule as last reported by its agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RuleStatus {
    Pending,
    Running,
    Error,
    Stopped,
}

/// A named listener binding owned by one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardRule {
    pub id: RuleId,
    pub name: String,
    pub enabled: bool,
    pub rule_type: RuleType,
    pub listen_addr: String,
    pub listen_agent: AgentId,
    /// Direct-rule target; empty for relay rules.
    pub target_addr: Option<String>,
    /// Relay-rule chain of agent ids or `@group` references; empty for direct rules.
    pub relay_chain: Vec<String>,
    /// Relay-rule final hop address.
    pub exit_addr: Option<String>,
    pub status: RuleStatus,
    pub last_error: Option<String>,
}

impl ForwardRule {
    /// Invariant (a): a direct rule has a target and an empty chain; a relay
    /// rule has a nonempty chain and an exit address.
    pub fn validate_shape(&self) -> Result<(), String> {
        match self.rule_type {
            RuleType::Direct => {
                if self.target_addr.is_none() || !self.relay_chain.is_empty() {
                    return Err(
                        "direct rule must set target_addr and have an empty relay_chain".into(),
                    );
                }
            }
            RuleType::Relay => {
                if self.relay_chain.is_empty() || self.exit_addr.is_none() {
                    return Err(
                        "relay rule must have a nonempty relay_chain and an exit_addr".into(),
                    );
                }
            }
        }
        Ok(())
    }
}

/// Load-balancing policy for a proxy group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LbPolicy {
    RoundRobin,
    Random,
    LeastConn,
    IpHash,
}

/// Health-check configuration carried by a proxy group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: std::time::Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: std::time::Duration,
    pub retries: u32,
}

/// A named load-balancing pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyGroup {
    pub id: GroupId,
    pub name: String,
    pub policy: LbPolicy,
    pub health_check: HealthCheckConfig,
}

/// Health status of a node as last evaluated by the health checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

/// A binding of a proxy group to a backing agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub group_id: GroupId,
    pub agent_id: AgentId,
    pub priority: i32,
    pub weight: i32,
    pub active_conns: i64,
    pub total_conns: u64,
    pub status: NodeStatus,
    pub fail_count: u32,
    pub last_check_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An immutable, append-only accounting row produced by a traffic flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficRow {
    pub rule_id: RuleId,
    pub agent_id: AgentId,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Count of report events folded into this row, not a gauge.
    pub connections: u64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}
