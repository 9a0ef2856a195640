// src/core/rpc/mod.rs

//! Core-facing RPC methods (§4.8): the thin verbs an agent calls over the
//! authenticated transport. Each is a free function taking the shared
//! [`ManagerState`] and a typed parameter struct, returning a typed result
//! or a [`CoreError`].
//!
//! The RPC transport itself (parameter deserialization, authentication,
//! response envelope) lives outside this crate (§1 Out of scope); these
//! functions are what a transport dispatches into once it has parsed a
//! call's parameters into the method's params type.

mod get_rules;
mod heartbeat;
mod register;
mod report_rule_status;
mod report_traffic;

pub use get_rules::{client_get_rules, GetRulesParams, GetRulesResult};
pub use heartbeat::{client_heartbeat, HeartbeatParams, HeartbeatResult};
pub use register::{client_register, RegisterParams, RegisterResult};
pub use report_rule_status::{client_report_rule_status, RuleStatusReport, ReportRuleStatusParams, ReportRuleStatusResult};
pub use report_traffic::{client_report_traffic, TrafficReport, ReportTrafficParams, ReportTrafficResult};

use std::sync::Arc;

use crate::core::balancer::LoadBalancer;
use crate::core::propagator::RulePropagator;
use crate::core::registry::AgentRegistry;
use crate::core::repository::{ClientRepository, GroupRepository, NodeRepository, RuleRepository};
use crate::core::traffic::TrafficCounter;

/// The collaborators every core-facing RPC method needs. Built once at
/// startup by `server::initialization` and shared behind an `Arc` (§9
/// Global mutable state: constructed explicitly, not an implicit global).
pub struct ManagerState {
    pub clients: Arc<dyn ClientRepository>,
    pub rules: Arc<dyn RuleRepository>,
    pub groups: Arc<dyn GroupRepository>,
    pub nodes: Arc<dyn NodeRepository>,
    pub registry: Arc<AgentRegistry>,
    pub traffic: Arc<TrafficCounter>,
    pub balancer: Arc<LoadBalancer>,
    pub propagator: Arc<RulePropagator>,
    pub heartbeat_interval: std::time::Duration,
    pub channel_path: String,
}
