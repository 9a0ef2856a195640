// src/core/metrics.rs

//! Defines and registers Prometheus metrics for the Manager.
//!
//! Metrics are registered exactly once for the process lifetime via
//! `lazy_static`.

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Gauge, register_counter, register_counter_vec, register_gauge};

lazy_static! {
    /// Number of agents currently holding an attached control-channel session.
    pub static ref AGENTS_ONLINE: Gauge =
        register_gauge!("messageboy_agents_online", "Number of agents with an attached session.").unwrap();

    /// Total agent sessions attached since startup.
    pub static ref SESSIONS_ATTACHED_TOTAL: Counter =
        register_counter!("messageboy_sessions_attached_total", "Total sessions attached to the registry.").unwrap();

    /// Total agent sessions closed (any cause) since startup.
    pub static ref SESSIONS_CLOSED_TOTAL: Counter =
        register_counter!("messageboy_sessions_closed_total", "Total sessions closed since startup.").unwrap();

    /// Total rule-change pushes sent, labeled by outcome ("delivered", "no_session").
    pub static ref RULE_PUSHES_TOTAL: CounterVec =
        register_counter_vec!("messageboy_rule_pushes_total", "Rule change pushes, labeled by outcome.", &["outcome"]).unwrap();

    /// Total health-check sweeps completed.
    pub static ref HEALTH_SWEEPS_TOTAL: Counter =
        register_counter!("messageboy_health_sweeps_total", "Total health checker sweeps completed.").unwrap();

    /// Total nodes marked unhealthy since startup.
    pub static ref NODES_MARKED_UNHEALTHY_TOTAL: Counter =
        register_counter!("messageboy_nodes_marked_unhealthy_total", "Total node health transitions to unhealthy.").unwrap();

    /// Total traffic flush cycles, labeled by outcome ("ok", "error").
    pub static ref TRAFFIC_FLUSHES_TOTAL: CounterVec =
        register_counter_vec!("messageboy_traffic_flushes_total", "Traffic flush cycles, labeled by outcome.", &["outcome"]).unwrap();

    /// Realtime sum of active connections across all (rule, agent) counters.
    pub static ref ACTIVE_CONNECTIONS: Gauge =
        register_gauge!("messageboy_active_connections", "Realtime active connection gauge, summed across counters.").unwrap();
}
