// src/server/initialization.rs

//! Builds the shared [`ManagerState`] the RPC methods and background tasks
//! run against. The shipped binary wires the in-memory repositories;
//! production deployments are expected to substitute a durable
//! implementation of the same traits (§4.1).

use std::sync::Arc;

use crate::config::ManagerConfig;
use crate::core::balancer::LoadBalancer;
use crate::core::propagator::RulePropagator;
use crate::core::registry::AgentRegistry;
use crate::core::repository::memory::MemoryRepositories;
use crate::core::rpc::ManagerState;
use crate::core::traffic::TrafficCounter;

pub fn build_state(config: &ManagerConfig) -> Arc<ManagerState> {
    let repos = Arc::new(MemoryRepositories::new());
    let registry = Arc::new(AgentRegistry::new());
    let traffic = Arc::new(TrafficCounter::new(repos.clone()));
    let balancer = Arc::new(LoadBalancer::new(repos.clone(), repos.clone()));
    let propagator = Arc::new(RulePropagator::new(
        registry.clone(),
        config.probe_timeout,
        config.settle_delay,
    ));

    Arc::new(ManagerState {
        clients: repos.clone(),
        rules: repos.clone(),
        groups: repos.clone(),
        nodes: repos.clone(),
        registry,
        traffic,
        balancer,
        propagator,
        heartbeat_interval: config.ping_interval,
        channel_path: config.channel_path.clone(),
    })
}
