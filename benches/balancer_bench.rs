// benches/balancer_bench.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use messageboy::core::balancer::LoadBalancer;
use messageboy::core::model::{
    AgentId, GroupId, HealthCheckConfig, LbPolicy, Node, NodeId, NodeStatus, ProxyGroup,
};
use messageboy::core::repository::memory::MemoryRepositories;
use tokio::runtime::Runtime;

fn build_group(repo: &MemoryRepositories, policy: LbPolicy, node_count: u64) {
    repo.insert_group(ProxyGroup {
        id: GroupId(1),
        name: "bench-group".into(),
        policy,
        health_check: HealthCheckConfig {
            enabled: true,
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(2),
            retries: 3,
        },
    });
    for i in 0..node_count {
        repo.insert_node(Node {
            id: NodeId(i),
            group_id: GroupId(1),
            agent_id: AgentId::from(format!("agent-{i}")),
            priority: 0,
            weight: 1,
            active_conns: i as i64,
            total_conns: 0,
            status: NodeStatus::Healthy,
            fail_count: 0,
            last_check_at: None,
            created_at: Utc::now(),
        });
    }
}

fn round_robin_resolve(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let repo = Arc::new(MemoryRepositories::new());
    build_group(&repo, LbPolicy::RoundRobin, 64);
    let balancer = LoadBalancer::new(repo.clone(), repo.clone());

    c.bench_function("round_robin_resolve_64_nodes", |b| {
        b.iter(|| rt.block_on(balancer.resolve("@bench-group", "")).unwrap());
    });
}

fn ip_hash_resolve(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let repo = Arc::new(MemoryRepositories::new());
    build_group(&repo, LbPolicy::IpHash, 64);
    let balancer = LoadBalancer::new(repo.clone(), repo.clone());

    c.bench_function("ip_hash_resolve_64_nodes", |b| {
        b.iter(|| rt.block_on(balancer.resolve("@bench-group", "203.0.113.42")).unwrap());
    });
}

criterion_group!(benches, round_robin_resolve, ip_hash_resolve);
criterion_main!(benches);
