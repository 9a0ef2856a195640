// benches/traffic_bench.rs

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use messageboy::core::model::{AgentId, RuleId};
use messageboy::core::repository::memory::MemoryRepositories;
use messageboy::core::traffic::TrafficCounter;
use tokio::runtime::Runtime;

fn add_bytes_hot_path(c: &mut Criterion) {
    let repo = Arc::new(MemoryRepositories::new());
    let counter = TrafficCounter::new(repo);
    let rule = RuleId(1);
    let agent = AgentId::from("bench-agent");

    c.bench_function("add_bytes_in_single_counter", |b| {
        b.iter(|| counter.add_bytes_in(rule, &agent, 1500));
    });
}

fn flush_many_counters(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let repo = Arc::new(MemoryRepositories::new());
    let counter = Arc::new(TrafficCounter::new(repo));
    for i in 0..256u64 {
        counter.add_bytes_in(RuleId(i), &AgentId::from(format!("agent-{i}")), 1000);
    }

    c.bench_function("flush_256_counters", |b| {
        b.iter(|| {
            for i in 0..256u64 {
                counter.add_bytes_in(RuleId(i), &AgentId::from(format!("agent-{i}")), 10);
            }
            rt.block_on(counter.flush_to_database()).unwrap();
        });
    });
}

criterion_group!(benches, add_bytes_hot_path, flush_many_counters);
criterion_main!(benches);
