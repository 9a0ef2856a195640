// src/core/traffic.rs

//! The Traffic Counter (§4.5): lock-free in-memory accumulators keyed by
//! (rule_id, agent_id), a bandwidth sampler, and a periodic flush to durable
//! storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{error, info};

use crate::core::errors::CoreError;
use crate::core::model::{AgentId, RuleId, TrafficRow};
use crate::core::repository::TrafficRowRepository;

/// One (rule, agent) pair's live accounting record. Byte counters are atomic
/// so `AddBytesIn`/`AddBytesOut` never take a lock; bookkeeping for bandwidth
/// sampling lives behind a small mutex since it is read-modify-write and
/// touched far less often than the hot add path.
struct CounterRecord {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    active_conns: AtomicI64,
    /// Count of report events applied to this key since the last flush —
    /// what `flush_to_database` writes into a row's `connections` field
    /// (§4.5: "the count of events, not gauge").
    events: AtomicU64,
    sample: Mutex<BandwidthSample>,
}

struct BandwidthSample {
    prev_bytes_in: u64,
    prev_bytes_out: u64,
    last_sample_at: chrono::DateTime<Utc>,
}

impl Default for CounterRecord {
    fn default() -> Self {
        CounterRecord {
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            active_conns: AtomicI64::new(0),
            events: AtomicU64::new(0),
            sample: Mutex::new(BandwidthSample {
                prev_bytes_in: 0,
                prev_bytes_out: 0,
                last_sample_at: Utc::now(),
            }),
        }
    }
}

/// One agent's derived bandwidth, in bytes/second, summed across its rules.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentBandwidth {
    pub agent_id: AgentId,
    pub b_in: f64,
    pub b_out: f64,
}

#[derive(Hash, Eq, PartialEq, Clone)]
struct CounterKey(RuleId, AgentId);

/// Owns every live traffic counter for the process. Repositories are only
/// ever written through [`TrafficCounter::flush_to_database`].
pub struct TrafficCounter {
    counters: DashMap<CounterKey, CounterRecord>,
    repo: Arc<dyn TrafficRowRepository>,
}

impl TrafficCounter {
    pub fn new(repo: Arc<dyn TrafficRowRepository>) -> Self {
        Self {
            counters: DashMap::new(),
            repo,
        }
    }

    fn record(&self, rule_id: RuleId, agent_id: &AgentId) -> dashmap::mapref::one::Ref<'_, CounterKey, CounterRecord> {
        let key = CounterKey(rule_id, agent_id.clone());
        self.counters.entry(key.clone()).or_default();
        self.counters.get(&key).expect("just inserted")
    }

    pub fn add_bytes_in(&self, rule_id: RuleId, agent_id: &AgentId, delta: u64) {
        self.record(rule_id, agent_id).bytes_in.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn add_bytes_out(&self, rule_id: RuleId, agent_id: &AgentId, delta: u64) {
        self.record(rule_id, agent_id).bytes_out.fetch_add(delta, Ordering::Relaxed);
    }

    /// Marks one report event applied to (rule_id, agent_id); tallied into
    /// the row's `connections` count at the next flush (§4.5).
    pub fn record_event(&self, rule_id: RuleId, agent_id: &AgentId) {
        self.record(rule_id, agent_id).events.fetch_add(1, Ordering::Relaxed);
    }

    /// Overwrite gauge, not an increment (§3 invariant).
    pub fn set_active_conns(&self, rule_id: RuleId, agent_id: &AgentId, n: i64) {
        self.record(rule_id, agent_id).active_conns.store(n, Ordering::Relaxed);
        crate::core::metrics::ACTIVE_CONNECTIONS.set(self.get_realtime_active_conns() as f64);
    }

    pub fn get_realtime_active_conns(&self) -> i64 {
        self.counters
            .iter()
            .map(|e| e.value().active_conns.load(Ordering::Relaxed))
            .sum()
    }

    /// Recomputes `prev_bytes_*`/`last_sample_at` for every record against
    /// its current byte counts. A record's first call yields zero bandwidth
    /// (no prior sample to diff against).
    pub fn update_bandwidth(&self) {
        let now = Utc::now();
        for entry in self.counters.iter() {
            let record = entry.value();
            let mut sample = record.sample.lock();
            sample.prev_bytes_in = record.bytes_in.load(Ordering::Relaxed);
            sample.prev_bytes_out = record.bytes_out.load(Ordering::Relaxed);
            sample.last_sample_at = now;
        }
    }

    /// Per-agent bandwidth derived from the most recent `update_bandwidth`
    /// sample, summed across that agent's rules.
    pub fn get_client_bandwidth(&self) -> Vec<AgentBandwidth> {
        let mut totals: HashMap<AgentId, (f64, f64)> = HashMap::new();
        let now = Utc::now();
        for entry in self.counters.iter() {
            let key = entry.key();
            let record = entry.value();
            let sample = record.sample.lock();
            let elapsed = (now - sample.last_sample_at).num_milliseconds().max(1) as f64 / 1000.0;
            let bytes_in = record.bytes_in.load(Ordering::Relaxed);
            let bytes_out = record.bytes_out.load(Ordering::Relaxed);
            let b_in = bytes_in.saturating_sub(sample.prev_bytes_in) as f64 / elapsed;
            let b_out = bytes_out.saturating_sub(sample.prev_bytes_out) as f64 / elapsed;
            let entry = totals.entry(key.1.clone()).or_insert((0.0, 0.0));
            entry.0 += b_in;
            entry.1 += b_out;
        }
        totals
            .into_iter()
            .map(|(agent_id, (b_in, b_out))| AgentBandwidth { agent_id, b_in, b_out })
            .collect()
    }

    /// Atomically snapshots every record's byte counters into a durable row
    /// and resets them to zero; records that saw no traffic since the last
    /// flush are skipped. On repository failure the counters are left
    /// untouched so the next tick retries the same totals (§4.5).
    pub async fn flush_to_database(&self) -> Result<(), CoreError> {
        let now = Utc::now();
        let mut rows = Vec::new();
        let mut snapshots: Vec<(CounterKey, u64, u64, u64)> = Vec::new();

        for entry in self.counters.iter() {
            let key = entry.key().clone();
            let record = entry.value();
            let bytes_in = record.bytes_in.swap(0, Ordering::AcqRel);
            let bytes_out = record.bytes_out.swap(0, Ordering::AcqRel);
            let events = record.events.swap(0, Ordering::AcqRel);
            if bytes_in == 0 && bytes_out == 0 {
                continue;
            }
            rows.push(TrafficRow {
                rule_id: key.0,
                agent_id: key.1.clone(),
                bytes_in,
                bytes_out,
                connections: events,
                period_start: now,
                period_end: now,
            });
            snapshots.push((key, bytes_in, bytes_out, events));
        }

        if rows.is_empty() {
            crate::core::metrics::TRAFFIC_FLUSHES_TOTAL.with_label_values(&["ok"]).inc();
            return Ok(());
        }

        match self.repo.insert_batch(rows).await {
            Ok(()) => {
                crate::core::metrics::TRAFFIC_FLUSHES_TOTAL.with_label_values(&["ok"]).inc();
                info!("flushed {} traffic rows", snapshots.len());
                Ok(())
            }
            Err(e) => {
                // Counters were already zeroed; restore the snapshot so the
                // next tick retries the same totals rather than losing them.
                for (key, bytes_in, bytes_out, events) in snapshots {
                    if let Some(record) = self.counters.get(&key) {
                        record.bytes_in.fetch_add(bytes_in, Ordering::AcqRel);
                        record.bytes_out.fetch_add(bytes_out, Ordering::AcqRel);
                        record.events.fetch_add(events, Ordering::AcqRel);
                    }
                }
                crate::core::metrics::TRAFFIC_FLUSHES_TOTAL.with_label_values(&["error"]).inc();
                error!("traffic flush failed, counters restored for retry: {e}");
                Err(e)
            }
        }
    }

    /// Runs the flush loop: a tick every `flush_interval`, plus one final
    /// flush when `shutdown` resolves (§5 Cancellation).
    pub async fn run_flush_loop(self: Arc<Self>, flush_interval: std::time::Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.flush_to_database().await {
                        error!("traffic flush tick failed: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    info!("traffic counter running final flush before shutdown");
                    if let Err(e) = self.flush_to_database().await {
                        error!("final traffic flush failed: {e}");
                    }
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::repository::memory::MemoryRepositories;

    #[tokio::test]
    async fn add_then_flush_round_trips_and_resets() {
        let repo = Arc::new(MemoryRepositories::new());
        let counter = TrafficCounter::new(repo.clone());
        let rule = RuleId(1);
        let agent = AgentId::from("a1");

        counter.add_bytes_in(rule, &agent, 100);
        counter.add_bytes_in(rule, &agent, 200);
        assert_eq!(
            counter.record(rule, &agent).bytes_in.load(Ordering::Relaxed),
            300
        );

        counter.flush_to_database().await.unwrap();
        assert_eq!(
            counter.record(rule, &agent).bytes_in.load(Ordering::Relaxed),
            0
        );
        assert_eq!(repo.traffic_rows.lock().len(), 1);
        assert_eq!(repo.traffic_rows.lock()[0].bytes_in, 300);

        counter.add_bytes_in(rule, &agent, 50);
        assert_eq!(
            counter.record(rule, &agent).bytes_in.load(Ordering::Relaxed),
            50
        );
    }

    #[tokio::test]
    async fn flush_is_a_noop_with_no_traffic() {
        let repo = Arc::new(MemoryRepositories::new());
        let counter = TrafficCounter::new(repo.clone());
        counter.flush_to_database().await.unwrap();
        assert!(repo.traffic_rows.lock().is_empty());
    }

    #[tokio::test]
    async fn second_flush_with_no_intervening_adds_persists_nothing_new() {
        let repo = Arc::new(MemoryRepositories::new());
        let counter = TrafficCounter::new(repo.clone());
        let rule = RuleId(1);
        let agent = AgentId::from("a1");

        counter.add_bytes_in(rule, &agent, 300);
        counter.flush_to_database().await.unwrap();
        assert_eq!(repo.traffic_rows.lock().len(), 1);

        counter.flush_to_database().await.unwrap();
        assert_eq!(repo.traffic_rows.lock().len(), 1);
    }

    #[tokio::test]
    async fn flushed_row_counts_events_not_a_hardcoded_one() {
        let repo = Arc::new(MemoryRepositories::new());
        let counter = TrafficCounter::new(repo.clone());
        let rule = RuleId(1);
        let agent = AgentId::from("a1");

        counter.add_bytes_in(rule, &agent, 100);
        counter.record_event(rule, &agent);
        counter.add_bytes_in(rule, &agent, 200);
        counter.record_event(rule, &agent);

        counter.flush_to_database().await.unwrap();
        let rows = repo.traffic_rows.lock();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].connections, 2);
        assert_eq!(rows[0].bytes_in, 300);
    }

    #[tokio::test]
    async fn active_conns_is_an_overwrite_not_an_increment() {
        let repo = Arc::new(MemoryRepositories::new());
        let counter = TrafficCounter::new(repo);
        let rule = RuleId(1);
        let agent = AgentId::from("a1");
        counter.set_active_conns(rule, &agent, 5);
        counter.set_active_conns(rule, &agent, 3);
        assert_eq!(counter.get_realtime_active_conns(), 3);
    }
}
