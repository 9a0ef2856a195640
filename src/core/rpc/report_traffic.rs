// src/core/rpc/report_traffic.rs

use serde::{Deserialize, Serialize};

use super::ManagerState;
use crate::core::errors::CoreError;
use crate::core::model::{AgentId, RuleId};

#[derive(Debug, Clone, Deserialize)]
pub struct TrafficReport {
    pub rule_id: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub active_conns: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReportTrafficParams {
    pub agent_id: String,
    pub reports: Vec<TrafficReport>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ReportTrafficResult {
    pub ack: bool,
}

/// `clientReportTraffic` (§4.8): delta-adds bytes and overwrites the active
/// connection gauge for each reported rule. An all-zero report with an
/// unchanged `active_conns` is a no-op observable only through the traffic
/// counter's internal sample bookkeeping (§8 Round-trips).
pub async fn client_report_traffic(state: &ManagerState, params: ReportTrafficParams) -> Result<ReportTrafficResult, CoreError> {
    let agent_id = AgentId::from(params.agent_id);
    for report in params.reports {
        let rule_id = RuleId(report.rule_id);
        if report.bytes_in > 0 {
            state.traffic.add_bytes_in(rule_id, &agent_id, report.bytes_in);
        }
        if report.bytes_out > 0 {
            state.traffic.add_bytes_out(rule_id, &agent_id, report.bytes_out);
        }
        state.traffic.set_active_conns(rule_id, &agent_id, report.active_conns);
        state.traffic.record_event(rule_id, &agent_id);
    }
    Ok(ReportTrafficResult { ack: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::repository::memory::MemoryRepositories;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn reports_accumulate_bytes_and_overwrite_conns() {
        let repo = Arc::new(MemoryRepositories::new());
        let registry = Arc::new(crate::core::registry::AgentRegistry::new());
        let state = ManagerState {
            clients: repo.clone(),
            rules: repo.clone(),
            groups: repo.clone(),
            nodes: repo.clone(),
            registry: registry.clone(),
            traffic: Arc::new(crate::core::traffic::TrafficCounter::new(repo.clone())),
            balancer: Arc::new(crate::core::balancer::LoadBalancer::new(repo.clone(), repo.clone())),
            propagator: Arc::new(crate::core::propagator::RulePropagator::new(
                registry,
                Duration::from_secs(5),
                Duration::from_millis(500),
            )),
            heartbeat_interval: Duration::from_secs(30),
            channel_path: "/ws/agent".into(),
        };

        client_report_traffic(
            &state,
            ReportTrafficParams {
                agent_id: "a1".into(),
                reports: vec![TrafficReport {
                    rule_id: 1,
                    bytes_in: 100,
                    bytes_out: 0,
                    active_conns: 3,
                }],
            },
        )
        .await
        .unwrap();

        client_report_traffic(
            &state,
            ReportTrafficParams {
                agent_id: "a1".into(),
                reports: vec![TrafficReport {
                    rule_id: 1,
                    bytes_in: 200,
                    bytes_out: 0,
                    active_conns: 3,
                }],
            },
        )
        .await
        .unwrap();

        assert_eq!(state.traffic.get_realtime_active_conns(), 3);
        state.traffic.flush_to_database().await.unwrap();
        let rows = repo.traffic_rows.lock();
        assert_eq!(rows[0].bytes_in, 300);
        assert_eq!(rows[0].connections, 2);
    }
}
