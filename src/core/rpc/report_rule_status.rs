// src/core/rpc/report_rule_status.rs

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ManagerState;
use crate::core::errors::CoreError;
use crate::core::model::{RuleId, RuleStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct RuleStatusReport {
    pub rule_id: u64,
    pub status: RuleStatus,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportRuleStatusParams {
    pub agent_id: String,
    pub reports: Vec<RuleStatusReport>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ReportRuleStatusResult {
    pub ack: bool,
}

/// `clientReportRuleStatus` (§4.8): per-item update; a single row's failure
/// is logged and swallowed rather than failing the whole batch (§7 Per-item
/// soft failures) — this trades observability for resilience on the hot
/// report path, per the agent's own design notes.
pub async fn client_report_rule_status(
    state: &ManagerState,
    params: ReportRuleStatusParams,
) -> Result<ReportRuleStatusResult, CoreError> {
    for report in params.reports {
        let rule_id = RuleId(report.rule_id);
        if let Err(e) = state.rules.update_status(rule_id, report.status, report.error).await {
            warn!(
                "clientReportRuleStatus: dropping failed update for rule {} from agent {}: {e}",
                report.rule_id, params.agent_id
            );
        }
    }
    Ok(ReportRuleStatusResult { ack: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{AgentId, ForwardRule, RuleType};
    use crate::core::repository::memory::MemoryRepositories;
    use std::sync::Arc;
    use std::time::Duration;

    fn state_with(repo: Arc<MemoryRepositories>) -> ManagerState {
        let registry = Arc::new(crate::core::registry::AgentRegistry::new());
        ManagerState {
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
        }
    }

    #[tokio::test]
    async fn failed_item_is_swallowed_and_ack_still_returned() {
        let repo = Arc::new(MemoryRepositories::new());
        repo.insert_rule(ForwardRule {
            id: RuleId(1),
            name: "r1".into(),
            enabled: true,
            rule_type: RuleType::Direct,
            listen_addr: "0.0.0.0:9000".into(),
            listen_agent: AgentId::from("a1"),
            target_addr: Some("1.2.3.4:80".into()),
            relay_chain: vec![],
            exit_addr: None,
            status: RuleStatus::Pending,
            last_error: None,
        });
        let state = state_with(repo.clone());

        let result = client_report_rule_status(
            &state,
            ReportRuleStatusParams {
                agent_id: "a1".into(),
                reports: vec![
                    RuleStatusReport {
                        rule_id: 1,
                        status: RuleStatus::Running,
                        error: None,
                    },
                    RuleStatusReport {
                        rule_id: 999,
                        status: RuleStatus::Error,
                        error: Some("missing".into()),
                    },
                ],
            },
        )
        .await
        .unwrap();

        assert!(result.ack);
        let rule = repo.get_by_id(RuleId(1)).await.unwrap().unwrap();
        assert_eq!(rule.status, RuleStatus::Running);
    }
}
