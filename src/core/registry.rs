// src/core/registry.rs

//! The Agent Registry (§4.3): a concurrency-safe index from `agent_id` to
//! the single active `SessionHandle`, backed by a `DashMap`-keyed table.

use dashmap::DashMap;
use serde_json::Value;
use tracing::info;

use crate::core::model::AgentId;
use crate::core::session::SessionHandle;

#[derive(Default)]
pub struct AgentRegistry {
    sessions: DashMap<AgentId, SessionHandle>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces any prior session for `agent_id` and closes the
    /// prior one — at most one session per agent (§8).
    pub async fn attach(&self, agent_id: AgentId, session: SessionHandle) {
        let prior = self.sessions.insert(agent_id.clone(), session);
        crate::core::metrics::AGENTS_ONLINE.set(self.sessions.len() as f64);
        if let Some(prior) = prior {
            info!("replacing existing session for agent {agent_id}");
            prior.stop().await;
        }
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<SessionHandle> {
        self.sessions.get(agent_id).map(|e| e.value().clone())
    }

    pub fn is_online(&self, agent_id: &AgentId) -> bool {
        self.sessions.contains_key(agent_id)
    }

    /// Removes the entry only if `session` is still the one registered,
    /// protecting against a racing `Attach` that already replaced it.
    pub fn detach(&self, agent_id: &AgentId, session: &SessionHandle) {
        self.sessions.remove_if(agent_id, |_, existing| existing == session);
        crate::core::metrics::AGENTS_ONLINE.set(self.sessions.len() as f64);
    }

    pub fn online_count(&self) -> usize {
        self.sessions.len()
    }

    /// Fire-and-forget notification to every currently attached session.
    /// Returns the number of sessions the push was handed to (not
    /// necessarily delivered — the channel may be mid-teardown).
    pub fn broadcast_push(&self, method: &str, params: Value) -> usize {
        let mut delivered = 0;
        for entry in self.sessions.iter() {
            if entry.value().push(method, params.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::repository::memory::MemoryRepositories;
    use crate::core::session::{AgentSession, SessionDeps};
    use std::sync::Arc;
    use std::time::Duration;

    async fn spawn_session(registry: Arc<AgentRegistry>, agent_id: &str) -> SessionHandle {
        let repos = Arc::new(MemoryRepositories::new());
        repos.insert_agent(crate::core::model::Agent {
            agent_id: AgentId::from(agent_id),
            token: "tok".into(),
            secret_key: String::new(),
            status: crate::core::model::AgentStatus::Offline,
            last_ip: None,
            last_seen: None,
            hostname: None,
            version: None,
        });
        let (_client, server) = tokio::io::duplex(4096);
        let deps = SessionDeps {
            registry: registry.clone(),
            clients: repos.clone(),
            rules: repos,
            ping_interval: Duration::from_secs(3600),
            pong_timeout: Duration::from_secs(3600),
        };
        AgentSession::attach(server, AgentId::from(agent_id), deps).await
    }

    #[tokio::test]
    async fn attach_replaces_and_closes_prior_session() {
        let registry = Arc::new(AgentRegistry::new());
        let first = spawn_session(registry.clone(), "a1").await;
        assert!(registry.is_online(&AgentId::from("a1")));

        let second = spawn_session(registry.clone(), "a1").await;
        assert!(first.state() != crate::core::session::SessionState::Active);
        let current = registry.get(&AgentId::from("a1")).unwrap();
        assert_eq!(current, second);
    }

    #[tokio::test]
    async fn detach_is_noop_if_not_current() {
        let registry = Arc::new(AgentRegistry::new());
        let first = spawn_session(registry.clone(), "a2").await;
        let second = spawn_session(registry.clone(), "a2").await;
        // Stale detach of the replaced session must not remove the new one.
        registry.detach(&AgentId::from("a2"), &first);
        assert_eq!(registry.get(&AgentId::from("a2")).unwrap(), second);
    }
}
