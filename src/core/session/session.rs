// src/core/session/session.rs

//! `AgentSession`: the live object behind one agent's control channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout as tokio_timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use super::frame::{Frame, FrameCodec, FrameKind};
use super::pending::PendingCalls;
use crate::core::errors::CoreError;
use crate::core::model::{AgentId, AgentStatus};
use crate::core::registry::AgentRegistry;
use crate::core::repository::{ClientRepository, RuleRepository};

/// The session lifecycle state (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Active,
    Closed,
}

/// Collaborators an `AgentSession` needs in order to run its lifecycle
/// without the caller threading them through every call.
pub struct SessionDeps {
    pub registry: Arc<AgentRegistry>,
    pub clients: Arc<dyn ClientRepository>,
    pub rules: Arc<dyn RuleRepository>,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

struct Inner {
    agent_id: AgentId,
    state: Mutex<SessionState>,
    pending: PendingCalls,
    outbound: mpsc::UnboundedSender<Frame>,
    deps: SessionDeps,
}

/// A cheaply-cloneable handle to a live (or now-closed) agent session.
#[derive(Clone)]
pub struct SessionHandle(Arc<Inner>);

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for SessionHandle {}

impl SessionHandle {
    pub fn agent_id(&self) -> &AgentId {
        &self.0.agent_id
    }

    pub fn state(&self) -> SessionState {
        *self.0.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Request/response over the channel, correlated by a fresh request id.
    /// Resolves to the peer's response, a timeout error, or a closed-session
    /// error — never blocks indefinitely (§8).
    pub async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value, CoreError> {
        if self.state() == SessionState::Closed {
            return Err(CoreError::SessionClosed);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.0.pending.insert(id.clone(), tx);

        if self
            .0
            .outbound
            .send(Frame::request(id.clone(), method, params))
            .is_err()
        {
            self.0.pending.remove(&id);
            self.stop().await;
            return Err(CoreError::SessionClosed);
        }

        match tokio_timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                // Sender dropped without sending — only happens on Stop,
                // which already delivers a SessionClosed error, but guard
                // against a vanished waiter just in case.
                Err(CoreError::SessionClosed)
            }
            Err(_) => {
                self.0.pending.remove(&id);
                Err(CoreError::Timeout(timeout))
            }
        }
    }

    /// Fire-and-forget server-to-agent notification; no response expected.
    pub fn push(&self, method: &str, params: Value) -> Result<(), CoreError> {
        if self.state() == SessionState::Closed {
            return Err(CoreError::SessionClosed);
        }
        self.0
            .outbound
            .send(Frame::push(method, params))
            .map_err(|_| CoreError::SessionClosed)
    }

    /// Tears the session down: fails all pending calls, closes the outbound
    /// channel, detaches from the registry, marks the agent offline, and
    /// resets its rule statuses to pending. Idempotent — a second call is a
    /// no-op, which lets reader/writer/keepalive tasks and an explicit
    /// `Registry::Attach` race to call `stop` without coordination.
    pub async fn stop(&self) {
        {
            let mut state = self.0.state.lock();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }

        self.0.pending.fail_all_closed();
        self.0.deps.registry.detach(&self.0.agent_id, self);

        if let Err(e) = self
            .0
            .deps
            .clients
            .update_liveness(&self.0.agent_id, AgentStatus::Offline, None, Utc::now())
            .await
        {
            warn!("failed to mark agent {} offline: {e}", self.0.agent_id);
        }
        if let Err(e) = self.0.deps.rules.reset_all_statuses_for_agent(&self.0.agent_id).await {
            warn!(
                "failed to reset rule statuses for agent {}: {e}",
                self.0.agent_id
            );
        }
        crate::core::metrics::SESSIONS_CLOSED_TOTAL.inc();
        info!("session for agent {} closed", self.0.agent_id);
    }
}

/// Owns the lifecycle of one agent's control channel: attaches a freshly
/// upgraded stream to the registry and spawns the reader/writer/keepalive
/// tasks that drive it.
pub struct AgentSession;

impl AgentSession {
    /// Upgrades `stream` into an active session for `agent_id`. Any prior
    /// session for the same agent is closed by `AgentRegistry::attach`
    /// before this one is inserted.
    pub async fn attach<S>(stream: S, agent_id: AgentId, deps: SessionDeps) -> SessionHandle
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let framed = Framed::new(stream, FrameCodec);
        let (mut sink, mut stream) = framed.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();

        let inner = Arc::new(Inner {
            agent_id: agent_id.clone(),
            state: Mutex::new(SessionState::New),
            pending: PendingCalls::new(),
            outbound: outbound_tx,
            deps,
        });
        let handle = SessionHandle(inner);

        // Writer task: the single serialized outbound path for this channel.
        let writer_handle = handle.clone();
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
            writer_handle.stop().await;
        });

        // Reader task: matches responses to pending calls; ignores anything
        // else rather than crashing the session.
        let reader_handle = handle.clone();
        tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                match next {
                    Ok(frame) => reader_handle.handle_inbound(frame),
                    Err(e) => {
                        debug!("session read error for {}: {e}", reader_handle.agent_id());
                        break;
                    }
                }
            }
            reader_handle.stop().await;
        });

        // Keepalive task: an application-level ping every `ping_interval`;
        // a ping call that fails to return within `pong_timeout` stops the
        // session (§4.2 Keepalive).
        let keepalive_handle = handle.clone();
        let ping_interval = keepalive_handle.0.deps.ping_interval;
        let pong_timeout = keepalive_handle.0.deps.pong_timeout;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ping_interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if keepalive_handle.state() == SessionState::Closed {
                    break;
                }
                if keepalive_handle
                    .call("ping", Value::Null, pong_timeout)
                    .await
                    .is_err()
                {
                    keepalive_handle.stop().await;
                    break;
                }
            }
        });

        handle.0.deps.registry.attach(agent_id, handle.clone()).await;
        *handle.0.state.lock() = SessionState::Active;
        crate::core::metrics::SESSIONS_ATTACHED_TOTAL.inc();
        handle
    }
}

impl SessionHandle {
    fn handle_inbound(&self, frame: Frame) {
        match frame.kind {
            FrameKind::Response => {
                let Some(id) = frame.id else {
                    warn!("agent {} sent a response frame with no id", self.agent_id());
                    return;
                };
                let Some(tx) = self.0.pending.remove(&id) else {
                    debug!(
                        "agent {} response for unknown/expired request id {id}",
                        self.agent_id()
                    );
                    return;
                };
                let result = match frame.error {
                    Some(err) => Err(CoreError::InvalidInput(err)),
                    None => Ok(frame.result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(result);
            }
            FrameKind::Request | FrameKind::Push => {
                // The Manager never receives an agent-initiated request over
                // this channel, and unsolicited pushes are not expected
                // today — ignore rather than crash the session (§4.2).
                debug!(
                    "agent {} sent unexpected frame kind {:?}; ignoring",
                    self.agent_id(),
                    frame.kind
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::repository::memory::MemoryRepositories;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    fn test_deps(registry: Arc<AgentRegistry>, repos: Arc<MemoryRepositories>) -> SessionDeps {
        SessionDeps {
            registry,
            clients: repos.clone(),
            rules: repos,
            ping_interval: Duration::from_secs(3600),
            pong_timeout: Duration::from_secs(3600),
        }
    }

    async fn attach_pair(agent_id: &str) -> (SessionHandle, Framed<DuplexStream, FrameCodec>, Arc<MemoryRepositories>, Arc<AgentRegistry>) {
        let (client_side, server_side) = tokio::io::duplex(4096);
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
        let registry = Arc::new(AgentRegistry::new());
        let deps = test_deps(registry.clone(), repos.clone());
        let handle = AgentSession::attach(server_side, AgentId::from(agent_id), deps).await;
        let peer = Framed::new(client_side, FrameCodec);
        (handle, peer, repos, registry)
    }

    #[tokio::test]
    async fn call_returns_peer_response() {
        let (handle, mut peer, _repos, _registry) = attach_pair("a1").await;

        tokio::spawn(async move {
            if let Some(Ok(frame)) = peer.next().await {
                let id = frame.id.unwrap();
                peer.send(Frame::response_ok(id, serde_json::json!({"ok": true})))
                    .await
                    .unwrap();
            }
        });

        let result = handle
            .call("ping", Value::Null, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn call_times_out_without_blocking_forever() {
        let (handle, _peer, _repos, _registry) = attach_pair("a2").await;
        let result = handle
            .call("check_port", Value::Null, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(CoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn stop_fails_pending_calls_and_marks_offline() {
        let (handle, _peer, repos, registry) = attach_pair("a3").await;
        let handle_for_call = handle.clone();
        let call_task = tokio::spawn(async move {
            handle_for_call
                .call("ping", Value::Null, Duration::from_secs(5))
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop().await;

        let result = call_task.await.unwrap();
        assert_eq!(result, Err(CoreError::SessionClosed));
        assert!(!registry.is_online(&AgentId::from("a3")));
        let agent = repos.get_by_id(&AgentId::from("a3")).await.unwrap().unwrap();
        assert_eq!(agent.status, crate::core::model::AgentStatus::Offline);
    }
}
