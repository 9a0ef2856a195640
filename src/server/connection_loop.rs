// src/server/connection_loop.rs

//! Accepts control-channel upgrades (§6.1): a TCP accept loop where each new
//! connection first sends a one-line JSON handshake identifying itself,
//! then is upgraded into an [`AgentSession`] attached to the Agent Registry.
//! The RPC transport agents otherwise use to call `clientRegister` etc. is
//! a separate, out-of-scope concern (§1) — this loop only owns the
//! persistent channel itself.

use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader, ReadBuf};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ManagerConfig;
use crate::core::model::AgentId;
use crate::core::rpc::ManagerState;
use crate::core::session::{AgentSession, SessionDeps};

#[derive(Debug, Deserialize)]
struct Handshake {
    agent_id: String,
    secret_key: String,
}

/// Checks the presented secret against the registered one in constant
/// time: both are tagged with an HMAC keyed on the registered secret, and
/// the tags — not the secrets themselves — are compared via
/// `verify_slice` (§6.1 handshake validation).
fn secrets_match(registered: &str, presented: &str) -> bool {
    let Ok(mut expected_mac) = Hmac::<Sha256>::new_from_slice(registered.as_bytes()) else {
        return false;
    };
    expected_mac.update(registered.as_bytes());
    let expected_tag = expected_mac.finalize().into_bytes();

    let Ok(mut presented_mac) = Hmac::<Sha256>::new_from_slice(registered.as_bytes()) else {
        return false;
    };
    presented_mac.update(presented.as_bytes());
    presented_mac.verify_slice(&expected_tag).is_ok()
}

/// Replays bytes the handshake's `BufReader` already read past the
/// consumed line before delegating to the underlying stream, so a frame
/// that arrived in the same TCP segment as the handshake isn't lost when
/// the `BufReader` is discarded (§5: submission order is preserved).
struct PrefixedStream<S> {
    prefix: Cursor<Vec<u8>>,
    inner: S,
}

impl<S> PrefixedStream<S> {
    fn new(prefix: Vec<u8>, inner: S) -> Self {
        Self {
            prefix: Cursor::new(prefix),
            inner,
        }
    }

    fn prefix_exhausted(&self) -> bool {
        self.prefix.position() >= self.prefix.get_ref().len() as u64
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PrefixedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if !self.prefix_exhausted() {
            let n = std::io::Read::read(&mut self.prefix, buf.initialize_unfilled())?;
            buf.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PrefixedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

pub async fn run(state: Arc<ManagerState>, config: &ManagerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr()).await?;
    let ping_interval = state.heartbeat_interval;
    let pong_timeout = config.pong_timeout;

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = accept_one(stream, state, ping_interval, pong_timeout).await {
                warn!("control channel handshake from {peer_addr} failed: {e}");
            }
        });
    }
}

async fn accept_one(
    stream: tokio::net::TcpStream,
    state: Arc<ManagerState>,
    ping_interval: std::time::Duration,
    pong_timeout: std::time::Duration,
) -> anyhow::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let handshake: Handshake = serde_json::from_str(line.trim())?;

    let agent_id = AgentId::from(handshake.agent_id);
    let agent = state
        .clients
        .get_by_id(&agent_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("unknown agent {agent_id}"))?;
    if !secrets_match(&agent.secret_key, &handshake.secret_key) {
        anyhow::bail!("secret_key mismatch for agent {agent_id}");
    }

    // `read_line` buffers ahead of the line it returns; any bytes already
    // read past the handshake (the agent's first control-channel frame, if
    // it arrived in the same TCP segment) must not be dropped when the
    // `BufReader` is discarded.
    let leftover = reader.buffer().to_vec();
    let stream = PrefixedStream::new(leftover, reader.into_inner());
    let deps = SessionDeps {
        registry: state.registry.clone(),
        clients: state.clients.clone(),
        rules: state.rules.clone(),
        ping_interval,
        pong_timeout,
    };
    AgentSession::attach(stream, agent_id.clone(), deps).await;
    info!("agent {agent_id} attached a control channel");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn secrets_match_accepts_the_registered_secret_and_rejects_others() {
        assert!(secrets_match("correct-horse", "correct-horse"));
        assert!(!secrets_match("correct-horse", "wrong-guess"));
        assert!(!secrets_match("correct-horse", ""));
    }

    #[tokio::test]
    async fn prefixed_stream_yields_buffered_bytes_before_the_inner_stream() {
        let (client, server) = tokio::io::duplex(64);
        let mut prefixed = PrefixedStream::new(b"leftover-".to_vec(), server);

        let mut writer = client;
        tokio::spawn(async move {
            tokio::io::AsyncWriteExt::write_all(&mut writer, b"tail").await.unwrap();
        });

        let mut out = Vec::new();
        prefixed.read_buf(&mut out).await.unwrap();
        while out.len() < b"leftover-tail".len() {
            prefixed.read_buf(&mut out).await.unwrap();
        }
        assert_eq!(out, b"leftover-tail");
    }
}
