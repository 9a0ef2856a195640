// src/core/session/mod.rs

//! The agent session layer (§4.2): one object per connected agent, owning a
//! single persistent full-duplex text-framed channel, with correlated
//! request/response `Call`s, fire-and-forget `Push`es, an application-level
//! keepalive, and orderly teardown via `Stop`.

pub mod frame;
mod pending;
mod session;

pub use frame::{Frame, FrameCodec, FrameKind};
pub use session::{AgentSession, SessionDeps, SessionHandle, SessionState};
