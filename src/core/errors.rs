// src/core/errors.rs

//! Defines the primary error type for the Manager core.

use std::sync::Arc;
use thiserror::Error;

/// The domain error taxonomy described in the error handling design: invalid
/// input, not-found, conflict, session closed/timeout, and storage errors.
/// Using `thiserror` gives clean `Display` impls and `From` conversions while
/// keeping the type cheaply cloneable for fan-out across concurrent callers.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("session closed")]
    SessionClosed,

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("storage error: {0}")]
    Storage(Arc<anyhow::Error>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PartialEq for CoreError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::SessionClosed, Self::SessionClosed) => true,
            (Self::Timeout(a), Self::Timeout(b)) => a == b,
            (Self::Storage(a), Self::Storage(b)) => a.to_string() == b.to_string(),
            (Self::Internal(a), Self::Internal(b)) => a == b,
            _ => false,
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(e: anyhow::Error) -> Self {
        CoreError::Storage(Arc::new(e))
    }
}

impl CoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        CoreError::Storage(Arc::new(anyhow::anyhow!(msg.into())))
    }
}
