// src/core/session/pending.rs

//! The pending-calls map: a small mutex never held across I/O, per the
//! locking discipline of §5.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;

use crate::core::errors::CoreError;

pub type CallResult = Result<Value, CoreError>;

#[derive(Default)]
pub struct PendingCalls {
    inner: Mutex<HashMap<String, oneshot::Sender<CallResult>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: String, tx: oneshot::Sender<CallResult>) {
        self.inner.lock().insert(id, tx);
    }

    /// Removes and returns the waiter for `id`, if still pending. Used both
    /// by the receive loop (delivering a matched response) and by the
    /// caller's timeout path (removing a stale entry so a late response is
    /// silently dropped).
    pub fn remove(&self, id: &str) -> Option<oneshot::Sender<CallResult>> {
        self.inner.lock().remove(id)
    }

    /// Completes every pending call with a closed-session error and clears
    /// the map. Invoked once, from `Stop`.
    pub fn fail_all_closed(&self) {
        let waiters: Vec<_> = self.inner.lock().drain().map(|(_, tx)| tx).collect();
        for tx in waiters {
            let _ = tx.send(Err(CoreError::SessionClosed));
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
