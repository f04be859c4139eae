//! Per-connection bookkeeping for the config listener.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count in-flight connections so `stop` can wait for them

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Relaxed ordering is enough: IDs only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cfg-{}", self.0)
    }
}

/// Counts in-flight connections and wakes waiters when the count hits zero.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<watch::Sender<usize>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { active: Arc::new(tx) }
    }

    /// Record a new connection. The count drops again when the guard does.
    pub fn track(&self) -> ConnectionGuard {
        self.active.send_modify(|count| *count += 1);
        ConnectionGuard {
            active: Arc::clone(&self.active),
            id: ConnectionId::next(),
        }
    }

    pub fn active_count(&self) -> usize {
        *self.active.borrow()
    }

    /// Wait until no connection is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the lifetime of one connection.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<watch::Sender<usize>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count = count.saturating_sub(1));
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
