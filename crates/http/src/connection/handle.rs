use crate::watchdog::Disposable;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one accepted connection and the switch that tears it down.
///
/// Clones share the same token: disposing any of them aborts every stream watched with it.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    token: CancellationToken,
}

impl ConnectionHandle {
    /// A handle with a process-wide unique id.
    pub fn new() -> Self {
        Self::with_id(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn with_id(id: u64) -> Self {
        Self { id, token: CancellationToken::new() }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable for ConnectionHandle {
    fn dispose(&self) {
        if !self.token.is_cancelled() {
            debug!(connection = self.id, "dispose idle connection");
            self.token.cancel();
        }
    }
}
