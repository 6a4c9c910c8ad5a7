//! Registry of connections kept open between requests.
//!
//! A connection is registered once its response is complete and deregistered as soon as the next
//! request header arrives. While registered it is watched by the registry's own watchdog, which
//! disposes it after the keep-alive timeout.

use crate::config::HttpSettings;
use crate::connection::ConnectionHandle;
use crate::ensure;
use crate::watchdog::{Watchdog, WatchdogSession};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::error::Elapsed;
use tracing::trace;

const LOCK_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum KeepAliveError {
    #[error("connection {id} is already registered")]
    AlreadyRegistered { id: u64 },

    #[error("keep-alive registry is full, capacity {capacity}")]
    Full { capacity: usize },

    #[error("timed out waiting for the keep-alive registry: {source}")]
    LockTimeout {
        #[from]
        source: Elapsed,
    },
}

#[derive(Debug)]
pub struct KeepAliveRegistry {
    capacity: usize,
    sessions: Mutex<HashMap<u64, WatchdogSession>>,
    count: AtomicUsize,
    watchdog: Watchdog,
}

impl KeepAliveRegistry {
    pub fn new(settings: &HttpSettings) -> Self {
        Self::with_watchdog(
            settings.max_keep_alive_connections,
            Watchdog::new("keep-alive", settings.keep_alive_timeout),
        )
    }

    pub fn with_watchdog(capacity: usize, watchdog: Watchdog) -> Self {
        Self { capacity, sessions: Mutex::new(HashMap::new()), count: AtomicUsize::new(0), watchdog }
    }

    /// The watchdog disposing idle registered connections, its timer is started by the caller.
    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a registration could currently succeed, without taking the lock.
    pub fn can_register(&self) -> bool {
        self.len() < self.capacity
    }

    pub async fn is_registered(&self, id: u64) -> bool {
        self.sessions.lock().await.contains_key(&id)
    }

    pub async fn register(&self, handle: &ConnectionHandle) -> Result<(), KeepAliveError> {
        ensure!(self.can_register(), KeepAliveError::Full { capacity: self.capacity });

        let mut sessions = tokio::time::timeout(LOCK_TIMEOUT, self.sessions.lock()).await?;
        ensure!(!sessions.contains_key(&handle.id()), KeepAliveError::AlreadyRegistered { id: handle.id() });
        ensure!(self.can_register(), KeepAliveError::Full { capacity: self.capacity });

        let session = self.watchdog.watch(Arc::new(handle.clone()));
        sessions.insert(handle.id(), session);
        self.count.fetch_add(1, Ordering::AcqRel);

        trace!(connection = handle.id(), registered = sessions.len(), "register keep-alive");
        Ok(())
    }

    /// Stops keeping `id` alive, returns whether it was registered.
    pub async fn deregister(&self, id: u64) -> bool {
        let Some(session) = self.sessions.lock().await.remove(&id) else {
            return false;
        };

        session.dispose();
        self.count.fetch_sub(1, Ordering::AcqRel);
        trace!(connection = id, "deregister keep-alive");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchdog::{Clock, ManualClock};

    fn registry(capacity: usize) -> (KeepAliveRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let watchdog = Watchdog::with_clock("keep-alive", Duration::from_secs(15), Arc::clone(&clock) as Arc<dyn Clock>);
        (KeepAliveRegistry::with_watchdog(capacity, watchdog), clock)
    }

    #[tokio::test]
    async fn test_register_and_deregister() {
        let (registry, _) = registry(4);
        let handle = ConnectionHandle::with_id(1);

        registry.register(&handle).await.unwrap();
        assert!(registry.is_registered(1).await);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.watchdog().len(), 1);

        assert!(registry.deregister(1).await);
        assert!(!registry.deregister(1).await);
        assert!(registry.is_empty());
        assert!(registry.watchdog().is_empty());
        assert!(!handle.is_closed());
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let (registry, _) = registry(4);
        let handle = ConnectionHandle::with_id(1);

        registry.register(&handle).await.unwrap();
        let result = registry.register(&handle).await;
        assert!(matches!(result, Err(KeepAliveError::AlreadyRegistered { id: 1 })));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity() {
        let (registry, _) = registry(2);
        registry.register(&ConnectionHandle::with_id(1)).await.unwrap();
        registry.register(&ConnectionHandle::with_id(2)).await.unwrap();
        assert!(!registry.can_register());

        let result = registry.register(&ConnectionHandle::with_id(3)).await;
        assert!(matches!(result, Err(KeepAliveError::Full { capacity: 2 })));

        registry.deregister(1).await;
        assert!(registry.can_register());
        registry.register(&ConnectionHandle::with_id(3)).await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_registration_is_disposed() {
        let (registry, clock) = registry(4);
        let idle = ConnectionHandle::with_id(1);
        let busy = ConnectionHandle::with_id(2);
        registry.register(&idle).await.unwrap();

        clock.advance(Duration::from_secs(10));
        registry.register(&busy).await.unwrap();

        clock.advance(Duration::from_secs(6));
        assert_eq!(registry.watchdog().purge(), 1);
        assert!(idle.is_closed());
        assert!(!busy.is_closed());

        // the connection loop still deregisters the disposed connection on its way out
        assert!(registry.deregister(1).await);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_registrations_respect_capacity() {
        let (registry, _) = registry(8);
        let registry = Arc::new(registry);

        let tasks: Vec<_> = (0..32)
            .map(|id| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.register(&ConnectionHandle::with_id(id)).await.is_ok() })
            })
            .collect();

        let mut registered = 0;
        for task in tasks {
            if task.await.unwrap() {
                registered += 1;
            }
        }
        assert_eq!(registered, 8);
        assert_eq!(registry.len(), 8);
    }
}
