//! Idle resource reclamation.
//!
//! A [`Watchdog`] keeps one [`WatchdogSession`] per watched resource. Every tick of its timer it
//! disposes the resources whose session has not been refreshed for longer than the configured
//! maximum session duration. The server runs two of them: one over all TCP connections
//! (idle timeout) and one inside the keep-alive registry (keep-alive timeout).
//!
//! Purges run on the watchdog's own task, one after another, so a purge can never overlap the
//! previous one.

mod clock;
mod timer;

pub use clock::Clock;
pub use clock::SystemClock;
pub use timer::IntervalTimer;
pub use timer::LocalTimer;
pub use timer::Timer;

#[cfg(test)]
pub(crate) use clock::ManualClock;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Something a watchdog can tear down.
pub trait Disposable: Debug + Send + Sync {
    fn dispose(&self);
}

impl Disposable for CancellationToken {
    fn dispose(&self) {
        self.cancel();
    }
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    name: &'static str,
    max_session_duration: Duration,
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<u64, Arc<Entry>>>,
    next_id: AtomicU64,
}

#[derive(Debug)]
struct Entry {
    target: Arc<dyn Disposable>,
    // milliseconds on the watchdog's clock
    last_activity: AtomicU64,
}

impl Entry {
    fn touch(&self, now: Duration) {
        self.last_activity.store(millis(now), Ordering::Release);
    }

    fn idle_for(&self, now: Duration) -> Duration {
        Duration::from_millis(millis(now).saturating_sub(self.last_activity.load(Ordering::Acquire)))
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Watchdog {
    pub fn new(name: &'static str, max_session_duration: Duration) -> Self {
        Self::with_clock(name, max_session_duration, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(name: &'static str, max_session_duration: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                max_session_duration,
                clock,
                sessions: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn max_session_duration(&self) -> Duration {
        self.inner.max_session_duration
    }

    /// Starts watching `target`, its idle time counts from now.
    pub fn watch(&self, target: Arc<dyn Disposable>) -> WatchdogSession {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(Entry { target, last_activity: AtomicU64::new(0) });
        entry.touch(self.inner.clock.now());

        self.inner.sessions().insert(id, Arc::clone(&entry));
        trace!(watchdog = self.inner.name, id, "watch session");

        WatchdogSession {
            id,
            entry,
            clock: Arc::clone(&self.inner.clock),
            watchdog: Arc::downgrade(&self.inner),
            disposed: AtomicBool::new(false),
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disposes and forgets every session idle for longer than the maximum session duration.
    pub fn purge(&self) -> usize {
        self.inner.purge()
    }

    /// Runs purges on a new task, once per tick of `timer`.
    ///
    /// The task ends when the timer is exhausted or every handle to this watchdog is gone.
    pub fn spawn<T>(&self, mut timer: T) -> JoinHandle<()>
    where
        T: Timer + 'static,
    {
        let inner = Arc::downgrade(&self.inner);
        let name = self.inner.name;
        tokio::spawn(async move {
            while Timer::tick(&mut timer).await {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.purge();
            }
            debug!(watchdog = name, "watchdog stopped");
        })
    }

    /// [`Watchdog::spawn`] with an [`IntervalTimer`] of `period`.
    pub fn spawn_interval(&self, period: Duration) -> JoinHandle<()> {
        self.spawn(IntervalTimer::new(period))
    }
}

impl Inner {
    fn sessions(&self) -> MutexGuard<'_, HashMap<u64, Arc<Entry>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn purge(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<Arc<Entry>> = self
            .sessions()
            .extract_if(|_, entry| entry.idle_for(now) > self.max_session_duration)
            .map(|(_, entry)| entry)
            .collect();

        for entry in &expired {
            entry.target.dispose();
        }

        if !expired.is_empty() {
            debug!(watchdog = self.name, purged = expired.len(), "disposed idle sessions");
        }
        expired.len()
    }

    fn remove(&self, id: u64) -> bool {
        self.sessions().remove(&id).is_some()
    }
}

/// The link between a watched resource and its watchdog.
///
/// Dropping the session stops watching without disposing the resource.
#[derive(Debug)]
pub struct WatchdogSession {
    id: u64,
    entry: Arc<Entry>,
    clock: Arc<dyn Clock>,
    watchdog: Weak<Inner>,
    disposed: AtomicBool,
}

impl WatchdogSession {
    /// Resets the idle time of the watched resource.
    pub fn refresh(&self) {
        self.entry.touch(self.clock.now());
    }

    /// Stops watching, only the first call has an effect.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(watchdog) = self.watchdog.upgrade()
            && watchdog.remove(self.id)
        {
            trace!(watchdog = watchdog.name, id = self.id, "unwatch session");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for WatchdogSession {
    fn drop(&mut self) {
        self.dispose();
    }
}
