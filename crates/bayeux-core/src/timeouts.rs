//! Named, single-shot deferred callbacks.
//!
//! A [`DeferredScheduler`] keeps at most one pending timer per name.
//! Scheduling under a name that is already pending is a no-op.
//!
//! Timers run as tokio tasks. When a timer elapses its callback receives an
//! [`Expiry`] token; the owner must hand that token back to
//! [`DeferredScheduler::expire`] (under whatever lock guards the owner) and
//! only act if it returns `true`. This removes the entry before the owner
//! reacts, so the reaction may schedule under the same name again, and it
//! guarantees that a cancelled or superseded timer never takes effect even
//! if its task already woke up.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Generations are unique across all schedulers so a stale expiry can never
/// match a timer in a scheduler created later under the same name.
static GENERATION: AtomicU64 = AtomicU64::new(1);

/// Token delivered to a timer callback when the delay elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry<K> {
    /// The name the timer was scheduled under.
    pub name: K,
    generation: u64,
}

#[derive(Debug)]
struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// A set of named one-shot timers.
#[derive(Debug)]
pub struct DeferredScheduler<K: Eq + Hash> {
    timers: HashMap<K, Timer>,
}

impl<K> DeferredScheduler<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timers: HashMap::new(),
        }
    }

    /// Schedule `on_expire` to run after `delay` under `name`.
    ///
    /// Returns `false` without touching the existing timer if one is
    /// already pending under that name.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, name: K, delay: Duration, on_expire: F) -> bool
    where
        F: FnOnce(Expiry<K>) + Send + 'static,
    {
        if self.timers.contains_key(&name) {
            return false;
        }

        let generation = GENERATION.fetch_add(1, Ordering::Relaxed);
        let expiry = Expiry {
            name: name.clone(),
            generation,
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_expire(expiry);
        });

        trace!(generation, delay_ms = delay.as_millis() as u64, "Timer scheduled");
        self.timers.insert(name, Timer { generation, handle });
        true
    }

    /// Claim an elapsed timer.
    ///
    /// Returns `true` and removes the entry if `expiry` belongs to the timer
    /// currently pending under its name; `false` if that timer was cancelled
    /// or replaced in the meantime.
    pub fn expire(&mut self, expiry: &Expiry<K>) -> bool {
        match self.timers.get(&expiry.name) {
            Some(timer) if timer.generation == expiry.generation => {
                self.timers.remove(&expiry.name);
                trace!(generation = expiry.generation, "Timer fired");
                true
            }
            _ => false,
        }
    }

    /// Cancel the timer under `name`. Returns `true` if one was pending.
    pub fn cancel(&mut self, name: &K) -> bool {
        match self.timers.remove(name) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }

    /// Whether a timer is pending under `name`.
    #[must_use]
    pub fn is_pending(&self, name: &K) -> bool {
        self.timers.contains_key(name)
    }

    /// Number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether no timers are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<K> Default for DeferredScheduler<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> Drop for DeferredScheduler<K> {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    type Shared = Arc<Mutex<DeferredScheduler<&'static str>>>;

    /// Schedule a timer whose expiry is claimed through the shared scheduler
    /// and reported on `fired` only when the claim succeeds.
    fn schedule(
        scheduler: &Shared,
        name: &'static str,
        delay_ms: u64,
        fired: &mpsc::UnboundedSender<&'static str>,
    ) -> bool {
        let weak = Arc::downgrade(scheduler);
        let fired = fired.clone();
        scheduler
            .lock()
            .schedule(name, Duration::from_millis(delay_ms), move |expiry| {
                if let Some(scheduler) = weak.upgrade() {
                    if scheduler.lock().expire(&expiry) {
                        let _ = fired.send(expiry.name);
                    }
                }
            })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let scheduler: Shared = Arc::new(Mutex::new(DeferredScheduler::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(schedule(&scheduler, "a", 100, &tx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(rx.try_recv(), Ok("a"));
        assert!(scheduler.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_same_name_is_noop() {
        let scheduler: Shared = Arc::new(Mutex::new(DeferredScheduler::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(schedule(&scheduler, "a", 100, &tx));
        assert!(!schedule(&scheduler, "a", 10, &tx));

        // The first 100ms timer is neither replaced nor shortened.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(rx.try_recv(), Ok("a"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let scheduler: Shared = Arc::new(Mutex::new(DeferredScheduler::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        schedule(&scheduler, "a", 100, &tx);
        schedule(&scheduler, "b", 100, &tx);
        assert!(scheduler.lock().cancel(&"a"));
        assert!(!scheduler.lock().cancel(&"a"));
        assert!(!scheduler.lock().cancel(&"missing"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(rx.try_recv(), Ok("b"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let scheduler: Shared = Arc::new(Mutex::new(DeferredScheduler::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        schedule(&scheduler, "a", 10, &tx);
        schedule(&scheduler, "b", 20, &tx);
        scheduler.lock().cancel_all();
        assert!(scheduler.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_expiry_is_rejected() {
        let mut scheduler = DeferredScheduler::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        scheduler.schedule("a", Duration::from_millis(10), move |expiry| {
            let _ = tx.send(expiry);
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let stale = rx.try_recv().unwrap();

        // The name was cancelled and rescheduled before the claim.
        scheduler.cancel(&"a");
        scheduler.schedule("a", Duration::from_secs(60), |_| {});
        assert!(!scheduler.expire(&stale));
        assert!(scheduler.is_pending(&"a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_may_reschedule_same_name() {
        let scheduler: Shared = Arc::new(Mutex::new(DeferredScheduler::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let weak = Arc::downgrade(&scheduler);
        let again = tx.clone();
        scheduler
            .lock()
            .schedule("a", Duration::from_millis(10), move |expiry| {
                let Some(scheduler) = weak.upgrade() else {
                    return;
                };
                let mut guard = scheduler.lock();
                if guard.expire(&expiry) {
                    let _ = again.send("first");
                    let again = again.clone();
                    assert!(guard.schedule("a", Duration::from_millis(10), move |_| {
                        let _ = again.send("second");
                    }));
                }
            });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(rx.try_recv(), Ok("first"));
        assert_eq!(rx.try_recv(), Ok("second"));
        drop(tx);
    }
}
