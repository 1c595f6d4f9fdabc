//! Single-threaded cooperative event loop.
//!
//! The host UI (a browser-like main thread) drives the loop by calling
//! [`EventLoop::process_pending`] once per tick. There is no parallelism:
//! every timer callback runs on the caller's thread, one at a time. A tick
//! runs every timer that is due at the tick's instant, in firing order.
//!
//! Work scheduled while a tick is running is picked up by a later tick,
//! which is what lets several synchronous changes coalesce before a deferred
//! callback observes them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::TimerError;
use crate::logging::targets;
use crate::timer::{TimerId, TimerManager};

struct EventLoopInner {
    timers: Mutex<TimerManager>,
}

/// Cloneable handle to a cooperative event loop.
#[derive(Clone)]
pub struct EventLoop {
    inner: Arc<EventLoopInner>,
}

impl EventLoop {
    /// Create a new, empty event loop.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventLoopInner {
                timers: Mutex::new(TimerManager::new()),
            }),
        }
    }

    /// Start a one-shot timer. A zero delay fires on the next tick.
    pub fn start_one_shot<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner
            .timers
            .lock()
            .start_one_shot(Instant::now(), delay, Box::new(callback))
    }

    /// Stop a timer that has not fired yet.
    pub fn stop_timer(&self, id: TimerId) -> Result<(), TimerError> {
        self.inner.timers.lock().stop(id)
    }

    /// Whether a timer is still waiting to fire.
    pub fn is_timer_active(&self, id: TimerId) -> bool {
        self.inner.timers.lock().is_active(id)
    }

    /// Number of live timers.
    pub fn pending_count(&self) -> usize {
        self.inner.timers.lock().active_count()
    }

    /// Time until the next timer is due, if any.
    pub fn time_until_next_timer(&self) -> Option<Duration> {
        self.inner.timers.lock().time_until_next(Instant::now())
    }

    /// Run one tick at the current instant. Returns the number of callbacks run.
    pub fn process_pending(&self) -> usize {
        self.process_pending_at(Instant::now())
    }

    /// Run one tick as if the clock read `now`.
    #[tracing::instrument(skip(self), target = "horizon_weave_core::event_loop", level = "trace")]
    pub fn process_pending_at(&self, now: Instant) -> usize {
        // The lock is released before running anything.
        let expired = self.inner.timers.lock().take_expired(now);

        let count = expired.len();
        for callback in expired {
            callback();
        }
        if count > 0 {
            tracing::trace!(target: targets::EVENT_LOOP, count, "tick processed");
        }
        count
    }

    /// Run ticks until no timer is due.
    ///
    /// Timers that are not yet due are left pending. Returns the total number
    /// of callbacks run.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.process_pending();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("pending", &self.pending_count())
            .finish()
    }
}
