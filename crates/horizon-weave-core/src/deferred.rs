//! Coalescing deferred calls.
//!
//! A [`DeferredCall`] runs a callback on a later event loop tick. Scheduling
//! again before the pending callback fired *replaces* it: only the most
//! recently scheduled callback runs. This collapses a burst of synchronous
//! changes (for example two linked filters updated by one user gesture) into
//! a single downstream recompute.
//!
//! Dropping the `DeferredCall` cancels whatever is still pending, so work
//! owned by a destroyed widget never runs.

use std::time::Duration;

use parking_lot::Mutex;

use crate::event_loop::EventLoop;
use crate::logging::targets;
use crate::timer::TimerId;

/// A last-scheduled-wins deferred callback slot.
pub struct DeferredCall {
    event_loop: EventLoop,
    delay: Duration,
    pending: Mutex<Option<TimerId>>,
}

impl DeferredCall {
    /// Create a slot that defers by `delay` (zero means "next tick").
    pub fn new(event_loop: EventLoop, delay: Duration) -> Self {
        Self {
            event_loop,
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedule `callback`, replacing any callback that has not fired yet.
    ///
    /// Returns `true` if a pending callback was replaced.
    pub fn schedule<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock();
        let replaced = match pending.take() {
            Some(previous) => self.event_loop.stop_timer(previous).is_ok(),
            None => false,
        };
        if replaced {
            tracing::trace!(target: targets::EVENT_LOOP, "deferred call replaced");
        }
        *pending = Some(self.event_loop.start_one_shot(self.delay, callback));
        replaced
    }

    /// Cancel the pending callback. Returns `true` if one was pending.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(id) => self.event_loop.stop_timer(id).is_ok(),
            None => false,
        }
    }

    /// Whether a callback is waiting to run.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .is_some_and(|id| self.event_loop.is_timer_active(id))
    }
}

impl Drop for DeferredCall {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for DeferredCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredCall")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .finish()
    }
}
