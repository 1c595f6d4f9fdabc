//! One-shot timers for the event loop.
//!
//! Timers carry their callback. Expired callbacks are handed back to the
//! caller instead of being run under the manager's lock, so a callback may
//! start or stop timers itself.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};

use crate::error::TimerError;
use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a timer.
    pub struct TimerId;
}

/// A boxed timer callback.
pub(crate) type BoxedTask = Box<dyn FnOnce() + Send + 'static>;

struct TimerData {
    callback: BoxedTask,
}

/// An entry in the timer queue (min-heap by fire time, FIFO among equals).
#[derive(Debug, Clone, Copy)]
struct TimerQueueEntry {
    id: TimerId,
    fire_time: Instant,
    sequence: u64,
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time && self.sequence == other.sequence
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        other
            .fire_time
            .cmp(&self.fire_time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Manages pending one-shot timers.
pub(crate) struct TimerManager {
    timers: SlotMap<TimerId, TimerData>,
    queue: BinaryHeap<TimerQueueEntry>,
    sequence: u64,
}

impl TimerManager {
    pub fn new() -> Self {
        Self {
            timers: SlotMap::with_key(),
            queue: BinaryHeap::new(),
            sequence: 0,
        }
    }

    /// Start a one-shot timer that fires `delay` after `now`.
    pub fn start_one_shot(&mut self, now: Instant, delay: Duration, callback: BoxedTask) -> TimerId {
        let id = self.timers.insert(TimerData { callback });
        self.sequence += 1;
        self.queue.push(TimerQueueEntry {
            id,
            fire_time: now + delay,
            sequence: self.sequence,
        });
        id
    }

    /// Stop and remove a timer that has not fired yet.
    ///
    /// The queue is compacted once stopped entries outnumber live timers, so
    /// restarting a pending timer over and over keeps the queue bounded.
    pub fn stop(&mut self, id: TimerId) -> Result<(), TimerError> {
        self.timers.remove(id).ok_or(TimerError::InvalidTimerId)?;
        if self.queue.len() > 2 * self.timers.len() {
            let timers = &self.timers;
            self.queue.retain(|entry| timers.contains_key(entry.id));
        }
        Ok(())
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(id)
    }

    /// Duration until the next live timer fires, if any.
    pub fn time_until_next(&mut self, now: Instant) -> Option<Duration> {
        while let Some(entry) = self.queue.peek() {
            if self.timers.contains_key(entry.id) {
                break;
            }
            self.queue.pop();
        }
        self.queue
            .peek()
            .map(|entry| entry.fire_time.saturating_duration_since(now))
    }

    /// Remove every timer due at `now` and return their callbacks in firing order.
    pub fn take_expired(&mut self, now: Instant) -> Vec<BoxedTask> {
        let mut expired = Vec::new();
        while let Some(entry) = self.queue.peek().copied() {
            if entry.fire_time > now {
                break;
            }
            self.queue.pop();
            if let Some(timer) = self.timers.remove(entry.id) {
                tracing::trace!(target: targets::TIMER, id = ?entry.id, "timer fired");
                expired.push(timer.callback);
            }
        }
        expired
    }

    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}
