//! Signal/slot system for Horizon Weave.
//!
//! Signals are emitted by value providers when their state changes, and the
//! connected slots (callbacks) are invoked in response. Everything runs on the
//! single UI thread: slots are always invoked directly by [`Signal::emit`].
//!
//! # Key Types
//!
//! - [`Signal<Args>`] - The main signal type for emitting notifications
//! - [`ConnectionId`] - Unique identifier returned when connecting a slot
//!
//! # Re-entrancy
//!
//! The slot list may be mutated from inside a slot that is currently being
//! dispatched. Emission works on a snapshot of the connections taken when
//! `emit` starts:
//!
//! - A slot connected during dispatch is first invoked on the *next* emission.
//! - A slot disconnected during dispatch (including by itself) is not invoked
//!   if its turn has not come yet.
//!
//! No slot is ever skipped or invoked twice by a single emission.
//!
//! # Example
//!
//! ```
//! use horizon_weave_core::Signal;
//!
//! let value_changed = Signal::<String>::new();
//!
//! let conn_id = value_changed.connect(|text| {
//!     println!("Value changed to: {}", text);
//! });
//!
//! value_changed.emit("42".to_string());
//! value_changed.disconnect(conn_id);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// Use this ID to disconnect a specific connection via [`Signal::disconnect`].
    /// The ID remains valid until the connection is explicitly disconnected or
    /// the signal is dropped.
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// A type-safe signal that can have multiple connected slots.
///
/// # Type Parameter
///
/// - `Args`: The argument type passed to connected slots. Use `()` for signals
///   with no arguments.
pub struct Signal<Args> {
    /// All active connections.
    connections: Mutex<SlotMap<ConnectionId, Slot<Args>>>,
}

impl<Args: 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Connect a slot (closure) to this signal.
    ///
    /// Returns a `ConnectionId` that can be used to disconnect the slot later.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connections.lock().insert(Arc::new(slot))
    }

    /// Disconnect a specific slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed, `false` otherwise.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Check whether a connection is still live.
    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.lock().contains_key(id)
    }

    /// Emit the signal, invoking all connected slots.
    ///
    /// The connection lock is released before any slot runs, so slots are
    /// free to connect, disconnect or emit again.
    #[tracing::instrument(skip_all, target = "horizon_weave_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        let snapshot: Vec<(ConnectionId, Slot<Args>)> = self
            .connections
            .lock()
            .iter()
            .map(|(id, slot)| (id, slot.clone()))
            .collect();
        tracing::trace!(target: targets::SIGNAL, connection_count = snapshot.len(), "emitting signal");

        for (id, slot) in snapshot {
            // Removed by an earlier slot in this same dispatch.
            if !self.is_connected(id) {
                continue;
            }
            slot(&args);
        }
    }
}

static_assertions::assert_impl_all!(Signal<String>: Send, Sync);
