//! Core systems for Horizon Weave.
//!
//! This crate provides the runtime substrate the dependency engine is built on:
//!
//! - **Signal/Slot System**: re-entrancy safe change notification
//! - **Property System**: value cells that emit a signal on effective change
//! - **Object Tree**: named widgets, parent-child ownership, widget state
//! - **Event Loop**: single-threaded one-shot timers
//! - **Deferred Calls**: last-scheduled-wins coalescing of downstream work
//!
//! # Signal/Slot Example
//!
//! ```
//! use horizon_weave_core::Signal;
//!
//! let value_changed = Signal::<i32>::new();
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//! value_changed.emit(42);
//! value_changed.disconnect(conn_id);
//! ```
//!
//! # Coalescing Example
//!
//! ```
//! use std::time::Duration;
//! use horizon_weave_core::{DeferredCall, EventLoop};
//!
//! let event_loop = EventLoop::new();
//! let refresh = DeferredCall::new(event_loop.clone(), Duration::ZERO);
//!
//! refresh.schedule(|| println!("stale"));
//! refresh.schedule(|| println!("refresh once"));
//!
//! // Only the second callback runs.
//! assert_eq!(event_loop.run_until_idle(), 1);
//! ```

mod deferred;
mod error;
mod event_loop;
pub mod logging;
pub mod object;
pub mod property;
pub mod signal;
mod timer;

pub use deferred::DeferredCall;
pub use error::TimerError;
pub use event_loop::EventLoop;
pub use logging::WidgetTreeDebug;
pub use object::{DestroyedObject, ObjectError, ObjectId, ObjectResult, ObjectTree, WidgetState};
pub use property::Property;
pub use signal::{ConnectionId, Signal};
pub use timer::TimerId;
