//! Error types for Horizon Weave core.
//!
//! Object tree errors live next to the tree in [`crate::object::ObjectError`].

use std::fmt;

/// Timer-specific errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// The timer ID is invalid, already fired, or was stopped.
    InvalidTimerId,
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimerId => write!(f, "Invalid or expired timer ID"),
        }
    }
}

impl std::error::Error for TimerError {}
