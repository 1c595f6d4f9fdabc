//! Error types for the dependency engine.
//!
//! Every error here is scoped to a single conditional property or live
//! reference. Callers catch them at that boundary, log them, and keep the
//! rest of the widget tree running.

use horizon_weave_core::ObjectError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while binding or evaluating dependencies.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A reference does not resolve to a live value provider.
    #[error("Broken reference '{reference}': {message}")]
    BrokenReference { reference: String, message: String },

    /// Binding a live reference would close a propagation cycle.
    #[error("Cyclic reference: {}", .path.join(" -> "))]
    CyclicReference { path: Vec<String> },

    /// An operand is neither a literal, a reference, nor a static formula.
    #[error("Unsupported operand '{operand}': {message}")]
    UnsupportedOperand { operand: String, message: String },

    /// Unknown comparator or logical operator.
    #[error("Unsupported operator '{operator}'")]
    UnsupportedOperator { operator: String },

    /// An ordering comparator was applied to non-numeric operands.
    #[error("Comparator '{comparator}' needs numeric operands, got '{left}' and '{right}'")]
    ComparatorTypeMismatch {
        comparator: String,
        left: String,
        right: String,
    },

    /// A static formula failed to parse or evaluate.
    #[error("Invalid formula '{formula}': {message}")]
    InvalidFormula { formula: String, message: String },

    /// A conditional property names a property with no built-in action.
    #[error("Unknown conditional property '{property}' on widget '{widget}'")]
    UnknownProperty { widget: String, property: String },

    /// A declaration payload could not be decoded.
    #[error("Invalid declaration: {0}")]
    InvalidDeclaration(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Widget tree error.
    #[error("Widget tree error: {0}")]
    Object(#[from] ObjectError),
}

impl Error {
    /// Create a broken reference error.
    pub fn broken_reference(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BrokenReference {
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported operand error.
    pub fn unsupported_operand(operand: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedOperand {
            operand: operand.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported operator error.
    pub fn unsupported_operator(operator: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            operator: operator.into(),
        }
    }

    /// Create a formula error.
    pub fn invalid_formula(formula: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFormula {
            formula: formula.into(),
            message: message.into(),
        }
    }

    /// Whether this error is raised while binding (as opposed to evaluating).
    pub fn is_bind_time(&self) -> bool {
        !matches!(
            self,
            Self::UnsupportedOperator { .. } | Self::ComparatorTypeMismatch { .. }
        )
    }
}
