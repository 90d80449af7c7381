//! Core error types for network construction.
//!
//! Uses `thiserror` for structured, matchable error variants. Builder
//! validation failures are errors, not panics; panics are reserved for
//! conversion-pass preconditions that indicate a programmer error.

use thiserror::Error;

use crate::id::OperandRef;
use crate::tensor::TensorShape;

/// Errors produced while constructing a source network.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An operand reference does not name an existing operation output.
    #[error("unknown operand: {operand}")]
    UnknownOperand { operand: OperandRef },

    /// Two tensors that must agree in shape do not.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: TensorShape,
        actual: TensorShape,
    },

    /// An axis index is outside the 4-D range.
    #[error("invalid axis: {axis}")]
    InvalidAxis { axis: u32 },

    /// Split sizes do not sum to the input's extent along the split axis.
    #[error("invalid split sizes: axis extent is {expected}, sizes sum to {actual}")]
    InvalidSplitSizes { expected: u32, actual: u32 },

    /// Raw constant data does not match the declared tensor size.
    #[error("data size mismatch: expected {expected} bytes, got {actual}")]
    DataSizeMismatch { expected: usize, actual: usize },

    /// An operation's parameters fail structural validation.
    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },
}
