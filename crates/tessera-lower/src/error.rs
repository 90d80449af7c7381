//! Conversion-pass error types.
//!
//! Errors are fatal: the pass does no retry and reports no warnings. A
//! failed conversion discards the partially built graph. Precondition
//! violations on operations the oracle already approved (wrong stride on a
//! strided convolution, non-square transpose-convolution stride, ...) are
//! programmer errors and panic via `assert!` rather than returning here.

use thiserror::Error;

use tessera_core::error::CoreError;

/// Errors surfaced by the network-to-graph conversion pass.
#[derive(Debug, Error)]
pub enum LowerError {
    /// The support oracle rejected the operation, or a structural case has
    /// no hardware realisation (unknown pooling configuration, shared
    /// concatenation inputs).
    #[error("operation not supported: {reason}")]
    NotSupported { reason: String },

    /// The operation is recognised but has no lowering (softmax outside
    /// estimation).
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// A lowered-graph invariant does not hold.
    #[error("invalid lowered graph: {reason}")]
    InvalidGraph { reason: String },

    /// The source network itself is malformed.
    #[error(transparent)]
    Core(#[from] CoreError),
}
