//! Stable ID newtypes for network entities.
//!
//! [`OperationId`] is a distinct newtype over `u32` so that an operation
//! index cannot be confused with a plain integer. [`OperandRef`] names one
//! output of one operation; it is the key used to bind source operands to
//! lowered nodes, avoiding any lifetime coupling between the source network
//! and the lowered graph.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable operation identifier within a [`Network`](crate::network::Network).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub u32);

/// Identity of one output operand of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperandRef {
    /// The operation producing this operand.
    pub producer: OperationId,
    /// Which output of the producer (most operations have output 0 only).
    pub index: u32,
}

impl OperandRef {
    pub fn new(producer: OperationId, index: u32) -> Self {
        OperandRef { producer, index }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OperandRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.producer, self.index)
    }
}
