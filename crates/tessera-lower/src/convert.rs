//! The network-to-graph conversion driver.
//!
//! [`NetworkConverter`] walks the source network in topological order and
//! dispatches each operation to its rewrite rule. Non-trivial kinds consult
//! the support oracle first: `Unsupported` aborts the pass, `EstimateOnly`
//! lowers to a placeholder, `Supported` runs the kind-specific lowering.
//!
//! Rules emit an ordered chain of lowered nodes and hand it to
//! [`NetworkConverter::chain_connect`], which wires the chain internally,
//! connects every input operand's current producer to the chain head, and
//! records the output binding. Multi-output kinds (split, estimate-only)
//! do their own wiring.
//!
//! The pass is single-threaded and synchronous; the graph and the operand
//! bindings are exclusively owned for its duration and published to the
//! caller atomically on success.

use indexmap::IndexMap;

use tessera_core::id::OperandRef;
use tessera_core::network::{Network, Operation};
use tessera_core::ops::OperationKind;
use tessera_support::caps::HwCapabilities;
use tessera_support::support::{SupportLevel, SupportOracle};

use crate::error::LowerError;
use crate::graph::{LoweredGraph, NodeId};
use crate::rules;

/// Pass-wide options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversionOptions {
    /// In estimation mode some rejections are relaxed (shared concatenation
    /// inputs) because the result is never executed.
    pub estimation: bool,
}

/// Result of a successful conversion: the lowered graph plus the binding of
/// every source operand to the lowered node producing its value.
#[derive(Debug)]
pub struct LoweredOutput {
    pub graph: LoweredGraph,
    pub bindings: IndexMap<OperandRef, NodeId>,
}

/// Converts a source [`Network`] into a [`LoweredGraph`].
pub struct NetworkConverter<'a> {
    pub(crate) network: &'a Network,
    pub(crate) support: &'a dyn SupportOracle,
    pub(crate) caps: &'a dyn HwCapabilities,
    pub(crate) options: ConversionOptions,
    pub(crate) graph: LoweredGraph,
    pub(crate) bindings: IndexMap<OperandRef, NodeId>,
}

impl<'a> NetworkConverter<'a> {
    pub fn new(
        network: &'a Network,
        support: &'a dyn SupportOracle,
        caps: &'a dyn HwCapabilities,
        options: ConversionOptions,
    ) -> Self {
        NetworkConverter {
            network,
            support,
            caps,
            options,
            graph: LoweredGraph::new(),
            bindings: IndexMap::new(),
        }
    }

    /// Runs the pass to completion. On error the partially built graph is
    /// discarded with the converter.
    pub fn convert(mut self) -> Result<LoweredOutput, LowerError> {
        let network = self.network;
        for op in network.operations() {
            self.lower_operation(op)?;
        }
        Ok(LoweredOutput {
            graph: self.graph,
            bindings: self.bindings,
        })
    }

    fn lower_operation(&mut self, op: &Operation) -> Result<(), LowerError> {
        tracing::debug!(op = %op.id, kind = op.kind.name(), "lowering operation");

        // An explicitly estimate-only operation needs no verdict.
        if matches!(op.kind, OperationKind::EstimateOnly { .. }) {
            return rules::lower_estimate_only(self, op);
        }

        if !op.kind.is_trivial() {
            match self.support.query(self.network, op) {
                SupportLevel::Unsupported => {
                    return Err(LowerError::NotSupported {
                        reason: format!("{} rejected by the support oracle", op.kind.name()),
                    });
                }
                SupportLevel::EstimateOnly => {
                    tracing::debug!(op = %op.id, "lowering to an estimation placeholder");
                    return rules::lower_estimate_only(self, op);
                }
                SupportLevel::Supported => {}
            }
        }

        match &op.kind {
            OperationKind::Input { info } => rules::lower_input(self, op, info),
            OperationKind::Output { format } => rules::lower_output(self, op, *format),
            OperationKind::Constant { info, data } => rules::lower_constant(self, op, info, data),
            OperationKind::Convolution {
                info,
                weights,
                bias,
            } => rules::lower_convolution(self, op, info, weights, bias, false),
            OperationKind::DepthwiseConvolution {
                info,
                weights,
                bias,
            } => rules::lower_convolution(self, op, info, weights, bias, true),
            OperationKind::TransposeConvolution {
                info,
                weights,
                bias,
            } => rules::lower_transpose_convolution(self, op, info, weights, bias),
            OperationKind::FullyConnected { weights, bias, .. } => {
                rules::lower_fully_connected(self, op, weights, bias)
            }
            OperationKind::Pooling { info } => rules::lower_pooling(self, op, info),
            OperationKind::Relu { bounds } => rules::lower_relu(self, op, *bounds),
            OperationKind::Sigmoid => rules::lower_sigmoid(self, op),
            OperationKind::Softmax => rules::lower_softmax(self, op),
            OperationKind::Addition { .. } => rules::lower_addition(self, op),
            OperationKind::Concatenation { axis, .. } => {
                rules::lower_concatenation(self, op, *axis)
            }
            OperationKind::Split { axis, sizes } => rules::lower_split(self, op, *axis, sizes),
            OperationKind::Reshape { .. } => rules::lower_reshape(self, op),
            OperationKind::DepthToSpace { block_size } => {
                rules::lower_depth_to_space(self, op, *block_size)
            }
            OperationKind::EstimateOnly { .. } => rules::lower_estimate_only(self, op),
        }
    }

    /// The lowered node currently producing an operand's value.
    pub(crate) fn producer(&self, operand: OperandRef) -> Result<NodeId, LowerError> {
        self.bindings
            .get(&operand)
            .copied()
            .ok_or_else(|| LowerError::InvalidGraph {
                reason: format!("no lowered producer for operand {}", operand),
            })
    }

    /// Records `node` as the producer of `operand`.
    pub(crate) fn bind(&mut self, operand: OperandRef, node: NodeId) {
        self.bindings.insert(operand, node);
    }

    /// Wires an emitted chain: connects successive chain nodes, connects
    /// every input operand's producer to the chain head, and binds the
    /// operation's output (if any) to the chain tail.
    pub(crate) fn chain_connect(
        &mut self,
        op: &Operation,
        chain: &[NodeId],
    ) -> Result<(), LowerError> {
        assert!(
            op.outputs.len() <= 1,
            "chain_connect handles at most one output; {} has {}",
            op.kind.name(),
            op.outputs.len()
        );
        for pair in chain.windows(2) {
            self.graph.connect(pair[0], pair[1]);
        }
        for input in &op.inputs {
            let producer = self.producer(*input)?;
            self.graph.connect(producer, chain[0]);
        }
        if op.outputs.len() == 1 {
            let tail = *chain.last().expect("chain_connect requires a non-empty chain");
            self.bind(op.output_ref(0), tail);
        }
        Ok(())
    }
}
