//! The supportedness oracle seam.
//!
//! For every non-trivial operation the conversion pass asks the oracle for a
//! three-valued verdict before rewriting: `Supported` runs the kind-specific
//! lowering, `EstimateOnly` lowers to a placeholder node, `Unsupported`
//! aborts the pass. The oracle is an external collaborator from the pass's
//! point of view; [`BasicSupport`] implements the structural checks the
//! rewrite rules rely on, and [`AlwaysSupported`] is a test double.

use serde::{Deserialize, Serialize};

use tessera_core::network::{Network, Operation};
use tessera_core::ops::{OperationKind, Padding, PoolingInfo, PoolingType};

/// Verdict returned by the support oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportLevel {
    Supported,
    /// The operation can be represented only as a placeholder whose
    /// downstream semantics are performance estimation, not execution.
    EstimateOnly,
    Unsupported,
}

/// Classifies operations into [`SupportLevel`]s.
pub trait SupportOracle {
    fn query(&self, network: &Network, op: &Operation) -> SupportLevel;
}

/// Oracle that accepts everything. Used in tests to reach the rewrite
/// rules' own structural dispatch (and their precondition assertions).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSupported;

impl SupportOracle for AlwaysSupported {
    fn query(&self, _network: &Network, _op: &Operation) -> SupportLevel {
        SupportLevel::Supported
    }
}

/// Structural supportedness checks for the target hardware.
///
/// Covers the constraints the rewrite rules assume have been enforced
/// upstream: stride and kernel limits on the MCE, the transpose-convolution
/// padding algebra, the pooling-configuration whitelist, and the operations
/// the hardware can only estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSupport;

impl SupportOracle for BasicSupport {
    fn query(&self, network: &Network, op: &Operation) -> SupportLevel {
        match &op.kind {
            OperationKind::Softmax => SupportLevel::EstimateOnly,
            OperationKind::EstimateOnly { .. } => SupportLevel::EstimateOnly,

            OperationKind::Convolution { info, weights, .. } => {
                let [kh, kw, _, _] = weights.info.dimensions;
                if kh > 7 || kw > 7 {
                    return SupportLevel::Unsupported;
                }
                stride_verdict(info.stride.x, info.stride.y)
            }

            OperationKind::DepthwiseConvolution { info, weights, .. } => {
                let [kh, kw, i, m] = weights.info.dimensions;
                if kh > 7 || kw > 7 {
                    return SupportLevel::Unsupported;
                }
                // A channel multiplier is only expressible when there is a
                // single input channel (the case degenerates to a normal
                // convolution).
                if m > 1 && i != 1 {
                    return SupportLevel::Unsupported;
                }
                stride_verdict(info.stride.x, info.stride.y)
            }

            OperationKind::TransposeConvolution { info, weights, .. } => {
                let [kh, kw, _, _] = weights.info.dimensions;
                if info.stride.x != info.stride.y {
                    return SupportLevel::Unsupported;
                }
                // The internal convolution pads by `K - 1 - user_pad`, which
                // must not go negative.
                if info.padding.top + 1 > kh || info.padding.left + 1 > kw {
                    return SupportLevel::Unsupported;
                }
                SupportLevel::Supported
            }

            OperationKind::Pooling { info } => {
                let input = match op
                    .inputs
                    .first()
                    .and_then(|operand| network.operand_info(*operand).ok())
                {
                    Some(info) => info,
                    None => return SupportLevel::Unsupported,
                };
                if pooling_config_recognised(info, input.dimensions[1], input.dimensions[2]) {
                    SupportLevel::Supported
                } else {
                    SupportLevel::Unsupported
                }
            }

            OperationKind::DepthToSpace { block_size } => {
                let channels = op
                    .inputs
                    .first()
                    .and_then(|operand| network.operand_info(*operand).ok())
                    .map(|info| info.dimensions[3])
                    .unwrap_or(0);
                if *block_size == 2 && channels % 4 == 0 {
                    SupportLevel::Supported
                } else {
                    SupportLevel::Unsupported
                }
            }

            _ => SupportLevel::Supported,
        }
    }
}

fn stride_verdict(x: u32, y: u32) -> SupportLevel {
    if x == y && (x == 1 || x == 2) {
        SupportLevel::Supported
    } else {
        SupportLevel::Unsupported
    }
}

/// The pooling configurations with a hardware realisation: whole-plane
/// average ("mean"), 3x3/1x1 average, and the two max-pool shapes.
///
/// Candidate patterns are compared by structural equality with selected
/// fields substituted from the incoming info: the mean pattern substitutes
/// the stride (any stride reduces a whole plane to one pixel) but requires
/// zero padding; the fixed patterns substitute the padding.
fn pooling_config_recognised(info: &PoolingInfo, in_h: u32, in_w: u32) -> bool {
    let mean = PoolingInfo::new(
        in_h,
        in_w,
        info.stride_y,
        info.stride_x,
        Padding::ZERO,
        PoolingType::Avg,
    );
    let avg_3x3_1_1 = PoolingInfo::new(3, 3, 1, 1, info.padding, PoolingType::Avg);
    let max_2x2_2_2 = PoolingInfo::new(2, 2, 2, 2, info.padding, PoolingType::Max);
    let max_3x3_2_2 = PoolingInfo::new(3, 3, 2, 2, info.padding, PoolingType::Max);
    *info == mean || *info == avg_3x3_1_1 || *info == max_2x2_2_2 || *info == max_3x3_2_2
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::ops::{ConvInfo, ReluBounds, Stride};
    use tessera_core::tensor::{DataFormat, DataType, QuantizationInfo, TensorInfo};
    use tessera_core::WeightsData;

    fn net_with_input(shape: [u32; 4]) -> (Network, tessera_core::OperandRef) {
        let mut net = Network::new();
        let input = net
            .add_input(TensorInfo::new(
                shape,
                DataType::UInt8Quantized,
                DataFormat::Nhwc,
                QuantizationInfo::new(0, 1.0),
            ))
            .unwrap();
        (net, input)
    }

    fn hwio(shape: [u32; 4]) -> WeightsData {
        WeightsData {
            info: TensorInfo::new(
                shape,
                DataType::UInt8Quantized,
                DataFormat::Hwio,
                QuantizationInfo::new(0, 1.0),
            ),
            data: vec![0; tessera_core::shape_volume(shape) as usize],
        }
    }

    fn bias(channels: u32) -> tessera_core::BiasData {
        tessera_core::BiasData {
            info: TensorInfo::new(
                [1, 1, 1, channels],
                DataType::Int32Quantized,
                DataFormat::Nhwc,
                QuantizationInfo::new(0, 1.0),
            ),
            data: vec![0; channels as usize],
        }
    }

    fn conv_info(stride: u32) -> ConvInfo {
        ConvInfo {
            padding: Padding::ZERO,
            stride: Stride::new(stride, stride),
            output_quant: QuantizationInfo::new(0, 1.0),
        }
    }

    #[test]
    fn softmax_is_estimate_only() {
        let (mut net, input) = net_with_input([1, 1, 1, 10]);
        net.add_softmax(input).unwrap();
        let op = net.operations().last().unwrap();
        assert_eq!(BasicSupport.query(&net, op), SupportLevel::EstimateOnly);
    }

    #[test]
    fn stride_three_convolution_is_unsupported() {
        let (mut net, input) = net_with_input([1, 9, 9, 4]);
        net.add_convolution(input, conv_info(3), hwio([3, 3, 4, 4]), bias(4))
            .unwrap();
        let op = net.operations().last().unwrap();
        assert_eq!(BasicSupport.query(&net, op), SupportLevel::Unsupported);
    }

    #[test]
    fn mean_pooling_requires_zero_padding() {
        let (mut net, input) = net_with_input([1, 8, 8, 16]);
        net.add_pooling(
            input,
            PoolingInfo::new(8, 8, 8, 8, Padding::ZERO, PoolingType::Avg),
        )
        .unwrap();
        let mean = net.operations().last().unwrap().clone();
        assert_eq!(BasicSupport.query(&net, &mean), SupportLevel::Supported);

        let (mut net, input) = net_with_input([1, 8, 8, 16]);
        net.add_pooling(
            input,
            PoolingInfo::new(8, 8, 8, 8, Padding::new(1, 1, 1, 1), PoolingType::Avg),
        )
        .unwrap();
        let padded = net.operations().last().unwrap().clone();
        assert_eq!(BasicSupport.query(&net, &padded), SupportLevel::Unsupported);
    }

    #[test]
    fn max_pooling_accepts_arbitrary_padding() {
        let (mut net, input) = net_with_input([1, 8, 8, 16]);
        net.add_pooling(
            input,
            PoolingInfo::new(3, 3, 2, 2, Padding::new(1, 0, 1, 0), PoolingType::Max),
        )
        .unwrap();
        let op = net.operations().last().unwrap();
        assert_eq!(BasicSupport.query(&net, op), SupportLevel::Supported);
    }

    #[test]
    fn one_by_one_pooling_is_unsupported() {
        let (mut net, input) = net_with_input([1, 8, 8, 16]);
        net.add_pooling(
            input,
            PoolingInfo::new(1, 1, 1, 1, Padding::ZERO, PoolingType::Max),
        )
        .unwrap();
        let op = net.operations().last().unwrap();
        assert_eq!(BasicSupport.query(&net, op), SupportLevel::Unsupported);
    }

    #[test]
    fn transpose_convolution_rejects_oversized_padding() {
        let (mut net, input) = net_with_input([1, 4, 4, 8]);
        net.add_transpose_convolution(
            input,
            ConvInfo {
                padding: Padding::new(3, 0, 0, 0),
                stride: Stride::new(2, 2),
                output_quant: QuantizationInfo::new(0, 1.0),
            },
            hwio([3, 3, 8, 8]),
            bias(8),
        )
        .unwrap();
        let op = net.operations().last().unwrap();
        assert_eq!(BasicSupport.query(&net, op), SupportLevel::Unsupported);
    }

    #[test]
    fn elementwise_kinds_are_supported() {
        let (mut net, input) = net_with_input([1, 8, 8, 16]);
        net.add_relu(input, ReluBounds::new(0, 255)).unwrap();
        let op = net.operations().last().unwrap();
        assert_eq!(BasicSupport.query(&net, op), SupportLevel::Supported);
    }
}
