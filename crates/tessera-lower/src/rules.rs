//! The per-kind rewrite rules.
//!
//! Each rule turns one source operation into a chain of lowered nodes and
//! wires it into the graph, either through
//! [`NetworkConverter::chain_connect`] or (for multi-output and
//! splice-heavy kinds) by hand. The hardware model lives here: layout
//! round-trips around reshapes, brick-group alignment choices for
//! concatenation and split, the strided-interleave head shared by the
//! convolution kinds, fully-connected repacking, and the synthesised
//! selector weights behind depth-to-space.

use smallvec::SmallVec;

use tessera_core::id::OperationId;
use tessera_core::network::Operation;
use tessera_core::ops::{
    BiasData, ConvInfo, Padding, PoolingInfo, PoolingType, ReluBounds, Stride, WeightsData,
};
use tessera_core::tensor::{div_round_up, DataFormat, DataType, QuantizationInfo, TensorInfo};

use crate::convert::NetworkConverter;
use crate::error::LowerError;
use crate::graph::NodeId;
use crate::node::{
    Fraction, LoweredFormat, LoweredKind, LoweredNode, MceData, MceOp, PleOp, ShapeMultiplier,
};
use crate::{packing, transpose};

type Chain = SmallVec<[NodeId; 4]>;

fn activation_format(format: DataFormat) -> Result<LoweredFormat, LowerError> {
    LoweredFormat::from_data_format(format).ok_or_else(|| LowerError::InvalidGraph {
        reason: format!("{:?} is not an activation layout", format),
    })
}

pub(crate) fn lower_input(
    cv: &mut NetworkConverter,
    op: &Operation,
    info: &TensorInfo,
) -> Result<(), LowerError> {
    let declared = activation_format(info.format)?;
    let mut chain = Chain::new();
    chain.push(cv.graph.add_node(LoweredNode::new(
        LoweredKind::Input { info: *info },
        info.dimensions,
        info.quantization,
        declared,
        op.id,
    )));
    if declared != LoweredFormat::Nhwcb {
        chain.push(cv.graph.add_node(LoweredNode::new(
            LoweredKind::FormatConversion,
            info.dimensions,
            info.quantization,
            LoweredFormat::Nhwcb,
            op.id,
        )));
    }
    cv.chain_connect(op, &chain)
}

/// Output nodes (and any conversion in front of them) take their provenance
/// from the *producing* operation, so downstream consumers can identify
/// which operation each network output belongs to.
pub(crate) fn lower_output(
    cv: &mut NetworkConverter,
    op: &Operation,
    format: DataFormat,
) -> Result<(), LowerError> {
    let operand = op.inputs[0];
    let info = *cv.network.operand_info(operand)?;
    let declared = activation_format(format)?;
    let producer = cv.producer(operand)?;
    let mut tail = producer;
    if cv.graph.node(producer).format != declared {
        let conversion = cv.graph.add_node(LoweredNode::new(
            LoweredKind::FormatConversion,
            info.dimensions,
            info.quantization,
            declared,
            operand.producer,
        ));
        cv.graph.connect(producer, conversion);
        tail = conversion;
    }
    let output = cv.graph.add_node(LoweredNode::new(
        LoweredKind::Output { operand },
        info.dimensions,
        info.quantization,
        declared,
        operand.producer,
    ));
    cv.graph.connect(tail, output);
    Ok(())
}

pub(crate) fn lower_constant(
    cv: &mut NetworkConverter,
    op: &Operation,
    info: &TensorInfo,
    data: &[u8],
) -> Result<(), LowerError> {
    let format = LoweredFormat::from_data_format(info.format).unwrap_or(LoweredFormat::Nhwc);
    let node = cv.graph.add_node(LoweredNode::new(
        LoweredKind::Constant {
            info: *info,
            data: data.to_vec(),
        },
        info.dimensions,
        info.quantization,
        format,
        op.id,
    ));
    cv.chain_connect(op, &[node])
}

pub(crate) fn lower_relu(
    cv: &mut NetworkConverter,
    op: &Operation,
    bounds: ReluBounds,
) -> Result<(), LowerError> {
    let out = op.outputs[0];
    let node = cv.graph.add_node(LoweredNode::new(
        LoweredKind::McePostProcess { bounds },
        out.dimensions,
        out.quantization,
        LoweredFormat::Nhwcb,
        op.id,
    ));
    cv.chain_connect(op, &[node])
}

pub(crate) fn lower_sigmoid(cv: &mut NetworkConverter, op: &Operation) -> Result<(), LowerError> {
    let out = op.outputs[0];
    let node = cv.graph.add_node(LoweredNode::new(
        LoweredKind::FusePle {
            op: PleOp::Sigmoid,
            shape_multiplier: ShapeMultiplier::IDENTITY,
        },
        out.dimensions,
        out.quantization,
        LoweredFormat::Nhwcb,
        op.id,
    ));
    cv.chain_connect(op, &[node])
}

/// Softmax has no hardware realisation; only the estimate-only path (taken
/// before this rule) is legal.
pub(crate) fn lower_softmax(_cv: &mut NetworkConverter, _op: &Operation) -> Result<(), LowerError> {
    Err(LowerError::NotImplemented("softmax lowering".into()))
}

pub(crate) fn lower_pooling(
    cv: &mut NetworkConverter,
    op: &Operation,
    info: &PoolingInfo,
) -> Result<(), LowerError> {
    let in_info = *cv.network.operand_info(op.inputs[0])?;
    let out = op.outputs[0];
    let [_, in_h, in_w, _] = in_info.dimensions;

    // Candidate configurations, with the incoming stride substituted into
    // the mean pattern and the incoming padding into the fixed patterns.
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

    let downscale = ShapeMultiplier {
        h: Fraction::new(1, info.stride_y),
        w: Fraction::new(1, info.stride_x),
        channels: 1,
    };
    let kind = if *info == mean {
        LoweredKind::FusePle {
            op: PleOp::MeanXy8x8,
            shape_multiplier: downscale,
        }
    } else if *info == avg_3x3_1_1 {
        LoweredKind::StandalonePle {
            op: PleOp::AvgPool3x3_1_1_Udma,
        }
    } else if *info == max_2x2_2_2 {
        LoweredKind::FusePle {
            op: PleOp::MaxPool2x2_2_2,
            shape_multiplier: downscale,
        }
    } else if *info == max_3x3_2_2 {
        LoweredKind::FusePle {
            op: PleOp::MaxPool3x3_2_2,
            shape_multiplier: downscale,
        }
    } else {
        return Err(LowerError::NotSupported {
            reason: "unrecognised pooling configuration".into(),
        });
    };

    let node = cv.graph.add_node(LoweredNode::new(
        kind,
        out.dimensions,
        out.quantization,
        LoweredFormat::Nhwcb,
        op.id,
    ));
    cv.chain_connect(op, &[node])
}

/// A reshape is a layout round-trip around a metadata-only rewrite: drop to
/// NHWC, re-tag the shape, and return to NHWCB.
pub(crate) fn lower_reshape(cv: &mut NetworkConverter, op: &Operation) -> Result<(), LowerError> {
    let in_info = *cv.network.operand_info(op.inputs[0])?;
    let out = op.outputs[0];
    let producer = cv.producer(op.inputs[0])?;
    let mut chain = Chain::new();
    if cv.graph.node(producer).format != LoweredFormat::Nhwc {
        chain.push(cv.graph.add_node(LoweredNode::new(
            LoweredKind::FormatConversion,
            in_info.dimensions,
            in_info.quantization,
            LoweredFormat::Nhwc,
            op.id,
        )));
    }
    chain.push(cv.graph.add_node(LoweredNode::new(
        LoweredKind::Reinterpret,
        out.dimensions,
        out.quantization,
        LoweredFormat::Nhwc,
        op.id,
    )));
    chain.push(cv.graph.add_node(LoweredNode::new(
        LoweredKind::FormatConversion,
        out.dimensions,
        out.quantization,
        LoweredFormat::Nhwcb,
        op.id,
    )));
    cv.chain_connect(op, &chain)
}

/// Fully connected: reinterpret the flattened input as the smallest
/// brick-covering shape, pad the weights to the encoder's channel
/// granularity, and run the MCE in fully-connected mode.
pub(crate) fn lower_fully_connected(
    cv: &mut NetworkConverter,
    op: &Operation,
    weights: &WeightsData,
    bias: &BiasData,
) -> Result<(), LowerError> {
    let in_info = *cv.network.operand_info(op.inputs[0])?;
    let out = op.outputs[0];
    let producer = cv.producer(op.inputs[0])?;
    let mut chain = Chain::new();
    if cv.graph.node(producer).format != LoweredFormat::Nhwc {
        chain.push(cv.graph.add_node(LoweredNode::new(
            LoweredKind::FormatConversion,
            in_info.dimensions,
            in_info.quantization,
            LoweredFormat::Nhwc,
            op.id,
        )));
    }
    let [_, h, w, c] = in_info.dimensions;
    let reinterpreted = packing::linear_brick_shape(cv.caps.brick_group_shape(), h * w * c);
    chain.push(cv.graph.add_node(LoweredNode::new(
        LoweredKind::Reinterpret,
        reinterpreted,
        in_info.quantization,
        LoweredFormat::Nhwcb,
        op.id,
    )));
    let padded = packing::pad_fully_connected_weights(weights);
    chain.push(cv.graph.add_node(LoweredNode::new(
        LoweredKind::Mce(Box::new(MceData {
            op: MceOp::FullyConnected,
            input_shape: reinterpreted,
            weights_info: padded.info,
            weights: padded.data,
            bias_info: bias.info,
            bias: bias.data.clone(),
            stride: Stride::default(),
            upscale_factor: 1,
            pad_top: 0,
            pad_left: 0,
        })),
        out.dimensions,
        out.quantization,
        LoweredFormat::Nhwcb,
        op.id,
    )));
    cv.chain_connect(op, &chain)
}

pub(crate) fn lower_addition(cv: &mut NetworkConverter, op: &Operation) -> Result<(), LowerError> {
    let lhs = cv.network.operand_info(op.inputs[0])?.quantization;
    let rhs = cv.network.operand_info(op.inputs[1])?.quantization;
    let out = op.outputs[0];
    let ple = if lhs == rhs && lhs == out.quantization {
        PleOp::Addition
    } else {
        PleOp::AdditionRescale
    };
    let node = cv.graph.add_node(LoweredNode::new(
        LoweredKind::StandalonePle { op: ple },
        out.dimensions,
        out.quantization,
        LoweredFormat::Nhwcb,
        op.id,
    ));
    cv.chain_connect(op, &[node])
}

/// Concatenation wires all inputs first, then fixes layouts and
/// quantization by splicing conversion/requantize nodes onto the recorded
/// edges. The two phases keep the splices off the edge list being
/// examined.
pub(crate) fn lower_concatenation(
    cv: &mut NetworkConverter,
    op: &Operation,
    axis: u32,
) -> Result<(), LowerError> {
    if !cv.options.estimation {
        for input in &op.inputs {
            if cv.network.consumer_count(*input) > 1 {
                return Err(LowerError::NotSupported {
                    reason: "concatenation input is shared with another consumer".into(),
                });
            }
        }
    }

    let axis_idx = axis as usize;
    let brick_group = cv.caps.brick_group_shape();
    let mut aligned = true;
    for input in &op.inputs {
        let info = cv.network.operand_info(*input)?;
        if info.dimensions[axis_idx] % brick_group[axis_idx] != 0 {
            aligned = false;
        }
    }
    let format = if aligned {
        LoweredFormat::Nhwcb
    } else {
        LoweredFormat::Nhwc
    };

    let out = op.outputs[0];
    let concat = cv.graph.add_node(LoweredNode::new(
        LoweredKind::Concat { axis },
        out.dimensions,
        out.quantization,
        format,
        op.id,
    ));

    let mut fixups = Vec::new();
    for input in &op.inputs {
        let info = *cv.network.operand_info(*input)?;
        let producer = cv.producer(*input)?;
        let edge = cv.graph.connect(producer, concat);
        let needs_format = cv.graph.node(producer).format != format;
        let needs_requant = info.quantization != out.quantization;
        if needs_format || needs_requant {
            fixups.push((edge, info, needs_format, needs_requant));
        }
    }
    for (edge, info, needs_format, needs_requant) in fixups {
        let mut edge = edge;
        if needs_format {
            tracing::trace!(op = %op.id, "splicing a format conversion onto a concat input");
            let conversion = cv.graph.add_node(LoweredNode::new(
                LoweredKind::FormatConversion,
                info.dimensions,
                info.quantization,
                format,
                op.id,
            ));
            edge = cv.graph.split_edge(edge, conversion);
        }
        if needs_requant {
            tracing::trace!(op = %op.id, "splicing a requantize onto a concat input");
            let requantize = cv.graph.add_node(LoweredNode::new(
                LoweredKind::Requantize,
                info.dimensions,
                out.quantization,
                format,
                op.id,
            ));
            cv.graph.split_edge(edge, requantize);
        }
    }

    cv.bind(op.output_ref(0), concat);
    Ok(())
}

/// Split emits one sub-tensor extraction per piece, with offsets advancing
/// along the split axis. Extraction never requantizes.
pub(crate) fn lower_split(
    cv: &mut NetworkConverter,
    op: &Operation,
    axis: u32,
    sizes: &[u32],
) -> Result<(), LowerError> {
    let input = op.inputs[0];
    let in_info = *cv.network.operand_info(input)?;
    let axis_idx = axis as usize;
    let brick_group = cv.caps.brick_group_shape();
    let aligned = op
        .outputs
        .iter()
        .all(|out| out.dimensions[axis_idx] % brick_group[axis_idx] == 0);
    let format = if aligned {
        LoweredFormat::Nhwcb
    } else {
        LoweredFormat::Nhwc
    };

    let mut source = cv.producer(input)?;
    if cv.graph.node(source).format != format {
        let conversion = cv.graph.add_node(LoweredNode::new(
            LoweredKind::FormatConversion,
            in_info.dimensions,
            in_info.quantization,
            format,
            op.id,
        ));
        cv.graph.connect(source, conversion);
        source = conversion;
    }

    let mut offset = [0u32; 4];
    for (index, out) in op.outputs.iter().enumerate() {
        let piece = cv.graph.add_node(LoweredNode::new(
            LoweredKind::ExtractSubtensor { offset },
            out.dimensions,
            in_info.quantization,
            format,
            op.id,
        ));
        cv.graph.connect(source, piece);
        cv.bind(op.output_ref(index as u32), piece);
        offset[axis_idx] += sizes[index];
    }
    Ok(())
}

/// Shared lowering for `Convolution` and `DepthwiseConvolution`. A stride
/// above 1 inserts the interleave head; a depthwise channel multiplier
/// above 1 degenerates to a normal convolution over a single input
/// channel.
pub(crate) fn lower_convolution(
    cv: &mut NetworkConverter,
    op: &Operation,
    info: &ConvInfo,
    weights: &WeightsData,
    bias: &BiasData,
    depthwise: bool,
) -> Result<(), LowerError> {
    let in_info = *cv.network.operand_info(op.inputs[0])?;
    let out = op.outputs[0];

    let mut chain = Chain::new();
    if info.stride.x > 1 || info.stride.y > 1 {
        chain.push(strided_interleave_head(cv, op.id, &in_info, info.stride));
    }

    let (mce_op, weights_info) = if depthwise {
        let [_, _, in_channels, multiplier] = weights.info.dimensions;
        if multiplier > 1 {
            assert_eq!(
                in_channels, 1,
                "depthwise channel multiplier above 1 requires a single input channel"
            );
            let mut relabelled = weights.info;
            relabelled.format = DataFormat::Hwio;
            (MceOp::Convolution, relabelled)
        } else {
            (MceOp::DepthwiseConvolution, weights.info)
        }
    } else {
        (MceOp::Convolution, weights.info)
    };

    chain.push(cv.graph.add_node(LoweredNode::new(
        LoweredKind::Mce(Box::new(MceData {
            op: mce_op,
            input_shape: in_info.dimensions,
            weights_info,
            weights: weights.data.clone(),
            bias_info: bias.info,
            bias: bias.data.clone(),
            stride: info.stride,
            upscale_factor: 1,
            pad_top: info.padding.top,
            pad_left: info.padding.left,
        })),
        out.dimensions,
        out.quantization,
        LoweredFormat::Nhwcb,
        op.id,
    )));
    cv.chain_connect(op, &chain)
}

/// The interleave head reformats a stride-2 problem into a stride-1
/// convolution over a tensor whose `SX * SY` sub-maps occupy their own
/// channel ranges.
fn strided_interleave_head(
    cv: &mut NetworkConverter,
    source: OperationId,
    input: &TensorInfo,
    stride: Stride,
) -> NodeId {
    assert!(
        stride.x == 2 && stride.y == 2,
        "strided convolution requires a 2x2 stride"
    );
    let [n, h, w, c] = input.dimensions;
    let shape = [
        n,
        div_round_up(h, stride.y),
        div_round_up(w, stride.x),
        cv.caps.num_submap_channels(c, stride),
    ];
    cv.graph.add_node(LoweredNode::new(
        LoweredKind::FusePle {
            op: PleOp::Interleave2x2_2_2,
            shape_multiplier: ShapeMultiplier {
                h: Fraction::new(1, stride.y),
                w: Fraction::new(1, stride.x),
                channels: stride.x * stride.y,
            },
        },
        shape,
        input.quantization,
        LoweredFormat::Nhwcb,
        source,
    ))
}

pub(crate) fn lower_transpose_convolution(
    cv: &mut NetworkConverter,
    op: &Operation,
    info: &ConvInfo,
    weights: &WeightsData,
    bias: &BiasData,
) -> Result<(), LowerError> {
    let in_info = *cv.network.operand_info(op.inputs[0])?;
    let out = op.outputs[0];
    let chain = transpose::build_transpose_conv(
        &mut cv.graph,
        op.id,
        info.stride,
        weights,
        bias,
        info.padding,
        &in_info,
        &out,
    );
    cv.chain_connect(op, &chain)
}

/// Depth-to-space (block 2) is a 2-stride transpose convolution whose
/// synthesised 2x2 weights select, for each output pixel position, the
/// input channel range holding that position's values.
pub(crate) fn lower_depth_to_space(
    cv: &mut NetworkConverter,
    op: &Operation,
    block_size: u32,
) -> Result<(), LowerError> {
    assert_eq!(block_size, 2, "depth-to-space supports a block size of 2 only");
    let in_info = *cv.network.operand_info(op.inputs[0])?;
    let out = op.outputs[0];
    let (weights, bias) = depth_to_space_selectors(&in_info);
    let chain = transpose::build_transpose_conv(
        &mut cv.graph,
        op.id,
        Stride::new(block_size, block_size),
        &weights,
        &bias,
        Padding::ZERO,
        &in_info,
        &out,
    );
    cv.chain_connect(op, &chain)
}

/// One-hot selector weights of shape `(2, 2, C, C/4)`: position `(v, u)` of
/// output channel `o` reads input channel `o + (v*2 + u) * C/4`.
fn depth_to_space_selectors(input: &TensorInfo) -> (WeightsData, BiasData) {
    let channels = input.dimensions[3];
    let out_channels = channels / 4;
    let mut data = vec![0u8; (2 * 2 * channels * out_channels) as usize];
    for ofm in 0..out_channels {
        for v in 0..2u32 {
            for u in 0..2u32 {
                let ifm = ofm + (v * 2 + u) * (channels / 4);
                let index = (((v * 2 + u) * channels + ifm) * out_channels + ofm) as usize;
                data[index] = transpose::IDENTITY_WEIGHT_VALUE;
            }
        }
    }
    let weights = WeightsData {
        info: TensorInfo::new(
            [2, 2, channels, out_channels],
            DataType::UInt8Quantized,
            DataFormat::Hwio,
            QuantizationInfo::new(0, transpose::IDENTITY_WEIGHT_SCALE),
        ),
        data,
    };
    let bias = BiasData {
        info: TensorInfo::new(
            [1, 1, 1, out_channels],
            DataType::Int32Quantized,
            DataFormat::Nhwc,
            QuantizationInfo::new(
                0,
                transpose::IDENTITY_WEIGHT_SCALE * input.quantization.scale,
            ),
        ),
        data: vec![0; out_channels as usize],
    };
    (weights, bias)
}

/// Estimate-only lowering, shared by the `EstimateOnly` source kind and
/// every `EstimateOnly` oracle verdict: one placeholder per output, each
/// fed by every input's current producer.
pub(crate) fn lower_estimate_only(
    cv: &mut NetworkConverter,
    op: &Operation,
) -> Result<(), LowerError> {
    for (index, out) in op.outputs.iter().enumerate() {
        let node = cv.graph.add_node(LoweredNode::new(
            LoweredKind::EstimateOnly,
            out.dimensions,
            out.quantization,
            LoweredFormat::Nhwcb,
            op.id,
        ));
        for input in &op.inputs {
            let producer = cv.producer(*input)?;
            cv.graph.connect(producer, node);
        }
        cv.bind(op.output_ref(index as u32), node);
    }
    Ok(())
}
