//! Transpose-convolution lowering, shared by the `TransposeConvolution`
//! and `DepthToSpace` rewrite rules.
//!
//! A transpose convolution is realised on the MCE as "zero-upsample +
//! rotated-weights convolution": the upscale factor equals the stride, the
//! weights are reflected through their XY plane, and the internal
//! convolution pads by `K - 1 - user_pad` so its first output element
//! depends only on the first input element (the user's padding crops the
//! output). Kernels above 7x7 exceed the MCE; upscaling is then factored
//! into its own identity-depthwise pass and the convolution runs unscaled.

use smallvec::SmallVec;

use tessera_core::id::OperationId;
use tessera_core::ops::{BiasData, Padding, Stride, WeightsData};
use tessera_core::tensor::{DataFormat, DataType, QuantizationInfo, TensorInfo};

use crate::graph::{LoweredGraph, NodeId};
use crate::node::{LoweredFormat, LoweredKind, LoweredNode, MceData, MceOp};

/// Largest kernel extent the MCE convolves directly.
const MAX_MCE_KERNEL: u32 = 7;

/// Stored value and scale of synthesised identity weights. Their product
/// must stay exactly 1.0, with the scale below 1 so the back-end multiplier
/// stays representable.
pub(crate) const IDENTITY_WEIGHT_VALUE: u8 = 2;
pub(crate) const IDENTITY_WEIGHT_SCALE: f32 = 0.5;

/// Emits the 1- or 2-node chain realising a transpose convolution and
/// returns it head first. Nodes are created but not wired to any producer;
/// the caller connects the chain into the graph.
pub(crate) fn build_transpose_conv(
    graph: &mut LoweredGraph,
    source: OperationId,
    stride: Stride,
    weights: &WeightsData,
    bias: &BiasData,
    padding: Padding,
    input: &TensorInfo,
    output: &TensorInfo,
) -> SmallVec<[NodeId; 2]> {
    assert_eq!(
        stride.x, stride.y,
        "transpose convolution requires a square stride"
    );
    let [kh, kw, _, _] = weights.info.dimensions;
    assert!(
        kh > padding.top && kw > padding.left,
        "transpose convolution padding exceeds the kernel"
    );
    let mut upscale = stride.x;
    let pad_top = kh - 1 - padding.top;
    let pad_left = kw - 1 - padding.left;

    let mut chain: SmallVec<[NodeId; 2]> = SmallVec::new();
    let mut conv_input_shape = input.dimensions;

    if kh > MAX_MCE_KERNEL || kw > MAX_MCE_KERNEL {
        let head = identity_upscaler(graph, source, upscale, input);
        conv_input_shape = graph.node(head).shape;
        chain.push(head);
        upscale = 1;
    }

    let flipped = rotate_weights_xy(&weights.info, &weights.data);
    let conv = graph.add_node(LoweredNode::new(
        LoweredKind::Mce(Box::new(MceData {
            op: MceOp::Convolution,
            input_shape: conv_input_shape,
            weights_info: weights.info,
            weights: flipped,
            bias_info: bias.info,
            bias: bias.data.clone(),
            stride: Stride::default(),
            upscale_factor: upscale,
            pad_top,
            pad_left,
        })),
        output.dimensions,
        output.quantization,
        LoweredFormat::Nhwcb,
        source,
    ));
    chain.push(conv);
    chain
}

/// Emits a depthwise MCE pass that only upsamples: 1x1 identity weights per
/// channel, zero bias, `upscale` rows/columns of zero insertion.
fn identity_upscaler(
    graph: &mut LoweredGraph,
    source: OperationId,
    upscale: u32,
    input: &TensorInfo,
) -> NodeId {
    let [n, h, w, c] = input.dimensions;
    let weights_info = TensorInfo::new(
        [1, 1, c, 1],
        DataType::UInt8Quantized,
        DataFormat::Hwim,
        QuantizationInfo::new(0, IDENTITY_WEIGHT_SCALE),
    );
    let bias_info = TensorInfo::new(
        [1, 1, 1, c],
        DataType::Int32Quantized,
        DataFormat::Nhwc,
        QuantizationInfo::new(0, IDENTITY_WEIGHT_SCALE * input.quantization.scale),
    );
    graph.add_node(LoweredNode::new(
        LoweredKind::Mce(Box::new(MceData {
            op: MceOp::DepthwiseConvolution,
            input_shape: input.dimensions,
            weights_info,
            weights: vec![IDENTITY_WEIGHT_VALUE; c as usize],
            bias_info,
            bias: vec![0; c as usize],
            stride: Stride::default(),
            upscale_factor: upscale,
            pad_top: 0,
            pad_left: 0,
        })),
        [n, h * upscale, w * upscale, c],
        input.quantization,
        LoweredFormat::Nhwcb,
        source,
    ))
}

/// Reflects a weight tensor through its XY plane:
/// `flipped[KH-1-y, KW-1-x, ..] = original[y, x, ..]`. The trailing two
/// dimensions move as one contiguous block.
pub fn rotate_weights_xy(info: &TensorInfo, data: &[u8]) -> Vec<u8> {
    let [kh, kw, i, o] = info.dimensions;
    let block = (i * o) as usize;
    let mut flipped = vec![0u8; data.len()];
    for y in 0..kh {
        for x in 0..kw {
            let src = ((y * kw + x) as usize) * block;
            let dst = (((kh - 1 - y) * kw + (kw - 1 - x)) as usize) * block;
            flipped[dst..dst + block].copy_from_slice(&data[src..src + block]);
        }
    }
    flipped
}
