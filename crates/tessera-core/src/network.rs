//! The source network: an append-only arena of high-level operations.
//!
//! [`Network`] is the single entry point for constructing networks. All
//! mutations go through `add_*` builder methods, which validate operands,
//! infer output shapes and quantization, and maintain per-operand consumer
//! counts. Because every operation's inputs must already exist when it is
//! added, the arena order is a topological order -- the conversion pass
//! visits operations by walking the arena front to back.
//!
//! Operand identity is `(operation id, output index)`; see
//! [`OperandRef`](crate::id::OperandRef).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::error::CoreError;
use crate::id::{OperandRef, OperationId};
use crate::ops::{
    BiasData, ConvInfo, FullyConnectedInfo, OperationKind, PoolingInfo, ReluBounds, WeightsData,
};
use crate::tensor::{
    shape_volume, DataFormat, DataType, QuantizationInfo, TensorInfo, TensorShape,
};

/// One operation in the network, with its wired inputs and inferred outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub inputs: SmallVec<[OperandRef; 2]>,
    pub outputs: SmallVec<[TensorInfo; 1]>,
}

impl Operation {
    /// Reference to this operation's `index`-th output operand.
    pub fn output_ref(&self, index: u32) -> OperandRef {
        OperandRef::new(self.id, index)
    }
}

/// The source network arena.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    operations: Vec<Operation>,
    /// How many operations consume each operand. Read by the concatenation
    /// rewrite rule's shared-input rejection.
    consumers: HashMap<OperandRef, u32>,
}

impl Network {
    pub fn new() -> Self {
        Network::default()
    }

    /// All operations, in topological (construction) order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Looks up an operation by id.
    pub fn operation(&self, id: OperationId) -> Option<&Operation> {
        self.operations.get(id.0 as usize)
    }

    /// Tensor description of an operand.
    pub fn operand_info(&self, operand: OperandRef) -> Result<&TensorInfo, CoreError> {
        self.operation(operand.producer)
            .and_then(|op| op.outputs.get(operand.index as usize))
            .ok_or(CoreError::UnknownOperand { operand })
    }

    /// Number of operations consuming an operand.
    pub fn consumer_count(&self, operand: OperandRef) -> u32 {
        self.consumers.get(&operand).copied().unwrap_or(0)
    }

    fn check_operand(&self, operand: OperandRef) -> Result<(), CoreError> {
        self.operand_info(operand).map(|_| ())
    }

    fn push(
        &mut self,
        kind: OperationKind,
        inputs: SmallVec<[OperandRef; 2]>,
        outputs: SmallVec<[TensorInfo; 1]>,
    ) -> OperationId {
        let id = OperationId(self.operations.len() as u32);
        for input in &inputs {
            *self.consumers.entry(*input).or_insert(0) += 1;
        }
        self.operations.push(Operation {
            id,
            kind,
            inputs,
            outputs,
        });
        id
    }

    // -----------------------------------------------------------------------
    // Builder methods
    // -----------------------------------------------------------------------

    /// Adds a network input with its declared external description.
    pub fn add_input(&mut self, info: TensorInfo) -> Result<OperandRef, CoreError> {
        if !matches!(info.format, DataFormat::Nhwc | DataFormat::Nhwcb) {
            return Err(CoreError::InvalidOperation {
                reason: "network inputs must use an activation layout (NHWC or NHWCB)".into(),
            });
        }
        let id = self.push(OperationKind::Input { info }, smallvec![], smallvec![info]);
        Ok(OperandRef::new(id, 0))
    }

    /// Marks an operand as a network output with a declared external layout.
    pub fn add_output(
        &mut self,
        input: OperandRef,
        format: DataFormat,
    ) -> Result<OperationId, CoreError> {
        self.check_operand(input)?;
        if !matches!(format, DataFormat::Nhwc | DataFormat::Nhwcb) {
            return Err(CoreError::InvalidOperation {
                reason: "network outputs must use an activation layout (NHWC or NHWCB)".into(),
            });
        }
        Ok(self.push(
            OperationKind::Output { format },
            smallvec![input],
            smallvec![],
        ))
    }

    /// Adds a free-standing constant tensor.
    pub fn add_constant(
        &mut self,
        info: TensorInfo,
        data: Vec<u8>,
    ) -> Result<OperandRef, CoreError> {
        if data.len() != info.size_bytes() {
            return Err(CoreError::DataSizeMismatch {
                expected: info.size_bytes(),
                actual: data.len(),
            });
        }
        let id = self.push(
            OperationKind::Constant { info, data },
            smallvec![],
            smallvec![info],
        );
        Ok(OperandRef::new(id, 0))
    }

    /// Adds a convolution. Weights are HWIO `[KH, KW, I, O]`.
    pub fn add_convolution(
        &mut self,
        input: OperandRef,
        info: ConvInfo,
        weights: WeightsData,
        bias: BiasData,
    ) -> Result<OperandRef, CoreError> {
        let in_info = *self.operand_info(input)?;
        check_weights(&weights, DataFormat::Hwio)?;
        let [kh, kw, i, o] = weights.info.dimensions;
        if i != in_info.dimensions[3] {
            return Err(CoreError::InvalidOperation {
                reason: format!(
                    "convolution weights expect {} input channels, input has {}",
                    i, in_info.dimensions[3]
                ),
            });
        }
        check_bias(&bias, o)?;
        let (out_h, out_w) = conv_output_extent(in_info.dimensions, kh, kw, &info)?;
        let out = TensorInfo::new(
            [in_info.dimensions[0], out_h, out_w, o],
            DataType::UInt8Quantized,
            DataFormat::Nhwc,
            info.output_quant,
        );
        let id = self.push(
            OperationKind::Convolution {
                info,
                weights,
                bias,
            },
            smallvec![input],
            smallvec![out],
        );
        Ok(OperandRef::new(id, 0))
    }

    /// Adds a depthwise convolution. Weights are HWIM `[KH, KW, I, M]`;
    /// output channels are `I * M`.
    pub fn add_depthwise_convolution(
        &mut self,
        input: OperandRef,
        info: ConvInfo,
        weights: WeightsData,
        bias: BiasData,
    ) -> Result<OperandRef, CoreError> {
        let in_info = *self.operand_info(input)?;
        check_weights(&weights, DataFormat::Hwim)?;
        let [kh, kw, i, m] = weights.info.dimensions;
        if i != in_info.dimensions[3] {
            return Err(CoreError::InvalidOperation {
                reason: format!(
                    "depthwise weights expect {} input channels, input has {}",
                    i, in_info.dimensions[3]
                ),
            });
        }
        check_bias(&bias, i * m)?;
        let (out_h, out_w) = conv_output_extent(in_info.dimensions, kh, kw, &info)?;
        let out = TensorInfo::new(
            [in_info.dimensions[0], out_h, out_w, i * m],
            DataType::UInt8Quantized,
            DataFormat::Nhwc,
            info.output_quant,
        );
        let id = self.push(
            OperationKind::DepthwiseConvolution {
                info,
                weights,
                bias,
            },
            smallvec![input],
            smallvec![out],
        );
        Ok(OperandRef::new(id, 0))
    }

    /// Adds a transpose convolution. Weights are HWIO; the output extent is
    /// `stride * (in - 1) + kernel - pad_total` per spatial dimension.
    pub fn add_transpose_convolution(
        &mut self,
        input: OperandRef,
        info: ConvInfo,
        weights: WeightsData,
        bias: BiasData,
    ) -> Result<OperandRef, CoreError> {
        let in_info = *self.operand_info(input)?;
        check_weights(&weights, DataFormat::Hwio)?;
        let [kh, kw, i, o] = weights.info.dimensions;
        if i != in_info.dimensions[3] {
            return Err(CoreError::InvalidOperation {
                reason: format!(
                    "transpose convolution weights expect {} input channels, input has {}",
                    i, in_info.dimensions[3]
                ),
            });
        }
        check_bias(&bias, o)?;
        let [n, h, w, _] = in_info.dimensions;
        let pad = info.padding;
        let full_h = info.stride.y * (h - 1) + kh;
        let full_w = info.stride.x * (w - 1) + kw;
        if full_h <= pad.top + pad.bottom || full_w <= pad.left + pad.right {
            return Err(CoreError::InvalidOperation {
                reason: "transpose convolution padding consumes the whole output".into(),
            });
        }
        let out = TensorInfo::new(
            [
                n,
                full_h - pad.top - pad.bottom,
                full_w - pad.left - pad.right,
                o,
            ],
            DataType::UInt8Quantized,
            DataFormat::Nhwc,
            info.output_quant,
        );
        let id = self.push(
            OperationKind::TransposeConvolution {
                info,
                weights,
                bias,
            },
            smallvec![input],
            smallvec![out],
        );
        Ok(OperandRef::new(id, 0))
    }

    /// Adds a fully-connected layer. Weights are HWIO `[1, 1, N, M]` where
    /// `N` is the flattened input element count.
    pub fn add_fully_connected(
        &mut self,
        input: OperandRef,
        info: FullyConnectedInfo,
        weights: WeightsData,
        bias: BiasData,
    ) -> Result<OperandRef, CoreError> {
        let in_info = *self.operand_info(input)?;
        check_weights(&weights, DataFormat::Hwio)?;
        let [wh, ww, n_in, m] = weights.info.dimensions;
        if wh != 1 || ww != 1 {
            return Err(CoreError::InvalidOperation {
                reason: "fully-connected weights must be 1x1 in the spatial plane".into(),
            });
        }
        let flattened = shape_volume(in_info.dimensions) / in_info.dimensions[0];
        if n_in != flattened {
            return Err(CoreError::InvalidOperation {
                reason: format!(
                    "fully-connected weights expect {} input elements, input flattens to {}",
                    n_in, flattened
                ),
            });
        }
        check_bias(&bias, m)?;
        let out = TensorInfo::new(
            [1, 1, 1, m],
            DataType::UInt8Quantized,
            DataFormat::Nhwc,
            info.output_quant,
        );
        let id = self.push(
            OperationKind::FullyConnected {
                info,
                weights,
                bias,
            },
            smallvec![input],
            smallvec![out],
        );
        Ok(OperandRef::new(id, 0))
    }

    /// Adds a pooling operation.
    pub fn add_pooling(
        &mut self,
        input: OperandRef,
        info: PoolingInfo,
    ) -> Result<OperandRef, CoreError> {
        let in_info = *self.operand_info(input)?;
        if info.stride_x == 0 || info.stride_y == 0 {
            return Err(CoreError::InvalidOperation {
                reason: "pooling stride must be non-zero".into(),
            });
        }
        let [n, h, w, c] = in_info.dimensions;
        let pad = info.padding;
        if h + pad.top + pad.bottom < info.size_y || w + pad.left + pad.right < info.size_x {
            return Err(CoreError::InvalidOperation {
                reason: "pooling kernel larger than the padded input".into(),
            });
        }
        let out_h = (h + pad.top + pad.bottom - info.size_y) / info.stride_y + 1;
        let out_w = (w + pad.left + pad.right - info.size_x) / info.stride_x + 1;
        let out = TensorInfo::new(
            [n, out_h, out_w, c],
            in_info.data_type,
            DataFormat::Nhwc,
            in_info.quantization,
        );
        let id = self.push(
            OperationKind::Pooling { info },
            smallvec![input],
            smallvec![out],
        );
        Ok(OperandRef::new(id, 0))
    }

    /// Adds a relu with quantized clamp bounds. Shape and quantization are
    /// preserved.
    pub fn add_relu(
        &mut self,
        input: OperandRef,
        bounds: ReluBounds,
    ) -> Result<OperandRef, CoreError> {
        let in_info = *self.operand_info(input)?;
        let id = self.push(
            OperationKind::Relu { bounds },
            smallvec![input],
            smallvec![in_info],
        );
        Ok(OperandRef::new(id, 0))
    }

    /// Adds a sigmoid. The output quantization is fixed at `(0, 1/256)`,
    /// covering the function's `[0, 1)` range exactly.
    pub fn add_sigmoid(&mut self, input: OperandRef) -> Result<OperandRef, CoreError> {
        let in_info = *self.operand_info(input)?;
        let out = TensorInfo::new(
            in_info.dimensions,
            in_info.data_type,
            DataFormat::Nhwc,
            QuantizationInfo::new(0, 1.0 / 256.0),
        );
        let id = self.push(OperationKind::Sigmoid, smallvec![input], smallvec![out]);
        Ok(OperandRef::new(id, 0))
    }

    /// Adds a softmax. Output quantization matches sigmoid's `(0, 1/256)`.
    pub fn add_softmax(&mut self, input: OperandRef) -> Result<OperandRef, CoreError> {
        let in_info = *self.operand_info(input)?;
        let out = TensorInfo::new(
            in_info.dimensions,
            in_info.data_type,
            DataFormat::Nhwc,
            QuantizationInfo::new(0, 1.0 / 256.0),
        );
        let id = self.push(OperationKind::Softmax, smallvec![input], smallvec![out]);
        Ok(OperandRef::new(id, 0))
    }

    /// Adds an element-wise addition of two equally-shaped tensors.
    pub fn add_addition(
        &mut self,
        lhs: OperandRef,
        rhs: OperandRef,
        output_quant: QuantizationInfo,
    ) -> Result<OperandRef, CoreError> {
        let lhs_info = *self.operand_info(lhs)?;
        let rhs_info = *self.operand_info(rhs)?;
        if lhs_info.dimensions != rhs_info.dimensions {
            return Err(CoreError::ShapeMismatch {
                expected: lhs_info.dimensions,
                actual: rhs_info.dimensions,
            });
        }
        let out = TensorInfo::new(
            lhs_info.dimensions,
            lhs_info.data_type,
            DataFormat::Nhwc,
            output_quant,
        );
        let id = self.push(
            OperationKind::Addition { output_quant },
            smallvec![lhs, rhs],
            smallvec![out],
        );
        Ok(OperandRef::new(id, 0))
    }

    /// Adds a concatenation along `axis`.
    pub fn add_concatenation(
        &mut self,
        inputs: &[OperandRef],
        axis: u32,
        output_quant: QuantizationInfo,
    ) -> Result<OperandRef, CoreError> {
        if axis >= 4 {
            return Err(CoreError::InvalidAxis { axis });
        }
        let first = *inputs.first().ok_or_else(|| CoreError::InvalidOperation {
            reason: "concatenation requires at least one input".into(),
        })?;
        let first_info = *self.operand_info(first)?;
        let mut out_shape = first_info.dimensions;
        for input in &inputs[1..] {
            let info = *self.operand_info(*input)?;
            for dim in 0..4 {
                if dim != axis as usize && info.dimensions[dim] != first_info.dimensions[dim] {
                    return Err(CoreError::ShapeMismatch {
                        expected: first_info.dimensions,
                        actual: info.dimensions,
                    });
                }
            }
            out_shape[axis as usize] += info.dimensions[axis as usize];
        }
        let out = TensorInfo::new(
            out_shape,
            first_info.data_type,
            DataFormat::Nhwc,
            output_quant,
        );
        let id = self.push(
            OperationKind::Concatenation { axis, output_quant },
            inputs.iter().copied().collect(),
            smallvec![out],
        );
        Ok(OperandRef::new(id, 0))
    }

    /// Adds a split along `axis`. Returns one operand per piece; pieces keep
    /// the input's quantization.
    pub fn add_split(
        &mut self,
        input: OperandRef,
        axis: u32,
        sizes: Vec<u32>,
    ) -> Result<Vec<OperandRef>, CoreError> {
        if axis >= 4 {
            return Err(CoreError::InvalidAxis { axis });
        }
        let in_info = *self.operand_info(input)?;
        let extent = in_info.dimensions[axis as usize];
        let total: u32 = sizes.iter().sum();
        if sizes.is_empty() || total != extent {
            return Err(CoreError::InvalidSplitSizes {
                expected: extent,
                actual: total,
            });
        }
        let outputs: SmallVec<[TensorInfo; 1]> = sizes
            .iter()
            .map(|&size| {
                let mut dims = in_info.dimensions;
                dims[axis as usize] = size;
                TensorInfo::new(dims, in_info.data_type, DataFormat::Nhwc, in_info.quantization)
            })
            .collect();
        let count = outputs.len() as u32;
        let id = self.push(
            OperationKind::Split { axis, sizes },
            smallvec![input],
            outputs,
        );
        Ok((0..count).map(|i| OperandRef::new(id, i)).collect())
    }

    /// Adds a reshape to `shape`. The element count must be preserved.
    pub fn add_reshape(
        &mut self,
        input: OperandRef,
        shape: TensorShape,
    ) -> Result<OperandRef, CoreError> {
        let in_info = *self.operand_info(input)?;
        if shape_volume(shape) != shape_volume(in_info.dimensions) {
            return Err(CoreError::ShapeMismatch {
                expected: in_info.dimensions,
                actual: shape,
            });
        }
        let out = TensorInfo::new(
            shape,
            in_info.data_type,
            DataFormat::Nhwc,
            in_info.quantization,
        );
        let id = self.push(
            OperationKind::Reshape { shape },
            smallvec![input],
            smallvec![out],
        );
        Ok(OperandRef::new(id, 0))
    }

    /// Adds a depth-to-space rearrangement with the given block size.
    pub fn add_depth_to_space(
        &mut self,
        input: OperandRef,
        block_size: u32,
    ) -> Result<OperandRef, CoreError> {
        let in_info = *self.operand_info(input)?;
        let [n, h, w, c] = in_info.dimensions;
        if block_size == 0 || c % (block_size * block_size) != 0 {
            return Err(CoreError::InvalidOperation {
                reason: format!(
                    "depth-to-space block size {} does not divide {} channels",
                    block_size, c
                ),
            });
        }
        let out = TensorInfo::new(
            [n, h * block_size, w * block_size, c / (block_size * block_size)],
            in_info.data_type,
            DataFormat::Nhwc,
            in_info.quantization,
        );
        let id = self.push(
            OperationKind::DepthToSpace { block_size },
            smallvec![input],
            smallvec![out],
        );
        Ok(OperandRef::new(id, 0))
    }

    /// Adds an operation the caller already knows is estimate-only, with
    /// explicitly declared outputs.
    pub fn add_estimate_only(
        &mut self,
        inputs: &[OperandRef],
        output_infos: Vec<TensorInfo>,
        reason: impl Into<String>,
    ) -> Result<Vec<OperandRef>, CoreError> {
        for input in inputs {
            self.check_operand(*input)?;
        }
        let outputs: SmallVec<[TensorInfo; 1]> = output_infos.iter().copied().collect();
        let count = outputs.len() as u32;
        let id = self.push(
            OperationKind::EstimateOnly {
                reason: reason.into(),
                output_infos,
            },
            inputs.iter().copied().collect(),
            outputs,
        );
        Ok((0..count).map(|i| OperandRef::new(id, i)).collect())
    }
}

fn check_weights(weights: &WeightsData, format: DataFormat) -> Result<(), CoreError> {
    if weights.info.format != format {
        return Err(CoreError::InvalidOperation {
            reason: format!(
                "weights must use {:?} layout, got {:?}",
                format, weights.info.format
            ),
        });
    }
    if weights.data.len() != weights.info.size_bytes() {
        return Err(CoreError::DataSizeMismatch {
            expected: weights.info.size_bytes(),
            actual: weights.data.len(),
        });
    }
    Ok(())
}

fn check_bias(bias: &BiasData, channels: u32) -> Result<(), CoreError> {
    if bias.data.len() != channels as usize {
        return Err(CoreError::DataSizeMismatch {
            expected: channels as usize,
            actual: bias.data.len(),
        });
    }
    Ok(())
}

fn conv_output_extent(
    input: TensorShape,
    kh: u32,
    kw: u32,
    info: &ConvInfo,
) -> Result<(u32, u32), CoreError> {
    let [_, h, w, _] = input;
    let pad = info.padding;
    if info.stride.x == 0 || info.stride.y == 0 {
        return Err(CoreError::InvalidOperation {
            reason: "convolution stride must be non-zero".into(),
        });
    }
    if h + pad.top + pad.bottom < kh || w + pad.left + pad.right < kw {
        return Err(CoreError::InvalidOperation {
            reason: "convolution kernel larger than the padded input".into(),
        });
    }
    Ok((
        (h + pad.top + pad.bottom - kh) / info.stride.y + 1,
        (w + pad.left + pad.right - kw) / info.stride.x + 1,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{Padding, PoolingType, Stride};

    fn uint8(shape: TensorShape, format: DataFormat) -> TensorInfo {
        TensorInfo::new(
            shape,
            DataType::UInt8Quantized,
            format,
            QuantizationInfo::new(0, 1.0),
        )
    }

    fn weights(shape: TensorShape, format: DataFormat) -> WeightsData {
        WeightsData {
            info: uint8(shape, format),
            data: vec![0; shape_volume(shape) as usize],
        }
    }

    fn bias(channels: u32) -> BiasData {
        BiasData {
            info: TensorInfo::new(
                [1, 1, 1, channels],
                DataType::Int32Quantized,
                DataFormat::Nhwc,
                QuantizationInfo::new(0, 1.0),
            ),
            data: vec![0; channels as usize],
        }
    }

    #[test]
    fn convolution_infers_output_extent() {
        let mut net = Network::new();
        let input = net.add_input(uint8([1, 8, 8, 16], DataFormat::Nhwc)).unwrap();
        let out = net
            .add_convolution(
                input,
                ConvInfo {
                    padding: Padding::new(1, 1, 1, 1),
                    stride: Stride::default(),
                    output_quant: QuantizationInfo::new(0, 1.0),
                },
                weights([3, 3, 16, 32], DataFormat::Hwio),
                bias(32),
            )
            .unwrap();
        assert_eq!(net.operand_info(out).unwrap().dimensions, [1, 8, 8, 32]);
    }

    #[test]
    fn depthwise_multiplies_channels() {
        let mut net = Network::new();
        let input = net.add_input(uint8([1, 8, 8, 4], DataFormat::Nhwc)).unwrap();
        let out = net
            .add_depthwise_convolution(
                input,
                ConvInfo {
                    padding: Padding::new(1, 1, 1, 1),
                    stride: Stride::default(),
                    output_quant: QuantizationInfo::new(0, 1.0),
                },
                weights([3, 3, 4, 2], DataFormat::Hwim),
                bias(8),
            )
            .unwrap();
        assert_eq!(net.operand_info(out).unwrap().dimensions, [1, 8, 8, 8]);
    }

    #[test]
    fn transpose_convolution_output_extent() {
        let mut net = Network::new();
        let input = net.add_input(uint8([1, 4, 4, 8], DataFormat::Nhwc)).unwrap();
        let out = net
            .add_transpose_convolution(
                input,
                ConvInfo {
                    padding: Padding::new(0, 1, 0, 1),
                    stride: Stride::new(2, 2),
                    output_quant: QuantizationInfo::new(0, 1.0),
                },
                weights([3, 3, 8, 8], DataFormat::Hwio),
                bias(8),
            )
            .unwrap();
        // 2 * (4 - 1) + 3 - 0 - 1 = 8 in both spatial dimensions.
        assert_eq!(net.operand_info(out).unwrap().dimensions, [1, 8, 8, 8]);
    }

    #[test]
    fn split_sizes_must_tile_the_axis() {
        let mut net = Network::new();
        let input = net.add_input(uint8([1, 8, 8, 16], DataFormat::Nhwc)).unwrap();
        let err = net.add_split(input, 3, vec![8, 4]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidSplitSizes {
                expected: 16,
                actual: 12
            }
        ));
        let outs = net.add_split(input, 3, vec![8, 8]).unwrap();
        assert_eq!(outs.len(), 2);
        assert_eq!(net.operand_info(outs[1]).unwrap().dimensions, [1, 8, 8, 8]);
    }

    #[test]
    fn reshape_preserves_element_count() {
        let mut net = Network::new();
        let input = net.add_input(uint8([1, 8, 8, 16], DataFormat::Nhwc)).unwrap();
        assert!(net.add_reshape(input, [1, 4, 4, 16]).is_err());
        let out = net.add_reshape(input, [1, 1, 64, 16]).unwrap();
        assert_eq!(net.operand_info(out).unwrap().dimensions, [1, 1, 64, 16]);
    }

    #[test]
    fn consumer_counts_track_fanout() {
        let mut net = Network::new();
        let input = net.add_input(uint8([1, 8, 8, 16], DataFormat::Nhwc)).unwrap();
        assert_eq!(net.consumer_count(input), 0);
        net.add_relu(input, ReluBounds::new(0, 255)).unwrap();
        net.add_sigmoid(input).unwrap();
        assert_eq!(net.consumer_count(input), 2);
    }

    #[test]
    fn mean_pooling_reduces_to_one_pixel() {
        let mut net = Network::new();
        let input = net.add_input(uint8([1, 8, 8, 16], DataFormat::Nhwc)).unwrap();
        let out = net
            .add_pooling(
                input,
                PoolingInfo::new(8, 8, 8, 8, Padding::ZERO, PoolingType::Avg),
            )
            .unwrap();
        assert_eq!(net.operand_info(out).unwrap().dimensions, [1, 1, 1, 16]);
    }

    #[test]
    fn depth_to_space_divides_channels() {
        let mut net = Network::new();
        let input = net.add_input(uint8([1, 4, 4, 4], DataFormat::Nhwc)).unwrap();
        let out = net.add_depth_to_space(input, 2).unwrap();
        assert_eq!(net.operand_info(out).unwrap().dimensions, [1, 8, 8, 1]);
        let other = net.add_input(uint8([1, 4, 4, 6], DataFormat::Nhwc)).unwrap();
        assert!(net.add_depth_to_space(other, 2).is_err());
    }
}
