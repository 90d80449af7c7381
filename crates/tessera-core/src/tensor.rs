//! Tensor descriptors shared by the source network and the lowered graph.
//!
//! Shapes are fixed-rank 4-vectors in NHWC order. Quantization is uniform
//! affine (zero point + scale). [`DataFormat`] tags the *external* layout of
//! a tensor: NHWC and NHWCB for activations, HWIO and HWIM for weights
//! (per-output vs per-multiplier indexing).

use serde::{Deserialize, Serialize};

/// A tensor shape in NHWC order: batch, height, width, channels.
pub type TensorShape = [u32; 4];

/// Number of elements described by a shape.
pub fn shape_volume(shape: TensorShape) -> u32 {
    shape[0] * shape[1] * shape[2] * shape[3]
}

/// Integer ceiling division.
pub fn div_round_up(value: u32, divisor: u32) -> u32 {
    (value + divisor - 1) / divisor
}

/// Rounds `value` up to the nearest multiple of `multiple`.
pub fn round_up_to_multiple(value: u32, multiple: u32) -> u32 {
    div_round_up(value, multiple) * multiple
}

/// Element types representable on the target.
///
/// Activations are 8-bit quantized; biases are 32-bit quantized (the scale
/// of a bias is the product of the input and weight scales).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    UInt8Quantized,
    Int32Quantized,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DataType::UInt8Quantized => 1,
            DataType::Int32Quantized => 4,
        }
    }
}

/// External tensor layouts.
///
/// NHWC is the canonical interchange layout. NHWCB is the hardware brick
/// layout (tensors tiled into brick groups, 4x4 patches within each brick).
/// HWIO and HWIM are weight layouts: HWIO indexes the trailing dimension by
/// output channel, HWIM by channel multiplier (depthwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFormat {
    Nhwc,
    Nhwcb,
    Hwio,
    Hwim,
}

/// Uniform affine quantization: `real = scale * (stored - zero_point)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationInfo {
    pub zero_point: i32,
    pub scale: f32,
}

impl QuantizationInfo {
    pub fn new(zero_point: i32, scale: f32) -> Self {
        QuantizationInfo { zero_point, scale }
    }
}

impl Default for QuantizationInfo {
    fn default() -> Self {
        QuantizationInfo {
            zero_point: 0,
            scale: 1.0,
        }
    }
}

/// Full description of a tensor: extent, element type, layout, quantization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensorInfo {
    pub dimensions: TensorShape,
    pub data_type: DataType,
    pub format: DataFormat,
    pub quantization: QuantizationInfo,
}

impl TensorInfo {
    pub fn new(
        dimensions: TensorShape,
        data_type: DataType,
        format: DataFormat,
        quantization: QuantizationInfo,
    ) -> Self {
        TensorInfo {
            dimensions,
            data_type,
            format,
            quantization,
        }
    }

    /// Number of elements in the tensor.
    pub fn num_elements(&self) -> u32 {
        shape_volume(self.dimensions)
    }

    /// Size of the raw data in bytes.
    pub fn size_bytes(&self) -> usize {
        self.num_elements() as usize * self.data_type.size_bytes()
    }
}
