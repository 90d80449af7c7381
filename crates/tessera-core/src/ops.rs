//! Source operation vocabulary.
//!
//! [`OperationKind`] is the tagged-variant universe of high-level operations
//! a network can contain. Kind-specific parameters live in small structs
//! (`ConvInfo`, `PoolingInfo`, ...) so the conversion pass can match on the
//! discriminant and destructure what it needs.
//!
//! Weights and biases are carried *inline* on the convolution-family kinds
//! (the network also supports free-standing [`OperationKind::Constant`]
//! operations, which lower to constant nodes). Inline weight buffers are
//! borrowed by the conversion pass for the duration of one rewrite only.

use serde::{Deserialize, Serialize};

use crate::tensor::{DataFormat, QuantizationInfo, TensorInfo, TensorShape};

/// Convolution stride: `x` steps along width, `y` along height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stride {
    pub x: u32,
    pub y: u32,
}

impl Stride {
    pub fn new(x: u32, y: u32) -> Self {
        Stride { x, y }
    }
}

impl Default for Stride {
    fn default() -> Self {
        Stride { x: 1, y: 1 }
    }
}

/// Spatial padding applied around the height/width plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Padding {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Padding {
    pub const ZERO: Padding = Padding {
        top: 0,
        bottom: 0,
        left: 0,
        right: 0,
    };

    pub fn new(top: u32, bottom: u32, left: u32, right: u32) -> Self {
        Padding {
            top,
            bottom,
            left,
            right,
        }
    }
}

/// Parameters common to the convolution family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvInfo {
    pub padding: Padding,
    pub stride: Stride,
    pub output_quant: QuantizationInfo,
}

/// Parameters for fully-connected layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FullyConnectedInfo {
    pub output_quant: QuantizationInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolingType {
    Avg,
    Max,
}

/// Pooling parameters.
///
/// Derives `Eq`: the conversion pass dispatches pooling by structural
/// equality against candidate configurations (with selected fields
/// substituted from the incoming info).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolingInfo {
    /// Kernel height.
    pub size_y: u32,
    /// Kernel width.
    pub size_x: u32,
    pub stride_y: u32,
    pub stride_x: u32,
    pub padding: Padding,
    pub pooling_type: PoolingType,
}

impl PoolingInfo {
    pub fn new(
        size_y: u32,
        size_x: u32,
        stride_y: u32,
        stride_x: u32,
        padding: Padding,
        pooling_type: PoolingType,
    ) -> Self {
        PoolingInfo {
            size_y,
            size_x,
            stride_y,
            stride_x,
            padding,
            pooling_type,
        }
    }
}

/// Quantized clamp bounds for relu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReluBounds {
    pub lower: i16,
    pub upper: i16,
}

impl ReluBounds {
    pub fn new(lower: i16, upper: i16) -> Self {
        ReluBounds { lower, upper }
    }
}

/// An owned weight tensor: descriptor plus raw bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsData {
    pub info: TensorInfo,
    pub data: Vec<u8>,
}

/// An owned bias tensor: descriptor plus 32-bit quantized values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasData {
    pub info: TensorInfo,
    pub data: Vec<i32>,
}

/// The high-level operations a source network can contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationKind {
    /// A network input with its declared external tensor description.
    Input { info: TensorInfo },
    /// A network output with its declared external layout.
    Output { format: DataFormat },
    /// A free-standing constant tensor.
    Constant { info: TensorInfo, data: Vec<u8> },
    Convolution {
        info: ConvInfo,
        weights: WeightsData,
        bias: BiasData,
    },
    DepthwiseConvolution {
        info: ConvInfo,
        weights: WeightsData,
        bias: BiasData,
    },
    TransposeConvolution {
        info: ConvInfo,
        weights: WeightsData,
        bias: BiasData,
    },
    FullyConnected {
        info: FullyConnectedInfo,
        weights: WeightsData,
        bias: BiasData,
    },
    Pooling { info: PoolingInfo },
    Relu { bounds: ReluBounds },
    Sigmoid,
    Softmax,
    Addition { output_quant: QuantizationInfo },
    Concatenation {
        axis: u32,
        output_quant: QuantizationInfo,
    },
    Split { axis: u32, sizes: Vec<u32> },
    Reshape { shape: TensorShape },
    DepthToSpace { block_size: u32 },
    /// A placeholder operation the caller already knows is estimate-only.
    EstimateOnly {
        reason: String,
        output_infos: Vec<TensorInfo>,
    },
}

impl OperationKind {
    /// Short name of the operation kind, for logging and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Input { .. } => "Input",
            OperationKind::Output { .. } => "Output",
            OperationKind::Constant { .. } => "Constant",
            OperationKind::Convolution { .. } => "Convolution",
            OperationKind::DepthwiseConvolution { .. } => "DepthwiseConvolution",
            OperationKind::TransposeConvolution { .. } => "TransposeConvolution",
            OperationKind::FullyConnected { .. } => "FullyConnected",
            OperationKind::Pooling { .. } => "Pooling",
            OperationKind::Relu { .. } => "Relu",
            OperationKind::Sigmoid => "Sigmoid",
            OperationKind::Softmax => "Softmax",
            OperationKind::Addition { .. } => "Addition",
            OperationKind::Concatenation { .. } => "Concatenation",
            OperationKind::Split { .. } => "Split",
            OperationKind::Reshape { .. } => "Reshape",
            OperationKind::DepthToSpace { .. } => "DepthToSpace",
            OperationKind::EstimateOnly { .. } => "EstimateOnly",
        }
    }

    /// Returns `true` for the kinds whose lowering never consults the
    /// support oracle (graph plumbing rather than computation).
    pub fn is_trivial(&self) -> bool {
        matches!(
            self,
            OperationKind::Input { .. }
                | OperationKind::Output { .. }
                | OperationKind::Constant { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooling_info_equality_is_structural() {
        let a = PoolingInfo::new(2, 2, 2, 2, Padding::ZERO, PoolingType::Max);
        let b = PoolingInfo::new(2, 2, 2, 2, Padding::ZERO, PoolingType::Max);
        let c = PoolingInfo::new(2, 2, 2, 2, Padding::new(1, 0, 1, 0), PoolingType::Max);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn trivial_kinds_skip_the_oracle() {
        assert!(!OperationKind::Sigmoid.is_trivial());
        assert!(OperationKind::Output {
            format: DataFormat::Nhwc
        }
        .is_trivial());
    }

    #[test]
    fn serde_roundtrip_kind() {
        let kind = OperationKind::Split {
            axis: 3,
            sizes: vec![3, 5],
        };
        let json = serde_json::to_string(&kind).unwrap();
        let back: OperationKind = serde_json::from_str(&json).unwrap();
        assert_eq!(kind, back);
    }
}
