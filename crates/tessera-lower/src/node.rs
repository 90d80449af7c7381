//! The lowered node universe: one variant per hardware-executable primitive.
//!
//! Every node carries a common envelope -- output shape, output
//! quantization, output layout, and the provenance set of source-operation
//! ids that created it -- plus a [`LoweredKind`] payload. The kinds map
//! one-to-one onto what the target can run: MCE operations (the
//! multiply/convolve engine), PLE operations (the programmable layer
//! engine, fused or standalone), layout conversions, metadata-only
//! reinterprets, sub-tensor extraction, requantization, and the graph
//! endpoints (inputs, outputs, constants).

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use tessera_core::id::{OperandRef, OperationId};
use tessera_core::ops::{ReluBounds, Stride};
use tessera_core::tensor::{DataFormat, QuantizationInfo, TensorInfo, TensorShape};

/// Layouts a lowered tensor can be materialised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoweredFormat {
    Nhwc,
    Nhwcb,
}

impl LoweredFormat {
    /// Maps an external activation layout onto a lowered layout. Weight
    /// layouts have no lowered counterpart.
    pub fn from_data_format(format: DataFormat) -> Option<LoweredFormat> {
        match format {
            DataFormat::Nhwc => Some(LoweredFormat::Nhwc),
            DataFormat::Nhwcb => Some(LoweredFormat::Nhwcb),
            DataFormat::Hwio | DataFormat::Hwim => None,
        }
    }
}

/// An exact ratio, `num / den`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fraction {
    pub num: u32,
    pub den: u32,
}

impl Fraction {
    pub const ONE: Fraction = Fraction { num: 1, den: 1 };

    pub fn new(num: u32, den: u32) -> Self {
        Fraction { num, den }
    }

    /// Applies the ratio to an extent, rounding up (partial bricks still
    /// occupy a full output row/column).
    pub fn apply(self, value: u32) -> u32 {
        tessera_core::div_round_up(value * self.num, self.den)
    }
}

/// Input-to-output spatial/channel ratio of a PLE operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeMultiplier {
    pub h: Fraction,
    pub w: Fraction,
    pub channels: u32,
}

impl ShapeMultiplier {
    pub const IDENTITY: ShapeMultiplier = ShapeMultiplier {
        h: Fraction::ONE,
        w: Fraction::ONE,
        channels: 1,
    };

    pub fn apply(self, shape: TensorShape) -> TensorShape {
        [
            shape[0],
            self.h.apply(shape[1]),
            self.w.apply(shape[2]),
            shape[3] * self.channels,
        ]
    }
}

/// Kernels the programmable layer engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PleOp {
    MeanXy8x8,
    AvgPool3x3_1_1_Udma,
    MaxPool2x2_2_2,
    MaxPool3x3_2_2,
    Sigmoid,
    Addition,
    AdditionRescale,
    Interleave2x2_2_2,
}

/// Operating modes of the multiply/convolve engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MceOp {
    Convolution,
    DepthwiseConvolution,
    FullyConnected,
}

/// Full description of one MCE pass. The node owns its (possibly
/// transformed) weight and bias buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MceData {
    pub op: MceOp,
    pub input_shape: TensorShape,
    pub weights_info: TensorInfo,
    pub weights: Vec<u8>,
    pub bias_info: TensorInfo,
    pub bias: Vec<i32>,
    pub stride: Stride,
    /// Zero-insertion ratio applied to input rows/columns (transpose
    /// convolution); 1 everywhere else.
    pub upscale_factor: u32,
    pub pad_top: u32,
    pub pad_left: u32,
}

/// Payload of a lowered node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoweredKind {
    Input { info: TensorInfo },
    /// A network output. Identifies which source operand it publishes so
    /// downstream consumers can match outputs to producing operations.
    Output { operand: OperandRef },
    Constant { info: TensorInfo, data: Vec<u8> },
    /// Materialises the node's layout from whatever the producer holds.
    FormatConversion,
    /// Metadata-only shape/layout re-tag; no data movement.
    Reinterpret,
    /// Copies a window of the producer starting at `offset`.
    ExtractSubtensor { offset: TensorShape },
    Concat { axis: u32 },
    Requantize,
    /// Clamp fused after the producing MCE pass (relu bounds).
    McePostProcess { bounds: ReluBounds },
    Mce(Box<MceData>),
    /// A PLE kernel fused after an MCE pass in the same hardware pass.
    FusePle {
        op: PleOp,
        shape_multiplier: ShapeMultiplier,
    },
    /// A PLE kernel reading DRAM directly.
    StandalonePle { op: PleOp },
    /// Placeholder preserving only shape/quant/layout for estimation.
    EstimateOnly,
}

/// A node in the lowered graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoweredNode {
    pub shape: TensorShape,
    pub quant: QuantizationInfo,
    pub format: LoweredFormat,
    /// Source-operation ids this node was lowered from. Never empty.
    pub sources: SmallVec<[OperationId; 2]>,
    pub kind: LoweredKind,
}

impl LoweredNode {
    pub fn new(
        kind: LoweredKind,
        shape: TensorShape,
        quant: QuantizationInfo,
        format: LoweredFormat,
        source: OperationId,
    ) -> Self {
        LoweredNode {
            shape,
            quant,
            format,
            sources: smallvec![source],
            kind,
        }
    }

    /// Short name of the node kind, for logging and validation messages.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            LoweredKind::Input { .. } => "Input",
            LoweredKind::Output { .. } => "Output",
            LoweredKind::Constant { .. } => "Constant",
            LoweredKind::FormatConversion => "FormatConversion",
            LoweredKind::Reinterpret => "Reinterpret",
            LoweredKind::ExtractSubtensor { .. } => "ExtractSubtensor",
            LoweredKind::Concat { .. } => "Concat",
            LoweredKind::Requantize => "Requantize",
            LoweredKind::McePostProcess { .. } => "McePostProcess",
            LoweredKind::Mce(_) => "Mce",
            LoweredKind::FusePle { .. } => "FusePle",
            LoweredKind::StandalonePle { .. } => "StandalonePle",
            LoweredKind::EstimateOnly => "EstimateOnly",
        }
    }

    /// Returns `true` for kinds that are graph sources (no input edges).
    pub fn is_source(&self) -> bool {
        matches!(
            self.kind,
            LoweredKind::Input { .. } | LoweredKind::Constant { .. }
        )
    }

    /// Returns `true` for kinds that accept any producer layout: layout and
    /// quantization fixups, metadata re-tags, and estimation placeholders.
    pub fn accepts_any_input_format(&self) -> bool {
        matches!(
            self.kind,
            LoweredKind::FormatConversion
                | LoweredKind::Requantize
                | LoweredKind::Reinterpret
                | LoweredKind::EstimateOnly
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_apply_rounds_up() {
        assert_eq!(Fraction::new(1, 2).apply(8), 4);
        assert_eq!(Fraction::new(1, 2).apply(7), 4);
        assert_eq!(Fraction::ONE.apply(5), 5);
    }

    #[test]
    fn shape_multiplier_identity() {
        assert_eq!(ShapeMultiplier::IDENTITY.apply([1, 8, 8, 16]), [1, 8, 8, 16]);
    }

    #[test]
    fn interleave_multiplier_halves_plane_and_quadruples_channels() {
        let m = ShapeMultiplier {
            h: Fraction::new(1, 2),
            w: Fraction::new(1, 2),
            channels: 4,
        };
        assert_eq!(m.apply([1, 8, 8, 16]), [1, 4, 4, 64]);
        assert_eq!(m.apply([1, 7, 7, 16]), [1, 4, 4, 64]);
    }

    #[test]
    fn weight_formats_have_no_lowered_counterpart() {
        assert_eq!(
            LoweredFormat::from_data_format(DataFormat::Nhwc),
            Some(LoweredFormat::Nhwc)
        );
        assert_eq!(LoweredFormat::from_data_format(DataFormat::Hwio), None);
    }

    #[test]
    fn serde_roundtrip_ple_op() {
        for op in [
            PleOp::MeanXy8x8,
            PleOp::AvgPool3x3_1_1_Udma,
            PleOp::MaxPool2x2_2_2,
            PleOp::MaxPool3x3_2_2,
            PleOp::Sigmoid,
            PleOp::Addition,
            PleOp::AdditionRescale,
            PleOp::Interleave2x2_2_2,
        ] {
            let json = serde_json::to_string(&op).unwrap();
            let back: PleOp = serde_json::from_str(&json).unwrap();
            assert_eq!(op, back);
        }
    }
}
