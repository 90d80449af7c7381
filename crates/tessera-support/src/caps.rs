//! The hardware-capability oracle seam.
//!
//! The conversion pass needs two facts about the target: the brick-group
//! shape (the alignment unit of the NHWCB layout) and the channel count a
//! strided convolution's interleaved sub-maps occupy. Both come through
//! [`HwCapabilities`] so the pass stays independent of any one hardware
//! configuration.

use tessera_core::ops::Stride;
use tessera_core::tensor::TensorShape;

/// Queries answered by the hardware description.
pub trait HwCapabilities {
    /// Shape of one brick group, `(1, BH, BW, BC)`.
    fn brick_group_shape(&self) -> TensorShape;

    /// Channel count of the interleaved tensor a strided convolution reads:
    /// each of the `SX * SY` sub-maps contributes its own channel range.
    fn num_submap_channels(&self, channels: u32, stride: Stride) -> u32;
}

/// A representative configuration: 8x8x16 brick groups, sub-maps packed
/// densely.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCapabilities;

impl HwCapabilities for DefaultCapabilities {
    fn brick_group_shape(&self) -> TensorShape {
        [1, 8, 8, 16]
    }

    fn num_submap_channels(&self, channels: u32, stride: Stride) -> u32 {
        channels * stride.x * stride.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_brick_group_is_8x8x16() {
        assert_eq!(DefaultCapabilities.brick_group_shape(), [1, 8, 8, 16]);
    }

    #[test]
    fn submap_channels_scale_with_stride() {
        assert_eq!(
            DefaultCapabilities.num_submap_channels(16, Stride::new(2, 2)),
            64
        );
        assert_eq!(
            DefaultCapabilities.num_submap_channels(3, Stride::new(2, 2)),
            12
        );
    }
}
