//! Brick-format packing arithmetic for fully-connected layers.
//!
//! A fully-connected input is logically 1-D, but the hardware reads it in
//! brick format: 4x4 patches, gathered into brick groups of shape
//! `(1, BH, BW, BC)`. [`linear_brick_shape`] computes the smallest 4-D
//! shape whose brick-format layout exactly covers `N` logical elements, so
//! downstream DMA sees the data contiguously.
//!
//! The weight encoder additionally requires fully-connected input channels
//! in multiples of 1024; [`pad_fully_connected_weights`] extends the weight
//! tensor with the weights' own zero-point.

use tessera_core::ops::WeightsData;
use tessera_core::tensor::{div_round_up, round_up_to_multiple, TensorShape};

/// Elements in one 4x4 patch.
const PATCH_ELEMENTS: u32 = 16;

/// Input-channel granularity required by the weight encoder for
/// fully-connected operation.
const FC_CHANNEL_ALIGNMENT: u32 = 1024;

/// Packs `elements` logical values into the smallest 4-D shape covering
/// them in brick-group-major order.
///
/// Height and width stay at a single patch (4) until the patch count spills
/// past what one column / one brick can hold, then grow to the full brick
/// extent; everything beyond one brick group accumulates in the channel
/// dimension.
pub fn linear_brick_shape(brick_group: TensorShape, elements: u32) -> TensorShape {
    let [_, bh, bw, bc] = brick_group;
    let num_patches = div_round_up(elements, PATCH_ELEMENTS);
    let w = if num_patches <= bc * (bh / 4) { 4 } else { bw };
    let h = if num_patches <= bc { 4 } else { bh };
    let patches_per_group = (bh / 4) * (bw / 4) * bc;
    let c = bc * (num_patches / patches_per_group)
        + u32::min(bc, num_patches % patches_per_group);
    [1, h, w, c]
}

/// Number of elements the brick-format layout of `shape` holds: every
/// spatial extent is occupied in whole patches.
pub fn brick_capacity(shape: TensorShape) -> u32 {
    let [n, h, w, c] = shape;
    n * round_up_to_multiple(h, 4) * round_up_to_multiple(w, 4) * c
}

/// Pads fully-connected weights (HWIO, `[1, 1, I, O]`) so the input-channel
/// extent is a multiple of 1024. Pad rows are filled with the weights'
/// zero-point, so they decode to zero contribution.
pub fn pad_fully_connected_weights(weights: &WeightsData) -> WeightsData {
    let [h, w, i, o] = weights.info.dimensions;
    debug_assert_eq!((h, w), (1, 1), "fully-connected weights are 1x1");
    let padded_i = round_up_to_multiple(i, FC_CHANNEL_ALIGNMENT);
    if padded_i == i {
        return weights.clone();
    }
    let pad_byte = weights.info.quantization.zero_point as u8;
    let mut data = weights.data.clone();
    // HWIO is row-major: one row of O bytes per input channel. Appending
    // whole rows keeps existing elements in place.
    data.resize((padded_i * o) as usize, pad_byte);
    let mut info = weights.info;
    info.dimensions = [1, 1, padded_i, o];
    WeightsData { info, data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tessera_core::tensor::{DataFormat, DataType, QuantizationInfo, TensorInfo};

    const BRICK_GROUP: TensorShape = [1, 8, 8, 16];

    #[test]
    fn single_patch_packs_into_one_channel() {
        assert_eq!(linear_brick_shape(BRICK_GROUP, 16), [1, 4, 4, 1]);
    }

    #[test]
    fn one_brick_of_channels_stays_4x4() {
        // 256 elements = 16 patches = one 4x4 patch per brick channel.
        assert_eq!(linear_brick_shape(BRICK_GROUP, 256), [1, 4, 4, 16]);
    }

    #[test]
    fn spilling_the_channel_extent_grows_height_first() {
        // 32 patches: more than BC (16), still within one brick column.
        assert_eq!(linear_brick_shape(BRICK_GROUP, 512), [1, 8, 4, 16]);
    }

    #[test]
    fn full_brick_group_packs_exactly() {
        assert_eq!(linear_brick_shape(BRICK_GROUP, 1024), [1, 8, 8, 16]);
    }

    #[test]
    fn beyond_one_group_accumulates_channels() {
        // 1024 + 16: one full group plus one extra patch.
        assert_eq!(linear_brick_shape(BRICK_GROUP, 1040), [1, 8, 8, 17]);
    }

    #[test]
    fn partial_patch_still_occupies_one() {
        assert_eq!(linear_brick_shape(BRICK_GROUP, 100), [1, 4, 4, 7]);
    }

    #[test]
    fn fc_weights_pad_with_zero_point() {
        let weights = WeightsData {
            info: TensorInfo::new(
                [1, 1, 256, 10],
                DataType::UInt8Quantized,
                DataFormat::Hwio,
                QuantizationInfo::new(3, 0.5),
            ),
            data: vec![7; 2560],
        };
        let padded = pad_fully_connected_weights(&weights);
        assert_eq!(padded.info.dimensions, [1, 1, 1024, 10]);
        assert_eq!(padded.data.len(), 10240);
        assert!(padded.data[..2560].iter().all(|&b| b == 7));
        assert!(padded.data[2560..].iter().all(|&b| b == 3));
    }

    #[test]
    fn fc_weights_already_aligned_are_untouched() {
        let weights = WeightsData {
            info: TensorInfo::new(
                [1, 1, 1024, 4],
                DataType::UInt8Quantized,
                DataFormat::Hwio,
                QuantizationInfo::new(0, 0.5),
            ),
            data: vec![1; 4096],
        };
        let padded = pad_fully_connected_weights(&weights);
        assert_eq!(padded, weights);
    }

    proptest! {
        /// The packed shape always covers the requested element count.
        #[test]
        fn packed_shape_covers_all_elements(elements in 1u32..100_000) {
            let shape = linear_brick_shape(BRICK_GROUP, elements);
            prop_assert!(brick_capacity(shape) >= elements);
        }

        /// Slack is bounded by one brick group: the shape never allocates a
        /// whole spare group.
        #[test]
        fn packed_shape_slack_is_below_one_group(elements in 1u32..100_000) {
            let shape = linear_brick_shape(BRICK_GROUP, elements);
            let group = brick_capacity(BRICK_GROUP);
            prop_assert!(brick_capacity(shape) < elements + group);
        }

        /// Whole multiples of a brick group pack exactly.
        #[test]
        fn whole_groups_pack_exactly(groups in 1u32..64) {
            let elements = groups * brick_capacity(BRICK_GROUP);
            let shape = linear_brick_shape(BRICK_GROUP, elements);
            prop_assert_eq!(brick_capacity(shape), elements);
        }

        /// Spatial extents never exceed the brick group's.
        #[test]
        fn packed_shape_fits_brick_extents(elements in 1u32..100_000) {
            let shape = linear_brick_shape(BRICK_GROUP, elements);
            prop_assert!(shape[1] == 4 || shape[1] == BRICK_GROUP[1]);
            prop_assert!(shape[2] == 4 || shape[2] == BRICK_GROUP[2]);
        }
    }
}
