//! Max-pool convolution features.
//!
//! Feature `f` of a sample is the maximum of `chi[f] * z_f` over its valid
//! windows, optionally minus the mean over the same windows. No cos/sin pair
//! and no output scaling.

use super::{
    conv::{fill_windows, ConvShape},
    MaxPoolParams, Pooling,
};
use crate::{
    error::try_zeroed,
    sorf::{self, SorfDiagonals},
    Result, RfFloat,
};

/// `output` is `(rows, chi.len())`.
pub fn maxpool_rows<T: RfFloat>(
    input: &[T],
    shape: &ConvShape,
    seqlengths: &[i32],
    diagonals: &SorfDiagonals,
    chi: &[T],
    params: &MaxPoolParams,
    output: &mut [f64],
) -> Result<()> {
    let num_features = chi.len();
    let width = shape.width;
    let mut windows = try_zeroed(shape.window_buffer_len(), T::default())?;
    let mut transformed = try_zeroed(shape.window_buffer_len(), T::default())?;
    let mut column_sums = match params.pooling {
        Pooling::Max => Vec::new(),
        Pooling::MaxMinusMean => try_zeroed(width, 0.0f64)?,
    };
    let neutral = match params.pooling {
        Pooling::Max => 0.0,
        Pooling::MaxMinusMean => f64::NEG_INFINITY,
    };

    for (row, sample) in input.chunks_exact(shape.sample_len()).enumerate() {
        let valid = shape.valid_windows(seqlengths[row]);
        fill_windows(sample, &mut windows, shape, valid);
        let out_row = &mut output[row * num_features..(row + 1) * num_features];
        out_row.fill(neutral);

        for repeat in 0..sorf::num_repeats(num_features, width) {
            sorf::sorf_block(
                &windows[..valid * width],
                &mut transformed[..valid * width],
                diagonals,
                0,
                repeat,
                width,
            );
            let first = repeat * width;
            let active = width.min(num_features - first);
            column_sums.fill(0.0);

            for window in transformed[..valid * width].chunks_exact(width) {
                for (j, &z) in window[..active].iter().enumerate() {
                    let f = first + j;
                    let value = z.as_f64() * chi[f].as_f64();
                    if value > out_row[f] {
                        out_row[f] = value;
                    }
                    if let Some(sum) = column_sums.get_mut(j) {
                        *sum += value;
                    }
                }
            }

            if params.pooling == Pooling::MaxMinusMean {
                let inv_windows = 1.0 / valid as f64;
                for (j, sum) in column_sums[..active].iter().enumerate() {
                    out_row[first + j] -= sum * inv_windows;
                }
            }
        }
    }
    Ok(())
}
