//! ArcCosine features: `max(c z, 0)^order`, forward pass only.

use super::{feature_scale, scale_in_place, ArcCosParams};
use crate::{
    error::try_zeroed,
    sorf::{self, SorfDiagonals},
    Result, RfFloat,
};

/// Rectified power used by the ArcCosine family. Order 0 is the step function.
#[inline]
pub fn rectified_power(value: f64, kernel_order: u32) -> f64 {
    if value <= 0.0 {
        0.0
    } else if kernel_order == 0 {
        1.0
    } else {
        value.powi(kernel_order as i32)
    }
}

/// `output` is `(rows, chi.len())`.
pub fn arccos_rows<T: RfFloat>(
    input: &[T],
    width: usize,
    diagonals: &SorfDiagonals,
    chi: &[T],
    params: &ArcCosParams,
    output: &mut [f64],
) -> Result<()> {
    let num_freqs = chi.len();
    let mut scratch = try_zeroed(input.len(), T::default())?;

    for repeat in 0..sorf::num_repeats(num_freqs, width) {
        sorf::sorf_block(input, &mut scratch, diagonals, 0, repeat, width);
        let first = repeat * width;
        let active = width.min(num_freqs - first);

        for (transformed, out_row) in scratch
            .chunks_exact(width)
            .zip(output.chunks_exact_mut(num_freqs))
        {
            for (j, &z) in transformed[..active].iter().enumerate() {
                let f = first + j;
                out_row[f] = rectified_power(z.as_f64() * chi[f].as_f64(), params.kernel_order);
            }
        }
    }

    scale_in_place(output, feature_scale(params.beta, num_freqs));
    Ok(())
}
