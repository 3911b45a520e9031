//! RBF random Fourier features and their derivative w.r.t. a single lengthscale.
//!
//! For SORF output `z` and chi value `c`, frequency `f` produces
//! `cos(sigma * c * z)` in column `2f` and `sin(sigma * c * z)` in column
//! `2f + 1`. The gradient array receives `-c z sin(.)` and `c z cos(.)`.

use super::{feature_scale, scale_in_place, RbfParams};
use crate::{
    error::try_zeroed,
    sorf::{self, SorfDiagonals},
    Result, RfFloat,
};

/// Processes `input.len() / width` samples laid out as `(rows, 1, width)`.
///
/// `output` is `(rows, 2 * chi.len())`; `gradient`, when given, has the same
/// shape (a single lengthscale group).
pub fn rbf_rows<T: RfFloat>(
    input: &[T],
    width: usize,
    diagonals: &SorfDiagonals,
    chi: &[T],
    params: &RbfParams,
    output: &mut [f64],
    mut gradient: Option<&mut [f64]>,
) -> Result<()> {
    let num_freqs = chi.len();
    let out_row_len = 2 * num_freqs;
    let mut scratch = try_zeroed(input.len(), T::default())?;

    for repeat in 0..sorf::num_repeats(num_freqs, width) {
        sorf::sorf_block(input, &mut scratch, diagonals, 0, repeat, width);
        let first = repeat * width;
        let active = width.min(num_freqs - first);

        for (row, transformed) in scratch.chunks_exact(width).enumerate() {
            let out_row = &mut output[row * out_row_len..(row + 1) * out_row_len];
            for (j, &z) in transformed[..active].iter().enumerate() {
                let f = first + j;
                let projected = z.as_f64() * chi[f].as_f64();
                let (sin_val, cos_val) = (params.sigma * projected).sin_cos();
                out_row[2 * f] = cos_val;
                out_row[2 * f + 1] = sin_val;
            }
            if let Some(grad) = gradient.as_deref_mut() {
                let grad_row = &mut grad[row * out_row_len..(row + 1) * out_row_len];
                for (j, &z) in transformed[..active].iter().enumerate() {
                    let f = first + j;
                    let projected = z.as_f64() * chi[f].as_f64();
                    let (sin_val, cos_val) = (params.sigma * projected).sin_cos();
                    grad_row[2 * f] = -projected * sin_val;
                    grad_row[2 * f + 1] = projected * cos_val;
                }
            }
        }
    }

    let scale = feature_scale(params.beta, num_freqs);
    scale_in_place(output, scale);
    if let Some(grad) = gradient {
        scale_in_place(grad, scale);
    }
    Ok(())
}
