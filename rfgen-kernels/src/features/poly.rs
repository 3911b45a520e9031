//! Polynomial features: product over degrees of independent SORF projections.
//!
//! Degree `d` uses Rademacher layers `3d .. 3d + 3` and chi row `d`.

use super::{feature_scale, scale_in_place, PolyParams};
use crate::{
    error::try_zeroed,
    sorf::{self, SorfDiagonals},
    Result, RfFloat, SORF_LAYERS,
};

/// `chi` is `(degree, num_freqs)` row-major; `output` is `(rows, num_freqs)`.
pub fn poly_rows<T: RfFloat>(
    input: &[T],
    width: usize,
    diagonals: &SorfDiagonals,
    chi: &[T],
    params: &PolyParams,
    output: &mut [f64],
) -> Result<()> {
    let num_freqs = chi.len() / params.degree;
    let mut scratch = try_zeroed(input.len(), T::default())?;

    for repeat in 0..sorf::num_repeats(num_freqs, width) {
        let first = repeat * width;
        let active = width.min(num_freqs - first);

        for degree in 0..params.degree {
            sorf::sorf_block(
                input,
                &mut scratch,
                diagonals,
                degree * SORF_LAYERS,
                repeat,
                width,
            );
            let chi_row = &chi[degree * num_freqs..(degree + 1) * num_freqs];

            for (transformed, out_row) in scratch
                .chunks_exact(width)
                .zip(output.chunks_exact_mut(num_freqs))
            {
                for (j, &z) in transformed[..active].iter().enumerate() {
                    let f = first + j;
                    let projected = z.as_f64() * chi_row[f].as_f64();
                    if degree == 0 {
                        out_row[f] = projected;
                    } else {
                        out_row[f] *= projected;
                    }
                }
            }
        }
    }

    scale_in_place(output, feature_scale(params.beta, num_freqs));
    Ok(())
}
