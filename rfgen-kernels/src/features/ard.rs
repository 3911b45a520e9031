//! RBF features with per-dimension lengthscales (ARD).
//!
//! The three transforms are replaced by an explicit `(num_freqs, dim)` weight
//! matrix so that each input dimension can carry its own lengthscale. For a
//! sample row `x` and frequency `f` the projection is
//! `s = sum_m sigma[m] * x[m] * W[f, m]`, and the derivative w.r.t. lengthscale
//! group `l` is `sum_{m : map[m] = l} x[m] * W[f, m]`.
//!
//! Samples may hold several rows (graph nodes). Every row contributes its own
//! cos/sin and its own chain-rule term before the sums are scaled.

use super::{feature_scale, scale_in_place, ArdParams};
use crate::{
    error::try_zeroed,
    padded_width,
    sorf::{self, SorfDiagonals},
    Result, RfFloat,
};

/// Builds the `(chi.len(), input_dim)` weight matrix equivalent to running SORF
/// over `input_dim`-long rows zero padded to `padded_width(input_dim)`.
pub fn precompute_weights<T: RfFloat>(
    diagonals: &SorfDiagonals,
    chi: &[T],
    input_dim: usize,
) -> Result<Vec<T>> {
    let num_freqs = chi.len();
    let width = padded_width(input_dim);
    let mut identity = try_zeroed(input_dim * width, T::default())?;
    for m in 0..input_dim {
        identity[m * width + m] = T::one();
    }
    let mut transformed = try_zeroed(input_dim * width, T::default())?;
    let mut weights = try_zeroed(num_freqs * input_dim, T::default())?;

    for repeat in 0..sorf::num_repeats(num_freqs, width) {
        sorf::sorf_block(&identity, &mut transformed, diagonals, 0, repeat, width);
        let first = repeat * width;
        let active = width.min(num_freqs - first);
        for (m, basis_row) in transformed.chunks_exact(width).enumerate() {
            for (j, &z) in basis_row[..active].iter().enumerate() {
                let f = first + j;
                weights[f * input_dim + m] = z * chi[f];
            }
        }
    }
    Ok(weights)
}

/// Input is `(rows, nodes, dim)`; `output` is `(rows, 2 * num_freqs)` and
/// `gradient` is `(rows, 2 * num_freqs, num_lengthscales)`.
#[allow(clippy::too_many_arguments)]
pub fn ard_rows<T: RfFloat>(
    input: &[T],
    nodes: usize,
    dim: usize,
    weights: &[T],
    sigma_map: &[i32],
    sigma_vals: &[f64],
    params: &ArdParams,
    output: &mut [f64],
    mut gradient: Option<&mut [f64]>,
) -> Result<()> {
    let num_freqs = weights.len() / dim;
    let num_lscales = params.num_lengthscales;
    let out_row_len = 2 * num_freqs;
    let grad_row_len = out_row_len * num_lscales;
    let mut partial = try_zeroed(num_lscales, 0.0f64)?;

    for (row, sample) in input.chunks_exact(nodes * dim).enumerate() {
        let out_row = &mut output[row * out_row_len..(row + 1) * out_row_len];
        out_row.fill(0.0);
        let mut grad_row = gradient
            .as_deref_mut()
            .map(|grad| &mut grad[row * grad_row_len..(row + 1) * grad_row_len]);
        if let Some(grad_row) = grad_row.as_deref_mut() {
            grad_row.fill(0.0);
        }

        for (f, weight_row) in weights.chunks_exact(dim).enumerate() {
            for node in sample.chunks_exact(dim) {
                partial.fill(0.0);
                let mut projected = 0.0;
                for m in 0..dim {
                    let dot = node[m].as_f64() * weight_row[m].as_f64();
                    partial[sigma_map[m] as usize] += dot;
                    projected += sigma_vals[m] * dot;
                }
                let (sin_val, cos_val) = projected.sin_cos();
                out_row[2 * f] += cos_val;
                out_row[2 * f + 1] += sin_val;

                if let Some(grad_row) = grad_row.as_deref_mut() {
                    let cos_grad = &mut grad_row[2 * f * num_lscales..(2 * f + 1) * num_lscales];
                    for (g, &p) in cos_grad.iter_mut().zip(partial.iter()) {
                        *g -= sin_val * p;
                    }
                    let sin_grad =
                        &mut grad_row[(2 * f + 1) * num_lscales..(2 * f + 2) * num_lscales];
                    for (g, &p) in sin_grad.iter_mut().zip(partial.iter()) {
                        *g += cos_val * p;
                    }
                }
            }
        }

        let scale = feature_scale(params.beta, num_freqs);
        scale_in_place(out_row, scale);
        if let Some(grad_row) = grad_row {
            scale_in_place(grad_row, scale);
        }
    }
    Ok(())
}
