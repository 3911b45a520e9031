//! 1-D convolution RBF features over variable-length sequences.
//!
//! Each sample is a `(seq_len, dim)` sequence. Window `p` holds rows
//! `p .. p + conv_width` flattened and zero padded to the transform width.
//! Only the first `seqlen - conv_width + 1` windows of a sample are valid;
//! cos/sin values are summed over those windows.

use super::{feature_scale, scale_in_place, ConvRbfParams};
use crate::{
    error::try_zeroed,
    sorf::{self, SorfDiagonals},
    Result, RfFloat,
};

/// Geometry of a batch of sequences fed to a convolution generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvShape {
    pub seq_len: usize,
    pub dim: usize,
    pub conv_width: usize,
    /// Transform width: a power of two no smaller than `conv_width * dim`.
    pub width: usize,
}

impl ConvShape {
    pub fn new(seq_len: usize, dim: usize, conv_width: usize) -> Self {
        Self {
            seq_len,
            dim,
            conv_width,
            width: crate::padded_width(conv_width * dim),
        }
    }

    /// Window capacity of a full-length sequence.
    pub fn max_windows(&self) -> usize {
        self.seq_len + 1 - self.conv_width
    }

    pub fn window_len(&self) -> usize {
        self.conv_width * self.dim
    }

    pub fn sample_len(&self) -> usize {
        self.seq_len * self.dim
    }

    /// Valid window count for a sequence of length `seqlen`.
    pub fn valid_windows(&self, seqlen: i32) -> usize {
        seqlen as usize + 1 - self.conv_width
    }

    /// Scratch elements needed to hold every window of one sample.
    pub fn window_buffer_len(&self) -> usize {
        self.max_windows() * self.width
    }
}

/// Copies the first `valid` windows of `sample` into `windows`.
///
/// Padding columns of `windows` are never written, so a zeroed buffer can be
/// reused across samples.
pub fn fill_windows<T: RfFloat>(sample: &[T], windows: &mut [T], shape: &ConvShape, valid: usize) {
    let window_len = shape.window_len();
    for (p, window) in windows.chunks_exact_mut(shape.width).take(valid).enumerate() {
        let start = p * shape.dim;
        window[..window_len].copy_from_slice(&sample[start..start + window_len]);
    }
}

/// `output` is `(rows, 2 * chi.len())`, `gradient` likewise.
#[allow(clippy::too_many_arguments)]
pub fn conv_rbf_rows<T: RfFloat>(
    input: &[T],
    shape: &ConvShape,
    seqlengths: &[i32],
    diagonals: &SorfDiagonals,
    chi: &[T],
    params: &ConvRbfParams,
    output: &mut [f64],
    mut gradient: Option<&mut [f64]>,
) -> Result<()> {
    let num_freqs = chi.len();
    let out_row_len = 2 * num_freqs;
    let width = shape.width;
    let mut windows = try_zeroed(shape.window_buffer_len(), T::default())?;
    let mut transformed = try_zeroed(shape.window_buffer_len(), T::default())?;
    let scale = feature_scale(params.beta, num_freqs);

    for (row, sample) in input.chunks_exact(shape.sample_len()).enumerate() {
        let valid = shape.valid_windows(seqlengths[row]);
        fill_windows(sample, &mut windows, shape, valid);
        let out_row = &mut output[row * out_row_len..(row + 1) * out_row_len];
        out_row.fill(0.0);
        let mut grad_row = gradient
            .as_deref_mut()
            .map(|grad| &mut grad[row * out_row_len..(row + 1) * out_row_len]);
        if let Some(grad_row) = grad_row.as_deref_mut() {
            grad_row.fill(0.0);
        }

        for repeat in 0..sorf::num_repeats(num_freqs, width) {
            sorf::sorf_block(
                &windows[..valid * width],
                &mut transformed[..valid * width],
                diagonals,
                0,
                repeat,
                width,
            );
            let first = repeat * width;
            let active = width.min(num_freqs - first);

            for window in transformed[..valid * width].chunks_exact(width) {
                for (j, &z) in window[..active].iter().enumerate() {
                    let f = first + j;
                    let projected = z.as_f64() * chi[f].as_f64();
                    let (sin_val, cos_val) = (params.sigma * projected).sin_cos();
                    out_row[2 * f] += cos_val;
                    out_row[2 * f + 1] += sin_val;
                    if let Some(grad_row) = grad_row.as_deref_mut() {
                        grad_row[2 * f] -= projected * sin_val;
                        grad_row[2 * f + 1] += projected * cos_val;
                    }
                }
            }
        }

        let row_scale = scale * params.averaging.factor(valid);
        scale_in_place(out_row, row_scale);
        if let Some(grad_row) = grad_row {
            scale_in_place(grad_row, row_scale);
        }
    }
    Ok(())
}
