//! Multiplication by diagonal Rademacher matrices.
//!
//! Every routine also applies the Hadamard normalization constant
//! `2^(-log2(C) / 2)`, so a (diagonal, transform) pair is orthonormal.
//! Callers guarantee that buffer lengths are multiples of the row widths.

use crate::RfFloat;

/// `1 / sqrt(width)` computed as `2^(-log2(width) / 2)`.
pub fn norm_constant<T: RfFloat>(width: usize) -> T {
    let exponent = (width as f64).log2() / 2.0;
    T::from_f64(1.0 / 2f64.powf(exponent))
}

#[inline(always)]
fn scaled_sign<T: RfFloat>(sign: i8, norm: T) -> T {
    T::from_sign(sign) * norm
}

/// `(n, C)` array times `diag(radem)`, where `radem` has length `C`.
pub fn multiply_2d<T: RfFloat>(data: &mut [T], radem: &[i8]) {
    let width = radem.len();
    let norm = norm_constant::<T>(width);
    for row in data.chunks_exact_mut(width) {
        for (x, &sign) in row.iter_mut().zip(radem) {
            *x *= scaled_sign(sign, norm);
        }
    }
}

/// `(n, d, C)` array times a `(d, C)` stack of diagonals: element `(i, j, k)`
/// is scaled by `radem[j, k]`.
pub fn multiply_3d<T: RfFloat>(data: &mut [T], radem: &[i8], width: usize) {
    let norm = norm_constant::<T>(width);
    for sample in data.chunks_exact_mut(radem.len()) {
        for (x, &sign) in sample.iter_mut().zip(radem) {
            *x *= scaled_sign(sign, norm);
        }
    }
}

/// Same as [`multiply_3d`] but writes into `dst`, leaving `src` untouched.
pub fn multiply_and_copy<T: RfFloat>(src: &[T], dst: &mut [T], radem: &[i8], width: usize) {
    let norm = norm_constant::<T>(width);
    for (src_sample, dst_sample) in src
        .chunks_exact(radem.len())
        .zip(dst.chunks_exact_mut(radem.len()))
    {
        for ((out, &x), &sign) in dst_sample.iter_mut().zip(src_sample).zip(radem) {
            *out = x * scaled_sign(sign, norm);
        }
    }
}

/// Scales every `width`-long row by `radem[start_position .. start_position + width]`.
///
/// `radem` is a Rademacher row tiled with stride `width` across several
/// feature blocks; `start_position` selects the active block.
pub fn conv_multiply<T: RfFloat>(data: &mut [T], radem: &[i8], width: usize, start_position: usize) {
    let norm = norm_constant::<T>(width);
    let block = &radem[start_position..start_position + width];
    for row in data.chunks_exact_mut(width) {
        for (x, &sign) in row.iter_mut().zip(block) {
            *x *= scaled_sign(sign, norm);
        }
    }
}

/// Same as [`conv_multiply`] but writes into `dst`, leaving `src` untouched.
pub fn conv_multiply_and_copy<T: RfFloat>(
    src: &[T],
    dst: &mut [T],
    radem: &[i8],
    width: usize,
    start_position: usize,
) {
    let norm = norm_constant::<T>(width);
    let block = &radem[start_position..start_position + width];
    for (src_row, dst_row) in src.chunks_exact(width).zip(dst.chunks_exact_mut(width)) {
        for ((out, &x), &sign) in dst_row.iter_mut().zip(src_row).zip(block) {
            *out = x * scaled_sign(sign, norm);
        }
    }
}
