//! Structured orthogonal random features: `H D3 H D2 H D1 x`.

use crate::{diagonal, fht::TwoTierPlan, RfFloat, SORF_LAYERS};

/// Borrowed `(layers, 1, row_len)` Rademacher stack, flattened row-major.
#[derive(Debug, Clone, Copy)]
pub struct SorfDiagonals<'a> {
    data: &'a [i8],
    row_len: usize,
}

impl<'a> SorfDiagonals<'a> {
    /// `data.len()` must be a multiple of `row_len`.
    pub fn new(data: &'a [i8], row_len: usize) -> Self {
        Self { data, row_len }
    }

    pub fn row_len(&self) -> usize {
        self.row_len
    }

    pub fn num_layers(&self) -> usize {
        if self.row_len == 0 {
            0
        } else {
            self.data.len() / self.row_len
        }
    }

    pub fn layer(&self, index: usize) -> &'a [i8] {
        &self.data[index * self.row_len..(index + 1) * self.row_len]
    }

    pub fn as_slice(&self) -> &'a [i8] {
        self.data
    }
}

/// Number of `width`-sized blocks needed to produce `num_features` outputs.
pub fn num_repeats(num_features: usize, width: usize) -> usize {
    (num_features + width - 1) / width
}

/// Runs one SORF block: `dst = H D3 H D2 H D1 src` for every `width`-long row.
///
/// `D1..D3` are layers `layer_start..layer_start + 3` of `diagonals`,
/// restricted to columns `[repeat * width, (repeat + 1) * width)`.
/// `src` is left untouched; `dst` must have the same length.
pub fn sorf_block<T: RfFloat>(
    src: &[T],
    dst: &mut [T],
    diagonals: &SorfDiagonals,
    layer_start: usize,
    repeat: usize,
    width: usize,
) {
    let plan = TwoTierPlan::for_cpu(width);
    let start_position = repeat * width;
    diagonal::conv_multiply_and_copy(
        src,
        dst,
        diagonals.layer(layer_start),
        width,
        start_position,
    );
    transform_with(&plan, dst);
    for layer in 1..SORF_LAYERS {
        diagonal::conv_multiply(dst, diagonals.layer(layer_start + layer), width, start_position);
        transform_with(&plan, dst);
    }
}

/// In-place variant of [`sorf_block`].
pub fn sorf_block_in_place<T: RfFloat>(
    data: &mut [T],
    diagonals: &SorfDiagonals,
    layer_start: usize,
    repeat: usize,
    width: usize,
) {
    let plan = TwoTierPlan::for_cpu(width);
    let start_position = repeat * width;
    for layer in 0..SORF_LAYERS {
        diagonal::conv_multiply(data, diagonals.layer(layer_start + layer), width, start_position);
        transform_with(&plan, data);
    }
}

#[inline]
fn transform_with<T: RfFloat>(plan: &TwoTierPlan, data: &mut [T]) {
    for row in data.chunks_exact_mut(plan.width) {
        plan.apply(row);
    }
}
