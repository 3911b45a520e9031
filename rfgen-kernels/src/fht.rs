//! Unnormalized fast Walsh-Hadamard transform over power-of-two rows.
//!
//! Stage `h` (1, 2, 4, ...) pairs index `i` with `i + h` whenever
//! `i mod 2h < h` and replaces `(a, b)` with `(a + b, a - b)`. Applying the
//! transform twice multiplies a row by its length. Normalization is folded into
//! the diagonal multiplies (see [`crate::diagonal`]).
//!
//! Transforms are organised as a [`TwoTierPlan`]: all stages narrower than the
//! local width run tile by tile (the tile stays in L1 on the CPU, in shared
//! memory on a GPU), then the remaining wide stages sweep the full row. Every
//! element sees the same additions in the same order under any plan, so the
//! tiering never changes results.

use crate::RfFloat;

/// Local tile width used by the CPU backend (32 KiB of f64).
pub const CPU_LOCAL_WIDTH: usize = 4096;

/// Split of a width-`width` transform into a local and a global tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoTierPlan {
    pub width: usize,
    pub local_width: usize,
}

impl TwoTierPlan {
    /// `fast_capacity` is the largest power-of-two tile the backend can hold in
    /// its fast memory tier. `None` means no fast tier: every stage is global.
    pub fn new(width: usize, fast_capacity: Option<usize>) -> Self {
        let local_width = match fast_capacity {
            Some(capacity) => width.min(prev_power_of_two(capacity.max(1))),
            None => 1,
        };
        Self { width, local_width }
    }

    pub fn for_cpu(width: usize) -> Self {
        Self::new(width, Some(CPU_LOCAL_WIDTH))
    }

    /// True when the whole row fits in the local tier.
    pub fn is_local_only(&self) -> bool {
        self.local_width >= self.width
    }

    /// Butterfly strides handled tile by tile.
    pub fn local_strides(&self) -> impl Iterator<Item = usize> {
        strides(1, self.local_width)
    }

    /// Butterfly strides handled over the full row.
    pub fn global_strides(&self) -> impl Iterator<Item = usize> {
        strides(self.local_width.max(1), self.width)
    }

    /// Transforms one row in place following this plan.
    pub fn apply<T: RfFloat>(&self, row: &mut [T]) {
        debug_assert_eq!(row.len(), self.width);
        if self.local_width > 1 {
            for tile in row.chunks_exact_mut(self.local_width) {
                unrolled_stages(tile);
                for h in strides(8, self.local_width) {
                    butterfly_stage(tile, h);
                }
            }
        }
        for h in self.global_strides() {
            butterfly_stage(row, h);
        }
    }
}

fn strides(start: usize, end: usize) -> impl Iterator<Item = usize> {
    std::iter::successors(Some(start), |h| h.checked_mul(2)).take_while(move |&h| h < end)
}

fn prev_power_of_two(value: usize) -> usize {
    if value.is_power_of_two() {
        value
    } else {
        value.next_power_of_two() >> 1
    }
}

/// Transforms a single power-of-two row in place.
#[inline]
pub fn transform_row<T: RfFloat>(row: &mut [T]) {
    TwoTierPlan::for_cpu(row.len()).apply(row);
}

/// Transforms every `width`-long row of a row-major buffer in place.
///
/// Works for 2-D `(rows, width)` and 3-D `(n, d, width)` arrays alike, since
/// only the last axis is transformed.
pub fn transform_rows<T: RfFloat>(data: &mut [T], width: usize) {
    let plan = TwoTierPlan::for_cpu(width);
    for row in data.chunks_exact_mut(width) {
        plan.apply(row);
    }
}

/// One butterfly stage of stride `h` over `row`.
#[inline]
pub fn butterfly_stage<T: RfFloat>(row: &mut [T], h: usize) {
    for block in row.chunks_exact_mut(h << 1) {
        let (lo, hi) = block.split_at_mut(h);
        for (a, b) in lo.iter_mut().zip(hi.iter_mut()) {
            let y = *b;
            *b = *a - y;
            *a += y;
        }
    }
}

/// Strides 1, 2 and 4, written out. Any stage wider than the row is skipped.
#[inline]
fn unrolled_stages<T: RfFloat>(row: &mut [T]) {
    let width = row.len();
    if width < 2 {
        return;
    }
    for pair in row.chunks_exact_mut(2) {
        let y = pair[1];
        pair[1] = pair[0] - y;
        pair[0] += y;
    }
    if width <= 2 {
        return;
    }
    for quad in row.chunks_exact_mut(4) {
        let y = quad[2];
        quad[2] = quad[0] - y;
        quad[0] += y;
        let y = quad[3];
        quad[3] = quad[1] - y;
        quad[1] += y;
    }
    if width <= 4 {
        return;
    }
    for oct in row.chunks_exact_mut(8) {
        let (lo, hi) = oct.split_at_mut(4);
        let y = hi[0];
        hi[0] = lo[0] - y;
        lo[0] += y;
        let y = hi[1];
        hi[1] = lo[1] - y;
        lo[1] += y;
        let y = hi[2];
        hi[2] = lo[2] - y;
        lo[2] += y;
        let y = hi[3];
        hi[3] = lo[3] - y;
        lo[3] += y;
    }
}
