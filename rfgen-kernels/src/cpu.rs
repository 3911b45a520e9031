//! Row-partitioned CPU dispatch.
//!
//! Every driver splits the `N` samples into contiguous ranges of
//! `ceil(N / threads)` rows and runs the matching `features::*_rows` worker on
//! each range inside a rayon pool built for the call. Inputs are assumed to be
//! validated; see [`crate::validation`].

use crate::{
    features::{
        arccos::arccos_rows,
        ard::ard_rows,
        conv::{conv_rbf_rows, ConvShape},
        maxpool::maxpool_rows,
        poly::poly_rows,
        rbf::rbf_rows,
        ArcCosParams, ArdParams, ConvRbfParams, MaxPoolParams, PolyParams, RbfParams,
    },
    sorf::SorfDiagonals,
    Result, RfError, RfFloat,
};
use rayon::prelude::*;
use std::{
    any::Any,
    ops::Range,
    panic::{self, AssertUnwindSafe},
};
use tracing::{debug, trace};

/// Output (and optional gradient) rows owned by one worker.
pub struct RowChunk<'a> {
    pub rows: Range<usize>,
    pub output: &'a mut [f64],
    pub gradient: Option<&'a mut [f64]>,
}

/// Splits `num_rows` rows across at most `num_threads` workers and waits for
/// all of them. The first worker error (or panic) fails the whole call.
pub fn run_partitioned<F>(
    num_threads: usize,
    num_rows: usize,
    output: &mut [f64],
    out_row_len: usize,
    gradient: Option<&mut [f64]>,
    grad_row_len: usize,
    worker: F,
) -> Result<()>
where
    F: Fn(RowChunk) -> Result<()> + Sync,
{
    if num_rows == 0 || out_row_len == 0 {
        return Ok(());
    }
    let threads = num_threads.clamp(1, num_rows);
    let chunk_rows = (num_rows + threads - 1) / threads;
    debug!(num_rows, threads, chunk_rows, "dispatching cpu workers");

    let mut grad_chunks = gradient.map(|grad| grad.chunks_mut(chunk_rows * grad_row_len.max(1)));
    let chunks: Vec<RowChunk> = output
        .chunks_mut(chunk_rows * out_row_len)
        .enumerate()
        .map(|(i, output)| {
            let start = i * chunk_rows;
            RowChunk {
                rows: start..(start + chunk_rows).min(num_rows),
                output,
                gradient: grad_chunks.as_mut().and_then(|chunks| chunks.next()),
            }
        })
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| RfError::ThreadPool(e.to_string()))?;

    pool.install(|| {
        chunks.into_par_iter().try_for_each(|chunk| {
            trace!(start = chunk.rows.start, end = chunk.rows.end, "worker started");
            match panic::catch_unwind(AssertUnwindSafe(|| worker(chunk))) {
                Ok(result) => result,
                Err(payload) => Err(RfError::WorkerPanicked(panic_message(payload.as_ref()))),
            }
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[inline]
fn rows_of<'a, T>(data: &'a [T], rows: &Range<usize>, row_len: usize) -> &'a [T] {
    &data[rows.start * row_len..rows.end * row_len]
}

/// RBF features of `(N, 1, width)` input into `(N, 2 * chi.len())` output.
pub fn rbf_features<T: RfFloat>(
    input: &[T],
    width: usize,
    diagonals: &SorfDiagonals,
    chi: &[T],
    params: &RbfParams,
    num_threads: usize,
    output: &mut [f64],
) -> Result<()> {
    let out_row_len = 2 * chi.len();
    run_partitioned(
        num_threads,
        input.len() / width,
        output,
        out_row_len,
        None,
        0,
        |chunk| {
            rbf_rows(
                rows_of(input, &chunk.rows, width),
                width,
                diagonals,
                chi,
                params,
                chunk.output,
                None,
            )
        },
    )
}

/// RBF features plus their derivative w.r.t. the lengthscale.
#[allow(clippy::too_many_arguments)]
pub fn rbf_gradient<T: RfFloat>(
    input: &[T],
    width: usize,
    diagonals: &SorfDiagonals,
    chi: &[T],
    params: &RbfParams,
    num_threads: usize,
    output: &mut [f64],
    gradient: &mut [f64],
) -> Result<()> {
    let out_row_len = 2 * chi.len();
    run_partitioned(
        num_threads,
        input.len() / width,
        output,
        out_row_len,
        Some(gradient),
        out_row_len,
        |chunk| {
            rbf_rows(
                rows_of(input, &chunk.rows, width),
                width,
                diagonals,
                chi,
                params,
                chunk.output,
                chunk.gradient,
            )
        },
    )
}

pub fn arccos_features<T: RfFloat>(
    input: &[T],
    width: usize,
    diagonals: &SorfDiagonals,
    chi: &[T],
    params: &ArcCosParams,
    num_threads: usize,
    output: &mut [f64],
) -> Result<()> {
    run_partitioned(
        num_threads,
        input.len() / width,
        output,
        chi.len(),
        None,
        0,
        |chunk| {
            arccos_rows(
                rows_of(input, &chunk.rows, width),
                width,
                diagonals,
                chi,
                params,
                chunk.output,
            )
        },
    )
}

/// `chi` is `(degree, num_freqs)`; `output` is `(N, num_freqs)`.
pub fn poly_features<T: RfFloat>(
    input: &[T],
    width: usize,
    diagonals: &SorfDiagonals,
    chi: &[T],
    params: &PolyParams,
    num_threads: usize,
    output: &mut [f64],
) -> Result<()> {
    run_partitioned(
        num_threads,
        input.len() / width,
        output,
        chi.len() / params.degree,
        None,
        0,
        |chunk| {
            poly_rows(
                rows_of(input, &chunk.rows, width),
                width,
                diagonals,
                chi,
                params,
                chunk.output,
            )
        },
    )
}

#[allow(clippy::too_many_arguments)]
pub fn conv_rbf_features<T: RfFloat>(
    input: &[T],
    shape: &ConvShape,
    seqlengths: &[i32],
    diagonals: &SorfDiagonals,
    chi: &[T],
    params: &ConvRbfParams,
    num_threads: usize,
    output: &mut [f64],
) -> Result<()> {
    run_partitioned(
        num_threads,
        seqlengths.len(),
        output,
        2 * chi.len(),
        None,
        0,
        |chunk| {
            conv_rbf_rows(
                rows_of(input, &chunk.rows, shape.sample_len()),
                shape,
                &seqlengths[chunk.rows.clone()],
                diagonals,
                chi,
                params,
                chunk.output,
                None,
            )
        },
    )
}

#[allow(clippy::too_many_arguments)]
pub fn conv_rbf_gradient<T: RfFloat>(
    input: &[T],
    shape: &ConvShape,
    seqlengths: &[i32],
    diagonals: &SorfDiagonals,
    chi: &[T],
    params: &ConvRbfParams,
    num_threads: usize,
    output: &mut [f64],
    gradient: &mut [f64],
) -> Result<()> {
    let out_row_len = 2 * chi.len();
    run_partitioned(
        num_threads,
        seqlengths.len(),
        output,
        out_row_len,
        Some(gradient),
        out_row_len,
        |chunk| {
            conv_rbf_rows(
                rows_of(input, &chunk.rows, shape.sample_len()),
                shape,
                &seqlengths[chunk.rows.clone()],
                diagonals,
                chi,
                params,
                chunk.output,
                chunk.gradient,
            )
        },
    )
}

#[allow(clippy::too_many_arguments)]
pub fn maxpool_features<T: RfFloat>(
    input: &[T],
    shape: &ConvShape,
    seqlengths: &[i32],
    diagonals: &SorfDiagonals,
    chi: &[T],
    params: &MaxPoolParams,
    num_threads: usize,
    output: &mut [f64],
) -> Result<()> {
    run_partitioned(
        num_threads,
        seqlengths.len(),
        output,
        chi.len(),
        None,
        0,
        |chunk| {
            maxpool_rows(
                rows_of(input, &chunk.rows, shape.sample_len()),
                shape,
                &seqlengths[chunk.rows.clone()],
                diagonals,
                chi,
                params,
                chunk.output,
            )
        },
    )
}

/// ARD features of `(N, nodes, dim)` input using `(num_freqs, dim)` weights.
#[allow(clippy::too_many_arguments)]
pub fn ard_features<T: RfFloat>(
    input: &[T],
    nodes: usize,
    dim: usize,
    weights: &[T],
    sigma_map: &[i32],
    sigma_vals: &[f64],
    params: &ArdParams,
    num_threads: usize,
    output: &mut [f64],
) -> Result<()> {
    let sample_len = nodes * dim;
    run_partitioned(
        num_threads,
        input.len() / sample_len,
        output,
        2 * (weights.len() / dim),
        None,
        0,
        |chunk| {
            ard_rows(
                rows_of(input, &chunk.rows, sample_len),
                nodes,
                dim,
                weights,
                sigma_map,
                sigma_vals,
                params,
                chunk.output,
                None,
            )
        },
    )
}

/// ARD features plus the `(N, 2 * num_freqs, num_lengthscales)` gradient.
#[allow(clippy::too_many_arguments)]
pub fn ard_gradient<T: RfFloat>(
    input: &[T],
    nodes: usize,
    dim: usize,
    weights: &[T],
    sigma_map: &[i32],
    sigma_vals: &[f64],
    params: &ArdParams,
    num_threads: usize,
    output: &mut [f64],
    gradient: &mut [f64],
) -> Result<()> {
    let sample_len = nodes * dim;
    let out_row_len = 2 * (weights.len() / dim);
    run_partitioned(
        num_threads,
        input.len() / sample_len,
        output,
        out_row_len,
        Some(gradient),
        out_row_len * params.num_lengthscales,
        |chunk| {
            ard_rows(
                rows_of(input, &chunk.rows, sample_len),
                nodes,
                dim,
                weights,
                sigma_map,
                sigma_vals,
                params,
                chunk.output,
                chunk.gradient,
            )
        },
    )
}
