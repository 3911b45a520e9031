//! Boundary checks run once per call before any worker starts.
//!
//! The row workers index without re-checking, so every shape relation they
//! rely on is verified here. Checks take shapes rather than arrays so the CPU
//! and CUDA entry points share them.

use crate::{padded_width, sorf::num_repeats, Result, RfError, SORF_LAYERS};
use ndarray::{ArrayView, Dimension};

/// Borrows the data of `array` as one row-major slice.
pub fn contiguous<'a, T, D: Dimension>(array: &ArrayView<'a, T, D>, name: &str) -> Result<&'a [T]> {
    array
        .to_slice()
        .ok_or_else(|| RfError::NonContiguous(name.to_string()))
}

pub fn threads(num_threads: usize) -> Result<()> {
    if num_threads == 0 {
        return Err(RfError::invalid("num_threads", num_threads, "must be at least 1"));
    }
    Ok(())
}

/// Width of the transformed axis: a power of two, at least 2.
pub fn transform_width(width: usize) -> Result<()> {
    if width < crate::MIN_TRANSFORM_WIDTH || !width.is_power_of_two() {
        return Err(RfError::invalid(
            "width",
            width,
            "last input axis must be a power of two >= 2",
        ));
    }
    Ok(())
}

/// `(N, 1, C)` input of the non-convolution families. Returns `(N, C)`.
pub fn sorf_input(shape: &[usize]) -> Result<(usize, usize)> {
    match shape {
        [_, 1, _] => {}
        [rows, _, width] => return Err(RfError::mismatch("input", &[*rows, 1, *width], shape)),
        _ => return Err(RfError::mismatch("input", &[0, 1, 0], shape)),
    }
    transform_width(shape[2])?;
    Ok((shape[0], shape[2]))
}

/// `(layers, 1, M * width)` Rademacher stack. Returns the row length.
pub fn radem(shape: &[usize], width: usize, layers: usize) -> Result<usize> {
    if shape.len() != 3 || shape[0] != layers || shape[1] != 1 {
        let row_len = shape.last().copied().unwrap_or(0);
        return Err(RfError::mismatch("radem", &[layers, 1, row_len], shape));
    }
    let row_len = shape[2];
    if row_len == 0 || row_len % width != 0 {
        return Err(RfError::invalid(
            "radem",
            row_len,
            &format!("feature axis must be a non-zero multiple of the transform width {width}"),
        ));
    }
    Ok(row_len)
}

/// Rademacher values must be exactly +1 or -1.
pub fn radem_values(values: &[i8]) -> Result<()> {
    match values.iter().find(|&&v| v != 1 && v != -1) {
        Some(&v) => Err(RfError::invalid("radem", v, "entries must be +1 or -1")),
        None => Ok(()),
    }
}

/// Number of frequencies must be positive and fit in the Rademacher row.
pub fn num_freqs(num_freqs: usize, radem_row_len: usize, width: usize) -> Result<()> {
    if num_freqs == 0 {
        return Err(RfError::invalid("chi", num_freqs, "at least one frequency is required"));
    }
    if num_freqs > radem_row_len || num_repeats(num_freqs, width) * width > radem_row_len {
        return Err(RfError::invalid(
            "chi",
            num_freqs,
            &format!("exceeds radem feature axis of {radem_row_len}"),
        ));
    }
    Ok(())
}

/// Full check for the `(N, 1, C)` families. Returns `(N, C)`.
pub fn sorf_call(
    input_shape: &[usize],
    radem_shape: &[usize],
    radem_data: &[i8],
    chi_len: usize,
    layers: usize,
    num_threads: usize,
) -> Result<(usize, usize)> {
    threads(num_threads)?;
    let (rows, width) = sorf_input(input_shape)?;
    let row_len = radem(radem_shape, width, layers)?;
    radem_values(radem_data)?;
    num_freqs(chi_len, row_len, width)?;
    Ok((rows, width))
}

pub fn finite(parameter: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(RfError::invalid(parameter, value, "must be finite"));
    }
    Ok(())
}

pub fn kernel_order(order: u32) -> Result<()> {
    if order > 2 {
        return Err(RfError::invalid("kernel_order", order, "supported orders are 0, 1 and 2"));
    }
    Ok(())
}

/// Polynomial degree; returns the number of Rademacher layers it needs.
pub fn degree(degree: usize) -> Result<usize> {
    if degree == 0 {
        return Err(RfError::invalid("degree", degree, "must be at least 1"));
    }
    Ok(degree * SORF_LAYERS)
}

/// `(N, seq_len, dim)` convolution input with per-sample lengths.
pub fn conv_input(shape: &[usize], conv_width: usize, seqlengths: &[i32]) -> Result<()> {
    let &[rows, seq_len, dim] = shape else {
        return Err(RfError::mismatch("input", &[seqlengths.len(), 0, 0], shape));
    };
    if dim == 0 {
        return Err(RfError::invalid("input", dim, "feature dimension must be non-zero"));
    }
    if conv_width == 0 || conv_width > seq_len {
        return Err(RfError::invalid(
            "conv_width",
            conv_width,
            &format!("must be in 1..={seq_len}"),
        ));
    }
    if seqlengths.len() != rows {
        return Err(RfError::mismatch("seqlengths", &[rows], &[seqlengths.len()]));
    }
    for &length in seqlengths {
        if length < conv_width as i32 || length as usize > seq_len {
            return Err(RfError::invalid(
                "seqlengths",
                length,
                &format!("must be in {conv_width}..={seq_len}"),
            ));
        }
    }
    Ok(())
}

/// `(N, nodes, dim)` ARD input against `(num_freqs, dim)` weights.
pub fn ard_input(input_shape: &[usize], weights_shape: &[usize]) -> Result<(usize, usize)> {
    if input_shape.len() != 3 || input_shape[1] == 0 || input_shape[2] == 0 {
        return Err(RfError::invalid(
            "input",
            format!("{input_shape:?}"),
            "expected (samples, nodes, dim) with non-zero nodes and dim",
        ));
    }
    let dim = input_shape[2];
    if weights_shape.len() != 2 || weights_shape[1] != dim || weights_shape[0] == 0 {
        let num_freqs = weights_shape.first().copied().unwrap_or(0);
        return Err(RfError::mismatch("weights", &[num_freqs, dim], weights_shape));
    }
    Ok((input_shape[1], dim))
}

/// Lengthscale map and values, one entry per input dimension.
pub fn sigma_map(
    sigma_map: &[i32],
    sigma_vals: &[f64],
    dim: usize,
    num_lengthscales: usize,
) -> Result<()> {
    if sigma_map.len() != dim {
        return Err(RfError::mismatch("sigma_map", &[dim], &[sigma_map.len()]));
    }
    if sigma_vals.len() != dim {
        return Err(RfError::mismatch("sigma_vals", &[dim], &[sigma_vals.len()]));
    }
    if num_lengthscales == 0 {
        return Err(RfError::invalid("num_lengthscales", num_lengthscales, "must be at least 1"));
    }
    if let Some(&group) = sigma_map
        .iter()
        .find(|&&group| group < 0 || group as usize >= num_lengthscales)
    {
        return Err(RfError::invalid(
            "sigma_map",
            group,
            &format!("group index must be in 0..{num_lengthscales}"),
        ));
    }
    for &value in sigma_vals {
        finite("sigma_vals", value)?;
    }
    Ok(())
}

/// Stack used to precompute ARD weights for `dim`-wide inputs.
/// Returns the transform width.
pub fn ard_weights(
    radem_shape: &[usize],
    radem_data: &[i8],
    chi_len: usize,
    dim: usize,
) -> Result<usize> {
    if dim == 0 {
        return Err(RfError::invalid("dim", dim, "must be non-zero"));
    }
    let width = padded_width(dim);
    let row_len = radem(radem_shape, width, SORF_LAYERS)?;
    radem_values(radem_data)?;
    num_freqs(chi_len, row_len, width)?;
    Ok(width)
}
