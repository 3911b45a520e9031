//! Checked CPU entry points over `ndarray` views.
//!
//! Each function validates shapes, values and contiguity, allocates the output
//! arrays and hands flat slices to [`crate::cpu`]. Outputs are always `f64`;
//! transforms run in the input precision.

use crate::{
    cpu, diagonal,
    error::try_zeroed,
    features::{
        ard, conv::ConvShape, ArcCosParams, ArdParams, ConvRbfParams, MaxPoolParams, PolyParams,
        RbfParams,
    },
    fht,
    sorf::SorfDiagonals,
    validation, Result, RfError, RfFloat, SORF_LAYERS,
};
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut, Dimension};

pub(crate) fn output_array(data: Vec<f64>, rows: usize, cols: usize) -> Result<Array2<f64>> {
    Array2::from_shape_vec((rows, cols), data)
        .map_err(|_| RfError::mismatch("output", &[rows, cols], &[]))
}

pub(crate) fn gradient_array(
    data: Vec<f64>,
    rows: usize,
    cols: usize,
    groups: usize,
) -> Result<Array3<f64>> {
    Array3::from_shape_vec((rows, cols, groups), data)
        .map_err(|_| RfError::mismatch("gradient", &[rows, cols, groups], &[]))
}

/// Unnormalized Hadamard transform of every row along the last axis, in place.
pub fn hadamard_transform<T: RfFloat, D: Dimension>(mut data: ArrayViewMut<T, D>) -> Result<()> {
    let width = data.shape().last().copied().unwrap_or(0);
    validation::transform_width(width)?;
    let values = data
        .as_slice_mut()
        .ok_or_else(|| RfError::NonContiguous("data".to_string()))?;
    fht::transform_rows(values, width);
    Ok(())
}

/// Multiplies every row of `(N, D, C)` data by `radem[d, :] * norm_constant(C)`.
pub fn diagonal_multiply<T: RfFloat>(
    mut data: ArrayViewMut<T, ndarray::Ix3>,
    radem: ArrayView2<i8>,
) -> Result<()> {
    let (_, inner, width) = data.dim();
    validation::transform_width(width)?;
    if radem.dim() != (inner, width) {
        return Err(RfError::mismatch("radem", &[inner, width], radem.shape()));
    }
    let signs = validation::contiguous(&radem, "radem")?;
    validation::radem_values(signs)?;
    let values = data
        .as_slice_mut()
        .ok_or_else(|| RfError::NonContiguous("data".to_string()))?;
    diagonal::multiply_3d(values, signs, width);
    Ok(())
}

/// Validated slices of a `(N, 1, C)` call.
pub(crate) struct SorfCall<'a, T> {
    pub rows: usize,
    pub width: usize,
    pub x: &'a [T],
    pub diagonals: SorfDiagonals<'a>,
    pub chi: &'a [T],
}

pub(crate) fn sorf_call<'a, T: RfFloat>(
    input: &ArrayView3<'a, T>,
    radem: &ArrayView3<'a, i8>,
    chi: &ArrayView1<'a, T>,
    layers: usize,
    num_threads: usize,
) -> Result<SorfCall<'a, T>> {
    let signs = validation::contiguous(radem, "radem")?;
    let (rows, width) = validation::sorf_call(
        input.shape(),
        radem.shape(),
        signs,
        chi.len(),
        layers,
        num_threads,
    )?;
    Ok(SorfCall {
        rows,
        width,
        x: validation::contiguous(input, "input")?,
        diagonals: SorfDiagonals::new(signs, radem.shape()[2]),
        chi: validation::contiguous(chi, "chi")?,
    })
}

/// RBF random features: `(N, 1, C)` input to `(N, 2 * chi.len())`.
pub fn rbf_features<'a, T: RfFloat>(
    input: ArrayView3<'a, T>,
    radem: ArrayView3<'a, i8>,
    chi: ArrayView1<'a, T>,
    params: &RbfParams,
    num_threads: usize,
) -> Result<Array2<f64>> {
    validation::finite("sigma", params.sigma)?;
    validation::finite("beta", params.beta)?;
    let call = sorf_call(&input, &radem, &chi, SORF_LAYERS, num_threads)?;
    let cols = 2 * call.chi.len();
    let mut output = try_zeroed(call.rows * cols, 0.0)?;
    cpu::rbf_features(
        call.x,
        call.width,
        &call.diagonals,
        call.chi,
        params,
        num_threads,
        &mut output,
    )?;
    output_array(output, call.rows, cols)
}

/// RBF features and their `(N, 2 * chi.len(), 1)` lengthscale gradient.
pub fn rbf_gradient<'a, T: RfFloat>(
    input: ArrayView3<'a, T>,
    radem: ArrayView3<'a, i8>,
    chi: ArrayView1<'a, T>,
    params: &RbfParams,
    num_threads: usize,
) -> Result<(Array2<f64>, Array3<f64>)> {
    validation::finite("sigma", params.sigma)?;
    validation::finite("beta", params.beta)?;
    let call = sorf_call(&input, &radem, &chi, SORF_LAYERS, num_threads)?;
    let cols = 2 * call.chi.len();
    let mut output = try_zeroed(call.rows * cols, 0.0)?;
    let mut gradient = try_zeroed(call.rows * cols, 0.0)?;
    cpu::rbf_gradient(
        call.x,
        call.width,
        &call.diagonals,
        call.chi,
        params,
        num_threads,
        &mut output,
        &mut gradient,
    )?;
    Ok((
        output_array(output, call.rows, cols)?,
        gradient_array(gradient, call.rows, cols, 1)?,
    ))
}

/// ArcCosine features of order 0, 1 or 2: `(N, 1, C)` to `(N, chi.len())`.
pub fn arccos_features<'a, T: RfFloat>(
    input: ArrayView3<'a, T>,
    radem: ArrayView3<'a, i8>,
    chi: ArrayView1<'a, T>,
    params: &ArcCosParams,
    num_threads: usize,
) -> Result<Array2<f64>> {
    validation::kernel_order(params.kernel_order)?;
    validation::finite("beta", params.beta)?;
    let call = sorf_call(&input, &radem, &chi, SORF_LAYERS, num_threads)?;
    let cols = call.chi.len();
    let mut output = try_zeroed(call.rows * cols, 0.0)?;
    cpu::arccos_features(
        call.x,
        call.width,
        &call.diagonals,
        call.chi,
        params,
        num_threads,
        &mut output,
    )?;
    output_array(output, call.rows, cols)
}

/// Like [`sorf_call`] for a `(3 * degree, 1, M * C)` stack and a
/// `(degree, num_freqs)` chi array. `chi` of the result is the flattened array.
pub(crate) fn poly_call<'a, T: RfFloat>(
    input: &ArrayView3<'a, T>,
    radem: &ArrayView3<'a, i8>,
    chi: &ArrayView2<'a, T>,
    params: &PolyParams,
    num_threads: usize,
) -> Result<SorfCall<'a, T>> {
    let layers = validation::degree(params.degree)?;
    validation::finite("beta", params.beta)?;
    let (degree, num_freqs) = chi.dim();
    if degree != params.degree {
        return Err(RfError::mismatch("chi", &[params.degree, num_freqs], chi.shape()));
    }
    let signs = validation::contiguous(radem, "radem")?;
    let (rows, width) = validation::sorf_call(
        input.shape(),
        radem.shape(),
        signs,
        num_freqs,
        layers,
        num_threads,
    )?;
    Ok(SorfCall {
        rows,
        width,
        x: validation::contiguous(input, "input")?,
        diagonals: SorfDiagonals::new(signs, radem.shape()[2]),
        chi: validation::contiguous(chi, "chi")?,
    })
}

/// Polynomial features. `radem` is `(3 * degree, 1, M * C)` and `chi` is
/// `(degree, num_freqs)`.
pub fn poly_features<'a, T: RfFloat>(
    input: ArrayView3<'a, T>,
    radem: ArrayView3<'a, i8>,
    chi: ArrayView2<'a, T>,
    params: &PolyParams,
    num_threads: usize,
) -> Result<Array2<f64>> {
    let call = poly_call(&input, &radem, &chi, params, num_threads)?;
    let cols = call.chi.len() / params.degree;
    let mut output = try_zeroed(call.rows * cols, 0.0)?;
    cpu::poly_features(
        call.x,
        call.width,
        &call.diagonals,
        call.chi,
        params,
        num_threads,
        &mut output,
    )?;
    output_array(output, call.rows, cols)
}

pub(crate) struct ConvCall<'a, T> {
    pub shape: ConvShape,
    pub x: &'a [T],
    pub seqlengths: &'a [i32],
    pub diagonals: SorfDiagonals<'a>,
    pub chi: &'a [T],
}

pub(crate) fn conv_call<'a, T: RfFloat>(
    input: &ArrayView3<'a, T>,
    seqlengths: &ArrayView1<'a, i32>,
    radem: &ArrayView3<'a, i8>,
    chi: &ArrayView1<'a, T>,
    conv_width: usize,
    num_threads: usize,
) -> Result<ConvCall<'a, T>> {
    validation::threads(num_threads)?;
    let seqlengths = validation::contiguous(seqlengths, "seqlengths")?;
    validation::conv_input(input.shape(), conv_width, seqlengths)?;
    let (_, seq_len, dim) = input.dim();
    let shape = ConvShape::new(seq_len, dim, conv_width);
    let signs = validation::contiguous(radem, "radem")?;
    let row_len = validation::radem(radem.shape(), shape.width, SORF_LAYERS)?;
    validation::radem_values(signs)?;
    validation::num_freqs(chi.len(), row_len, shape.width)?;
    Ok(ConvCall {
        shape,
        x: validation::contiguous(input, "input")?,
        seqlengths,
        diagonals: SorfDiagonals::new(signs, row_len),
        chi: validation::contiguous(chi, "chi")?,
    })
}

/// Convolution RBF features of `(N, seq_len, dim)` sequences.
pub fn conv_rbf_features<'a, T: RfFloat>(
    input: ArrayView3<'a, T>,
    seqlengths: ArrayView1<'a, i32>,
    radem: ArrayView3<'a, i8>,
    chi: ArrayView1<'a, T>,
    params: &ConvRbfParams,
    num_threads: usize,
) -> Result<Array2<f64>> {
    validation::finite("sigma", params.sigma)?;
    validation::finite("beta", params.beta)?;
    let call = conv_call(&input, &seqlengths, &radem, &chi, params.conv_width, num_threads)?;
    let rows = call.seqlengths.len();
    let cols = 2 * call.chi.len();
    let mut output = try_zeroed(rows * cols, 0.0)?;
    cpu::conv_rbf_features(
        call.x,
        &call.shape,
        call.seqlengths,
        &call.diagonals,
        call.chi,
        params,
        num_threads,
        &mut output,
    )?;
    output_array(output, rows, cols)
}

/// Convolution RBF features and their `(N, 2 * chi.len(), 1)` gradient.
pub fn conv_rbf_gradient<'a, T: RfFloat>(
    input: ArrayView3<'a, T>,
    seqlengths: ArrayView1<'a, i32>,
    radem: ArrayView3<'a, i8>,
    chi: ArrayView1<'a, T>,
    params: &ConvRbfParams,
    num_threads: usize,
) -> Result<(Array2<f64>, Array3<f64>)> {
    validation::finite("sigma", params.sigma)?;
    validation::finite("beta", params.beta)?;
    let call = conv_call(&input, &seqlengths, &radem, &chi, params.conv_width, num_threads)?;
    let rows = call.seqlengths.len();
    let cols = 2 * call.chi.len();
    let mut output = try_zeroed(rows * cols, 0.0)?;
    let mut gradient = try_zeroed(rows * cols, 0.0)?;
    cpu::conv_rbf_gradient(
        call.x,
        &call.shape,
        call.seqlengths,
        &call.diagonals,
        call.chi,
        params,
        num_threads,
        &mut output,
        &mut gradient,
    )?;
    Ok((
        output_array(output, rows, cols)?,
        gradient_array(gradient, rows, cols, 1)?,
    ))
}

/// Max-pool convolution features: `(N, seq_len, dim)` to `(N, chi.len())`.
pub fn maxpool_features<'a, T: RfFloat>(
    input: ArrayView3<'a, T>,
    seqlengths: ArrayView1<'a, i32>,
    radem: ArrayView3<'a, i8>,
    chi: ArrayView1<'a, T>,
    params: &MaxPoolParams,
    num_threads: usize,
) -> Result<Array2<f64>> {
    let call = conv_call(&input, &seqlengths, &radem, &chi, params.conv_width, num_threads)?;
    let rows = call.seqlengths.len();
    let cols = call.chi.len();
    let mut output = try_zeroed(rows * cols, 0.0)?;
    cpu::maxpool_features(
        call.x,
        &call.shape,
        call.seqlengths,
        &call.diagonals,
        call.chi,
        params,
        num_threads,
        &mut output,
    )?;
    output_array(output, rows, cols)
}

/// `(chi.len(), dim)` ARD weight matrix for `dim`-wide inputs.
pub fn ard_weights<T: RfFloat>(
    radem: ArrayView3<i8>,
    chi: ArrayView1<T>,
    dim: usize,
) -> Result<Array2<T>> {
    let signs = validation::contiguous(&radem, "radem")?;
    validation::ard_weights(radem.shape(), signs, chi.len(), dim)?;
    let chi_values = validation::contiguous(&chi, "chi")?;
    let diagonals = SorfDiagonals::new(signs, radem.shape()[2]);
    let weights = ard::precompute_weights(&diagonals, chi_values, dim)?;
    Array2::from_shape_vec((chi.len(), dim), weights)
        .map_err(|_| RfError::mismatch("weights", &[chi.len(), dim], &[]))
}

pub(crate) struct ArdCall<'a, T> {
    pub rows: usize,
    pub nodes: usize,
    pub dim: usize,
    pub x: &'a [T],
    pub weights: &'a [T],
    pub sigma_map: &'a [i32],
    pub sigma_vals: &'a [f64],
}

pub(crate) fn ard_call<'a, T: RfFloat>(
    input: &ArrayView3<'a, T>,
    weights: &ArrayView2<'a, T>,
    sigma_map: &ArrayView1<'a, i32>,
    sigma_vals: &ArrayView1<'a, f64>,
    params: &ArdParams,
    num_threads: usize,
) -> Result<ArdCall<'a, T>> {
    validation::threads(num_threads)?;
    validation::finite("beta", params.beta)?;
    let (nodes, dim) = validation::ard_input(input.shape(), weights.shape())?;
    let map = validation::contiguous(sigma_map, "sigma_map")?;
    let vals = validation::contiguous(sigma_vals, "sigma_vals")?;
    validation::sigma_map(map, vals, dim, params.num_lengthscales)?;
    Ok(ArdCall {
        rows: input.shape()[0],
        nodes,
        dim,
        x: validation::contiguous(input, "input")?,
        weights: validation::contiguous(weights, "weights")?,
        sigma_map: map,
        sigma_vals: vals,
    })
}

/// ARD features of `(N, nodes, dim)` input: `(N, 2 * num_freqs)`.
pub fn ard_features<'a, T: RfFloat>(
    input: ArrayView3<'a, T>,
    weights: ArrayView2<'a, T>,
    sigma_map: ArrayView1<'a, i32>,
    sigma_vals: ArrayView1<'a, f64>,
    params: &ArdParams,
    num_threads: usize,
) -> Result<Array2<f64>> {
    let call = ard_call(&input, &weights, &sigma_map, &sigma_vals, params, num_threads)?;
    let cols = 2 * weights.shape()[0];
    let mut output = try_zeroed(call.rows * cols, 0.0)?;
    cpu::ard_features(
        call.x,
        call.nodes,
        call.dim,
        call.weights,
        call.sigma_map,
        call.sigma_vals,
        params,
        num_threads,
        &mut output,
    )?;
    output_array(output, call.rows, cols)
}

/// ARD features and the `(N, 2 * num_freqs, num_lengthscales)` gradient.
pub fn ard_gradient<'a, T: RfFloat>(
    input: ArrayView3<'a, T>,
    weights: ArrayView2<'a, T>,
    sigma_map: ArrayView1<'a, i32>,
    sigma_vals: ArrayView1<'a, f64>,
    params: &ArdParams,
    num_threads: usize,
) -> Result<(Array2<f64>, Array3<f64>)> {
    let call = ard_call(&input, &weights, &sigma_map, &sigma_vals, params, num_threads)?;
    let cols = 2 * weights.shape()[0];
    let groups = params.num_lengthscales;
    let mut output = try_zeroed(call.rows * cols, 0.0)?;
    let mut gradient = try_zeroed(call.rows * cols * groups, 0.0)?;
    cpu::ard_gradient(
        call.x,
        call.nodes,
        call.dim,
        call.weights,
        call.sigma_map,
        call.sigma_vals,
        params,
        num_threads,
        &mut output,
        &mut gradient,
    )?;
    Ok((
        output_array(output, call.rows, cols)?,
        gradient_array(gradient, call.rows, cols, groups)?,
    ))
}
