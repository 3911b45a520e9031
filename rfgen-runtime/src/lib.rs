mod backend;
pub use backend::{Backend, Generated, RuntimeFloat};

use anyhow::{anyhow, bail, Result};
use ndarray::{s, Array1, Array2, Array3, ArrayView3};
use rfgen_kernels::{
    api, padded_width,
    sampling::{rng_from_seed, SorfParams},
};
use rfgen_structs::{
    config::{KernelKind, KernelSettings, Precision},
    core::{InputData, OutputData},
};
use tracing::{debug, info};

/// Samples the random projection described by `settings` and applies it to
/// every sample of `input`.
pub fn generate(
    settings: &KernelSettings,
    input: &InputData,
    backend: &Backend,
    with_gradient: bool,
) -> Result<OutputData> {
    let kernel = *settings.kernel();
    if with_gradient && !kernel.has_gradient() {
        bail!("Kernel {:?} has no gradient", kernel);
    }
    if input.seqlengths().is_some() && !kernel.is_convolution() {
        bail!("Kernel {:?} does not take seqlengths", kernel);
    }
    let (mut features, mut gradient) = match settings.precision_or_default() {
        Precision::F32 => generate_as::<f32>(settings, input, backend, with_gradient)?,
        Precision::F64 => generate_as::<f64>(settings, input, backend, with_gradient)?,
    };
    if settings.fit_intercept_or_default() {
        set_intercept(&mut features, gradient.as_mut());
    }
    Ok(OutputData {
        kernel,
        num_freqs: *settings.num_freqs(),
        features: features.outer_iter().map(|row| row.to_vec()).collect(),
        gradient: gradient.map(|grad| {
            grad.outer_iter()
                .map(|sample| sample.outer_iter().map(|row| row.to_vec()).collect())
                .collect()
        }),
    })
}

/// Replaces feature column 0 with ones. The intercept column has no
/// lengthscale dependence, so its gradient is zeroed.
pub fn set_intercept(features: &mut Array2<f64>, gradient: Option<&mut Array3<f64>>) {
    if features.ncols() == 0 {
        return;
    }
    features.column_mut(0).fill(1.0);
    if let Some(gradient) = gradient {
        gradient.slice_mut(s![.., 0, ..]).fill(0.0);
    }
}

fn input_array<T: RuntimeFloat>(input: &InputData) -> Result<Array3<T>> {
    let (samples, rows, dim) = input
        .shape()
        .ok_or_else(|| anyhow!("Input x must have the same shape for every sample"))?;
    if samples == 0 || rows == 0 || dim == 0 {
        bail!("Input x must be non-empty, got shape ({}, {}, {})", samples, rows, dim);
    }
    Ok(Array3::from_shape_fn((samples, rows, dim), |(i, j, k)| {
        T::from_f64(input.x[i][j][k])
    }))
}

/// Flattens each sample and zero pads it to `(samples, 1, width)`.
pub fn pad_samples<T: RuntimeFloat>(x: ArrayView3<T>, width: usize) -> Array3<T> {
    let mut padded = Array3::<T>::zeros((x.shape()[0], 1, width));
    for (sample, mut target) in x.outer_iter().zip(padded.outer_iter_mut()) {
        for (dst, &value) in target.iter_mut().zip(sample.iter()) {
            *dst = value;
        }
    }
    padded
}

fn generate_as<T: RuntimeFloat>(
    settings: &KernelSettings,
    input: &InputData,
    backend: &Backend,
    with_gradient: bool,
) -> Result<Generated> {
    let x = input_array::<T>(input)?;
    let (samples, rows, dim) = x.dim();
    let kernel = *settings.kernel();
    let num_freqs = *settings.num_freqs();
    let mut rng = rng_from_seed(settings.calc_seed());
    info!(
        kernel = ?kernel,
        samples,
        num_freqs,
        backend = %backend.describe(),
        "generating features"
    );

    let generated = match kernel {
        KernelKind::Rbf | KernelKind::Arccos | KernelKind::Poly => {
            let degree = match kernel {
                KernelKind::Poly => settings.poly_params().degree,
                _ => 1,
            };
            let sorf = SorfParams::<T>::sample(&mut rng, rows * dim, num_freqs, degree)?;
            let padded = pad_samples(x.view(), sorf.width);
            debug!(width = sorf.width, "padded input");
            match kernel {
                KernelKind::Rbf => backend.rbf(
                    padded.view(),
                    sorf.radem.view(),
                    sorf.chi.row(0),
                    &settings.rbf_params(),
                    with_gradient,
                )?,
                KernelKind::Arccos => (
                    backend.arccos(
                        padded.view(),
                        sorf.radem.view(),
                        sorf.chi.row(0),
                        &settings.arccos_params(),
                    )?,
                    None,
                ),
                _ => (
                    backend.poly(
                        padded.view(),
                        sorf.radem.view(),
                        sorf.chi.view(),
                        &settings.poly_params(),
                    )?,
                    None,
                ),
            }
        }
        KernelKind::ConvRbf | KernelKind::Maxpool => {
            let conv_width = settings.conv_rbf_params().conv_width;
            let sorf = SorfParams::<T>::sample(&mut rng, conv_width * dim, num_freqs, 1)?;
            let seqlengths = Array1::from(
                input
                    .seqlengths()
                    .cloned()
                    .unwrap_or_else(|| vec![rows as i32; samples]),
            );
            if kernel == KernelKind::ConvRbf {
                backend.conv_rbf(
                    x.view(),
                    seqlengths.view(),
                    sorf.radem.view(),
                    sorf.chi.row(0),
                    &settings.conv_rbf_params(),
                    with_gradient,
                )?
            } else {
                (
                    backend.maxpool(
                        x.view(),
                        seqlengths.view(),
                        sorf.radem.view(),
                        sorf.chi.row(0),
                        &settings.maxpool_params(),
                    )?,
                    None,
                )
            }
        }
        KernelKind::Ard => {
            let sorf = SorfParams::<T>::sample(&mut rng, dim, num_freqs, 1)?;
            let weights: Array2<T> = api::ard_weights(sorf.radem.view(), sorf.chi.row(0), dim)?;
            let (sigma_map, sigma_vals) = settings.ard_lengthscales(dim);
            let params = settings.ard_params(&sigma_map);
            let sigma_map = Array1::from(sigma_map);
            let sigma_vals = Array1::from(sigma_vals);
            debug!(
                width = padded_width(dim),
                num_lengthscales = params.num_lengthscales,
                "precomputed ard weights"
            );
            backend.ard(
                x.view(),
                weights.view(),
                sigma_map.view(),
                sigma_vals.view(),
                &params,
                with_gradient,
            )?
        }
    };
    Ok(generated)
}
