use anyhow::Result;
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayView3};
use rfgen_kernels::{
    api,
    features::{ArcCosParams, ArdParams, ConvRbfParams, MaxPoolParams, PolyParams, RbfParams},
    RfFloat,
};
#[cfg(feature = "cuda")]
use rfgen_kernels::gpu::{GpuContext, GpuFloat};

/// Element types the runtime can generate features in.
#[cfg(not(feature = "cuda"))]
pub trait RuntimeFloat: RfFloat {}
#[cfg(feature = "cuda")]
pub trait RuntimeFloat: RfFloat + GpuFloat {}

impl RuntimeFloat for f32 {}
impl RuntimeFloat for f64 {}

/// Features plus the gradient when one was requested.
pub type Generated = (Array2<f64>, Option<Array3<f64>>);

pub enum Backend {
    Cpu { num_threads: usize },
    #[cfg(feature = "cuda")]
    Gpu(GpuContext),
}

fn with_optional<G>(
    with_gradient: bool,
    features: impl FnOnce() -> rfgen_kernels::Result<Array2<f64>>,
    gradient: impl FnOnce() -> rfgen_kernels::Result<(Array2<f64>, G)>,
) -> Result<(Array2<f64>, Option<G>)> {
    if with_gradient {
        let (output, grad) = gradient()?;
        Ok((output, Some(grad)))
    } else {
        Ok((features()?, None))
    }
}

impl Backend {
    pub fn describe(&self) -> String {
        match self {
            Backend::Cpu { num_threads } => format!("cpu ({} threads)", num_threads),
            #[cfg(feature = "cuda")]
            Backend::Gpu(ctx) => format!("cuda device {}", ctx.ordinal()),
        }
    }

    pub fn rbf<'a, T: RuntimeFloat>(
        &self,
        x: ArrayView3<'a, T>,
        radem: ArrayView3<'a, i8>,
        chi: ArrayView1<'a, T>,
        params: &RbfParams,
        with_gradient: bool,
    ) -> Result<Generated> {
        match self {
            Backend::Cpu { num_threads } => with_optional(
                with_gradient,
                || api::rbf_features(x, radem, chi, params, *num_threads),
                || api::rbf_gradient(x, radem, chi, params, *num_threads),
            ),
            #[cfg(feature = "cuda")]
            Backend::Gpu(ctx) => with_optional(
                with_gradient,
                || ctx.rbf_features(x, radem, chi, params),
                || ctx.rbf_gradient(x, radem, chi, params),
            ),
        }
    }

    pub fn arccos<'a, T: RuntimeFloat>(
        &self,
        x: ArrayView3<'a, T>,
        radem: ArrayView3<'a, i8>,
        chi: ArrayView1<'a, T>,
        params: &ArcCosParams,
    ) -> Result<Array2<f64>> {
        Ok(match self {
            Backend::Cpu { num_threads } => api::arccos_features(x, radem, chi, params, *num_threads)?,
            #[cfg(feature = "cuda")]
            Backend::Gpu(ctx) => ctx.arccos_features(x, radem, chi, params)?,
        })
    }

    pub fn poly<'a, T: RuntimeFloat>(
        &self,
        x: ArrayView3<'a, T>,
        radem: ArrayView3<'a, i8>,
        chi: ArrayView2<'a, T>,
        params: &PolyParams,
    ) -> Result<Array2<f64>> {
        Ok(match self {
            Backend::Cpu { num_threads } => api::poly_features(x, radem, chi, params, *num_threads)?,
            #[cfg(feature = "cuda")]
            Backend::Gpu(ctx) => ctx.poly_features(x, radem, chi, params)?,
        })
    }

    pub fn conv_rbf<'a, T: RuntimeFloat>(
        &self,
        x: ArrayView3<'a, T>,
        seqlengths: ArrayView1<'a, i32>,
        radem: ArrayView3<'a, i8>,
        chi: ArrayView1<'a, T>,
        params: &ConvRbfParams,
        with_gradient: bool,
    ) -> Result<Generated> {
        match self {
            Backend::Cpu { num_threads } => with_optional(
                with_gradient,
                || api::conv_rbf_features(x, seqlengths, radem, chi, params, *num_threads),
                || api::conv_rbf_gradient(x, seqlengths, radem, chi, params, *num_threads),
            ),
            #[cfg(feature = "cuda")]
            Backend::Gpu(ctx) => with_optional(
                with_gradient,
                || ctx.conv_rbf_features(x, seqlengths, radem, chi, params),
                || ctx.conv_rbf_gradient(x, seqlengths, radem, chi, params),
            ),
        }
    }

    pub fn maxpool<'a, T: RuntimeFloat>(
        &self,
        x: ArrayView3<'a, T>,
        seqlengths: ArrayView1<'a, i32>,
        radem: ArrayView3<'a, i8>,
        chi: ArrayView1<'a, T>,
        params: &MaxPoolParams,
    ) -> Result<Array2<f64>> {
        Ok(match self {
            Backend::Cpu { num_threads } => {
                api::maxpool_features(x, seqlengths, radem, chi, params, *num_threads)?
            }
            #[cfg(feature = "cuda")]
            Backend::Gpu(ctx) => ctx.maxpool_features(x, seqlengths, radem, chi, params)?,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn ard<'a, T: RuntimeFloat>(
        &self,
        x: ArrayView3<'a, T>,
        weights: ArrayView2<'a, T>,
        sigma_map: ArrayView1<'a, i32>,
        sigma_vals: ArrayView1<'a, f64>,
        params: &ArdParams,
        with_gradient: bool,
    ) -> Result<Generated> {
        match self {
            Backend::Cpu { num_threads } => with_optional(
                with_gradient,
                || api::ard_features(x, weights, sigma_map, sigma_vals, params, *num_threads),
                || api::ard_gradient(x, weights, sigma_map, sigma_vals, params, *num_threads),
            ),
            #[cfg(feature = "cuda")]
            Backend::Gpu(ctx) => with_optional(
                with_gradient,
                || ctx.ard_features(x, weights, sigma_map, sigma_vals, params),
                || ctx.ard_gradient(x, weights, sigma_map, sigma_vals, params),
            ),
        }
    }
}
