//! Kernel-specific post-processing of SORF output.
//!
//! Each submodule exposes `*_rows` workers that process a contiguous range of
//! samples with their own scratch buffers. Workers never read the previous
//! contents of their output slices; they write every element they own.

pub mod arccos;
pub mod ard;
pub mod conv;
pub mod maxpool;
pub mod poly;
pub mod rbf;

use serde::{Deserialize, Serialize};

/// Normalization of convolution features by the number of valid windows.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Averaging {
    #[default]
    None,
    Sqrt,
    Full,
}

impl Averaging {
    pub fn factor(self, num_windows: usize) -> f64 {
        match self {
            Averaging::None => 1.0,
            Averaging::Sqrt => 1.0 / (num_windows as f64).sqrt(),
            Averaging::Full => 1.0 / num_windows as f64,
        }
    }
}

/// Reduction applied across window positions by max-pool convolution.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Pooling {
    /// Maximum over windows, starting from 0 (negative maxima clip to 0).
    #[default]
    Max,
    /// Maximum over windows minus the mean over the same windows.
    MaxMinusMean,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RbfParams {
    pub sigma: f64,
    pub beta: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ArcCosParams {
    pub beta: f64,
    pub kernel_order: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PolyParams {
    pub beta: f64,
    pub degree: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ConvRbfParams {
    pub conv_width: usize,
    pub sigma: f64,
    pub beta: f64,
    #[serde(default)]
    pub averaging: Averaging,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct MaxPoolParams {
    pub conv_width: usize,
    #[serde(default)]
    pub pooling: Pooling,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ArdParams {
    pub beta: f64,
    pub num_lengthscales: usize,
}

/// Output scale shared by the cos/sin families: `beta * sqrt(1 / num_freqs)`.
pub fn feature_scale(beta: f64, num_freqs: usize) -> f64 {
    beta * (1.0 / num_freqs as f64).sqrt()
}

#[inline]
pub(crate) fn scale_in_place(values: &mut [f64], scale: f64) {
    for value in values.iter_mut() {
        *value *= scale;
    }
}
