use crate::serializable_struct_with_getters;
use rfgen_kernels::{
    features::{ArcCosParams, ArdParams, ConvRbfParams, MaxPoolParams, PolyParams, RbfParams},
    Averaging, Pooling,
};
use rfgen_utils::u8s_from_parts;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    Rbf,
    Arccos,
    Poly,
    ConvRbf,
    Maxpool,
    Ard,
}

impl KernelKind {
    /// Families with an analytic lengthscale gradient.
    pub fn has_gradient(&self) -> bool {
        matches!(self, KernelKind::Rbf | KernelKind::ConvRbf | KernelKind::Ard)
    }

    pub fn is_convolution(&self) -> bool {
        matches!(self, KernelKind::ConvRbf | KernelKind::Maxpool)
    }
}

/// Floating point type the transforms run in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    F32,
    #[default]
    F64,
}

serializable_struct_with_getters! {
    KernelSettings {
        kernel: KernelKind,
        num_freqs: usize,
        seed: String,
        beta: f64,
        sigma: Option<f64>,
        kernel_order: Option<u32>,
        degree: Option<usize>,
        conv_width: Option<usize>,
        averaging: Option<Averaging>,
        pooling: Option<Pooling>,
        sigma_map: Option<Vec<i32>>,
        sigma_vals: Option<Vec<f64>>,
        precision: Option<Precision>,
        fit_intercept: Option<bool>,
    }
}

pub const DEFAULT_SIGMA: f64 = 1.0;
pub const DEFAULT_KERNEL_ORDER: u32 = 1;
pub const DEFAULT_DEGREE: usize = 2;
pub const DEFAULT_CONV_WIDTH: usize = 3;

impl KernelSettings {
    /// Seed for sampling Rademacher and chi arrays. Settings that differ only
    /// in post-processing share the same random projection.
    pub fn calc_seed(&self) -> [u8; 32] {
        u8s_from_parts(&[self.seed.as_str(), &self.num_freqs.to_string()])
    }

    pub fn precision_or_default(&self) -> Precision {
        self.precision.unwrap_or_default()
    }

    /// Whether feature column 0 is replaced by a constant intercept column.
    pub fn fit_intercept_or_default(&self) -> bool {
        self.fit_intercept.unwrap_or(false)
    }

    pub fn rbf_params(&self) -> RbfParams {
        RbfParams {
            sigma: self.sigma.unwrap_or(DEFAULT_SIGMA),
            beta: self.beta,
        }
    }

    pub fn arccos_params(&self) -> ArcCosParams {
        ArcCosParams {
            beta: self.beta,
            kernel_order: self.kernel_order.unwrap_or(DEFAULT_KERNEL_ORDER),
        }
    }

    pub fn poly_params(&self) -> PolyParams {
        PolyParams {
            beta: self.beta,
            degree: self.degree.unwrap_or(DEFAULT_DEGREE),
        }
    }

    pub fn conv_rbf_params(&self) -> ConvRbfParams {
        ConvRbfParams {
            conv_width: self.conv_width.unwrap_or(DEFAULT_CONV_WIDTH),
            sigma: self.sigma.unwrap_or(DEFAULT_SIGMA),
            beta: self.beta,
            averaging: self.averaging.unwrap_or_default(),
        }
    }

    pub fn maxpool_params(&self) -> MaxPoolParams {
        MaxPoolParams {
            conv_width: self.conv_width.unwrap_or(DEFAULT_CONV_WIDTH),
            pooling: self.pooling.unwrap_or_default(),
        }
    }

    /// Lengthscale map and values for `dim` input dimensions.
    ///
    /// Without an explicit map every dimension shares group 0; without
    /// explicit values every dimension uses `sigma`.
    pub fn ard_lengthscales(&self, dim: usize) -> (Vec<i32>, Vec<f64>) {
        let sigma_map = self.sigma_map.clone().unwrap_or_else(|| vec![0; dim]);
        let sigma_vals = self
            .sigma_vals
            .clone()
            .unwrap_or_else(|| vec![self.sigma.unwrap_or(DEFAULT_SIGMA); dim]);
        (sigma_map, sigma_vals)
    }

    pub fn ard_params(&self, sigma_map: &[i32]) -> ArdParams {
        let num_lengthscales = sigma_map.iter().copied().max().map_or(1, |max| max.max(0) as usize + 1);
        ArdParams {
            beta: self.beta,
            num_lengthscales,
        }
    }
}
