use ndarray::NdFloat;

/// Floating point element type of input, chi and scratch arrays.
///
/// Transforms run in `Self`; post-processing accumulates in `f64`.
pub trait RfFloat: NdFloat + Default {
    /// Suffix of the CUDA entry points instantiated for this type.
    const KERNEL_SUFFIX: &'static str;

    fn from_f64(value: f64) -> Self;

    fn as_f64(self) -> f64;

    fn from_sign(sign: i8) -> Self;
}

macro_rules! impl_rf_float {
    ($ty:ty, $suffix:literal) => {
        impl RfFloat for $ty {
            const KERNEL_SUFFIX: &'static str = $suffix;

            #[inline(always)]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            #[inline(always)]
            fn as_f64(self) -> f64 {
                self as f64
            }

            #[inline(always)]
            fn from_sign(sign: i8) -> Self {
                sign as $ty
            }
        }
    };
}

impl_rf_float!(f32, "float");
impl_rf_float!(f64, "double");
