//! Seeded sampling of Rademacher stacks and chi diagonals.
//!
//! Generators never sample; callers build parameters once (here or elsewhere)
//! and pass them to every call so that features stay consistent across batches.

use crate::{padded_width, sorf::num_repeats, Result, RfError, RfFloat, SORF_LAYERS};
use ndarray::{Array1, Array2, Array3};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{ChiSquared, Distribution};

pub fn rng_from_seed(seed: [u8; 32]) -> StdRng {
    StdRng::from_seed(seed)
}

/// `(layers, 1, row_len)` stack of independent +1/-1 entries.
pub fn rademacher<R: Rng>(rng: &mut R, layers: usize, row_len: usize) -> Array3<i8> {
    Array3::from_shape_simple_fn((layers, 1, row_len), || if rng.gen::<bool>() { 1 } else { -1 })
}

/// `count` draws from a chi distribution with `degrees_of_freedom` degrees.
pub fn chi<T: RfFloat, R: Rng>(rng: &mut R, count: usize, degrees_of_freedom: usize) -> Result<Array1<T>> {
    let distribution = ChiSquared::new(degrees_of_freedom as f64)
        .map_err(|e| RfError::invalid("degrees_of_freedom", degrees_of_freedom, &e.to_string()))?;
    Ok(Array1::from_shape_simple_fn(count, || {
        T::from_f64(distribution.sample(&mut *rng).sqrt())
    }))
}

/// Rademacher stack and chi diagonal for one SORF generator.
#[derive(Debug, Clone)]
pub struct SorfParams<T> {
    /// Transform width the stack was sampled for.
    pub width: usize,
    pub radem: Array3<i8>,
    pub chi: Array2<T>,
}

impl<T: RfFloat> SorfParams<T> {
    /// Parameters for `num_freqs` frequencies over `input_len`-wide rows,
    /// `degree` independent projections deep (1 for everything but
    /// polynomial features). `chi` is `(degree, num_freqs)`.
    pub fn sample<R: Rng>(
        rng: &mut R,
        input_len: usize,
        num_freqs: usize,
        degree: usize,
    ) -> Result<Self> {
        if num_freqs == 0 || degree == 0 {
            return Err(RfError::invalid(
                "num_freqs",
                num_freqs,
                "frequency count and degree must be non-zero",
            ));
        }
        let width = padded_width(input_len);
        let row_len = num_repeats(num_freqs, width) * width;
        let radem = rademacher(rng, degree * SORF_LAYERS, row_len);
        let values = chi::<T, R>(rng, degree * num_freqs, width)?;
        let chi = values
            .into_shape((degree, num_freqs))
            .map_err(|_| RfError::mismatch("chi", &[degree, num_freqs], &[]))?;
        Ok(Self { width, radem, chi })
    }
}
