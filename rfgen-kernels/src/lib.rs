//! Structured random feature generation.
//!
//! Inputs are projected through three rounds of (Rademacher diagonal, fast
//! Hadamard transform), scaled by a chi diagonal and passed through a
//! kernel-specific nonlinearity so that dot products of the resulting
//! features approximate an RBF, ArcCosine, polynomial or ARD kernel.
//!
//! The unchecked building blocks live in [`fht`], [`diagonal`], [`sorf`],
//! [`features`] and [`cpu`]. The checked entry points in [`api`] (and
//! [`gpu`] with the `cuda` feature) validate shapes first and are what
//! callers should normally use.

pub mod api;
pub mod cpu;
pub mod diagonal;
mod error;
pub mod features;
pub mod fht;
mod float;
#[cfg(feature = "cuda")]
pub mod gpu;
pub mod sampling;
pub mod sorf;
pub mod validation;

pub use error::{ErrorKind, Result, RfError};
pub use features::{Averaging, Pooling};
pub use float::RfFloat;
pub use sorf::SorfDiagonals;

/// Smallest transform width accepted by every generator.
pub const MIN_TRANSFORM_WIDTH: usize = 2;

/// Number of (diagonal, transform) rounds in one SORF projection.
pub const SORF_LAYERS: usize = 3;

/// Rounds `value` up to the next power of two, never below
/// [`MIN_TRANSFORM_WIDTH`].
pub fn padded_width(value: usize) -> usize {
    value.max(MIN_TRANSFORM_WIDTH).next_power_of_two()
}
