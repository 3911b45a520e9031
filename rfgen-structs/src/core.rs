use crate::{config::KernelKind, serializable_struct_with_getters};
use serde::{Deserialize, Serialize};

serializable_struct_with_getters! {
    InputData {
        x: Vec<Vec<Vec<f64>>>,
        seqlengths: Option<Vec<i32>>,
    }
}

impl InputData {
    /// `(samples, rows, dim)` of `x`, or `None` if it is ragged.
    pub fn shape(&self) -> Option<(usize, usize, usize)> {
        let rows = self.x.first().map_or(0, |sample| sample.len());
        let dim = self
            .x
            .first()
            .and_then(|sample| sample.first())
            .map_or(0, |row| row.len());
        let regular = self.x.iter().all(|sample| {
            sample.len() == rows && sample.iter().all(|row| row.len() == dim)
        });
        regular.then_some((self.x.len(), rows, dim))
    }
}

serializable_struct_with_getters! {
    OutputData {
        kernel: KernelKind,
        num_freqs: usize,
        features: Vec<Vec<f64>>,
        gradient: Option<Vec<Vec<Vec<f64>>>>,
    }
}
