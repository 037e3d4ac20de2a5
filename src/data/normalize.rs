//! Min-max normalization bounds
//!
//! The batch source scales speeds into [0, 1] with per-feature bounds;
//! evaluation maps predictions and labels back with `re_current`.

use ndarray::{Array, Dimension};
use serde::{Deserialize, Serialize};

/// Min/max of one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormBounds {
    pub min: f64,
    pub max: f64,
}

impl NormBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Bounds spanning the given values
    pub fn fit<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> Option<Self> {
        let mut iter = values.into_iter();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Some(Self { min, max })
    }

    fn range(&self) -> f64 {
        let range = self.max - self.min;
        // Constant feature
        if range.abs() < 1e-10 {
            1.0
        } else {
            range
        }
    }

    /// Scale into [0, 1]
    pub fn normalize(&self, x: f64) -> f64 {
        (x - self.min) / self.range()
    }

    /// Map a normalized value back to the original scale
    pub fn re_current(&self, a: f64) -> f64 {
        a * self.range() + self.min
    }

    /// Element-wise `re_current` over an array
    pub fn re_current_array<D: Dimension>(&self, a: &Array<f64, D>) -> Array<f64, D> {
        a.mapv(|v| self.re_current(v))
    }
}
