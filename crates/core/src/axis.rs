//! Uniform sampled-axis helpers.

use serde::{Deserialize, Serialize};

/// Immutable description of a uniformly sampled axis.
///
/// One instance describes the spatial wake grid, another the frequency grid
/// derived from the impedance table. `scale` converts axis values into
/// physical units (e.g. meters per grid unit, or Hz per frequency bin).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Axis {
    pub count: usize,
    pub lower: f64,
    pub upper: f64,
    pub scale: f64,
}

impl Axis {
    pub fn new(count: usize, lower: f64, upper: f64, scale: f64) -> Self {
        assert!(count > 1, "axis needs at least two samples");
        assert!(upper > lower, "axis bounds must be ordered");
        Self {
            count,
            lower,
            upper,
            scale,
        }
    }

    /// Spacing between adjacent samples.
    #[inline]
    pub fn delta(&self) -> f64 {
        (self.upper - self.lower) / (self.count - 1) as f64
    }

    /// Axis value at sample `i`.
    #[inline]
    pub fn value(&self, i: usize) -> f64 {
        self.lower + i as f64 * self.delta()
    }
}
