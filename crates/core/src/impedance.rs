//! Beam-coupling impedance collaborator contract.

use num_complex::Complex64;

/// Read-only frequency-domain transfer function of the machine environment.
///
/// Loaders and analytic models live outside this crate; the engine
/// snapshots the tabulated values once at construction.
pub trait Impedance {
    /// Number of tabulated frequency bins.
    fn frequency_count(&self) -> usize;

    /// Impedance value at frequency bin `index`, `index <
    /// frequency_count()`.
    fn value(&self, index: usize) -> Complex64;
}
