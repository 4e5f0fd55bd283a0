//! Distribution-mesh collaborator contract.

/// Access contract for the particle-distribution mesh feeding the engine.
///
/// Axis 0 is the longitudinal coordinate, axis 1 the energy coordinate. The
/// mesh itself (projection, accumulation, kick maps) lives outside this
/// crate; the engine only pulls the longitudinal charge-density profile and
/// the grid geometry from it.
pub trait DistributionMesh {
    /// Number of mesh cells along `axis`.
    fn cell_count(&self, axis: usize) -> usize;

    /// Grid spacing along `axis`.
    fn delta(&self, axis: usize) -> f64;

    /// Physical unit scale of `axis`.
    fn scale(&self, axis: usize) -> f64;

    /// Recompute and return the longitudinal charge-density projection.
    ///
    /// The returned slice holds `cell_count(0)` non-negative samples and is
    /// logically periodic: the first and last sample are adjacent.
    fn longitudinal_profile(&mut self) -> &[f64];
}
