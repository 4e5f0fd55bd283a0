//! Field engine: CSR power spectra and wake potentials from bunch profiles.
//!
//! Per simulation step the engine pulls the longitudinal charge-density
//! profile from the distribution mesh, recenters it into a zero-padded
//! buffer, and forward-transforms it into the frequency-domain form factor.
//! The CSR path weighs the form factor against the real part of the
//! impedance to produce a power spectrum and scalar intensity; the wake
//! path multiplies form factor and impedance bin by bin, transforms back,
//! and unpads the result into the spatial wake potential that the
//! distribution-evolution step consumes as a force term.
//!
//! All buffers and transform plans are allocated once at construction and
//! reused; update calls only mutate their contents. One engine instance is
//! not safe for concurrent updates — the caller serializes the two update
//! operations.

use num_complex::Complex64;

use crate::axis::Axis;
use crate::backend::{BackendError, CopyDirection, Direction, SignalBuffer, TransformBackend};
use crate::impedance::Impedance;
use crate::mesh::DistributionMesh;
use crate::units::SPEED_OF_LIGHT;

/// Beam parameters determining the wake-potential scaling.
#[derive(Debug, Clone, Copy)]
pub struct BeamParameters {
    /// Bunch current in A.
    pub current: f64,
    /// Reference particle energy in eV.
    pub energy: f64,
    /// Relative energy spread.
    pub energy_spread: f64,
    /// Simulation time step in s.
    pub time_step: f64,
}

/// Errors from engine construction and the per-step updates.
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("padded length {n_freqs} is shorter than the bunch profile ({bunch_cells} cells)")]
    PaddingTooShort { n_freqs: usize, bunch_cells: usize },

    #[error("bunch profile needs an even, non-zero cell count, got {0}")]
    OddCellCount(usize),

    #[error("bunch profile has {got} samples, expected {expected}")]
    ProfileLength { got: usize, expected: usize },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Computes the electromagnetic self-interaction of a circulating bunch.
///
/// Generic over the transform backend: construct it with a host backend or
/// a device backend and the same code path runs on either. The impedance is
/// snapshotted at construction; the mesh is passed into each update call.
pub struct FieldEngine<B: TransformBackend> {
    backend: B,
    n_freqs: usize,
    bunch_cells: usize,
    freq_axis: Axis,
    wake_axis: Axis,
    wake_scaling: f64,
    /// Host copy of the impedance, used by the CSR spectrum loop.
    impedance_table: Vec<Complex64>,
    /// Backend-resident copy, used by the wake-loss convolution.
    impedance_buf: B::Complex,
    padded_profile: B::Real,
    form_factor: B::Complex,
    wake_losses: B::Complex,
    wake_complex: B::Complex,
    wake_potential: B::Real,
    csr_spectrum: Vec<f64>,
    csr_intensity: f64,
    wake_function: Option<Vec<f64>>,
    r2c_plan: B::R2cPlan,
    backward_plan: B::C2cPlan,
}

impl<B: TransformBackend> FieldEngine<B> {
    /// Build an engine whose padded transform length equals the impedance
    /// table's frequency count.
    ///
    /// `user_scaling` multiplies every wake-potential sample (after the
    /// axis-delta factors); pass the value from [`BeamParameters`] physics
    /// via [`FieldEngine::from_beam_parameters`] instead when available.
    pub fn new<M, Z>(
        mesh: &M,
        impedance: &Z,
        user_scaling: f64,
        backend: B,
    ) -> Result<Self, FieldError>
    where
        M: DistributionMesh + ?Sized,
        Z: Impedance + ?Sized,
    {
        let n_freqs = impedance.frequency_count();
        Self::with_padding(mesh, impedance, n_freqs, user_scaling, backend)
    }

    /// Build an engine with an explicit padded transform length.
    ///
    /// An impedance table shorter than `n_freqs` is zero-filled past its
    /// end; a warning names the known and needed bin counts.
    pub fn with_padding<M, Z>(
        mesh: &M,
        impedance: &Z,
        n_freqs: usize,
        user_scaling: f64,
        mut backend: B,
    ) -> Result<Self, FieldError>
    where
        M: DistributionMesh + ?Sized,
        Z: Impedance + ?Sized,
    {
        let bunch_cells = mesh.cell_count(0);
        if bunch_cells == 0 || bunch_cells % 2 != 0 {
            // the recentring index maps split the profile at cells/2
            return Err(FieldError::OddCellCount(bunch_cells));
        }
        if n_freqs < bunch_cells {
            return Err(FieldError::PaddingTooShort {
                n_freqs,
                bunch_cells,
            });
        }

        let delta = mesh.delta(0);
        let scale = mesh.scale(0);
        let freq_axis = Axis::new(n_freqs, 0.0, 1.0 / delta, SPEED_OF_LIGHT / scale);
        // the sample at index `bunch_cells` of the wake axis sits at zero
        let wake_axis = Axis::new(
            2 * bunch_cells,
            -delta * bunch_cells as f64,
            delta * (bunch_cells as f64 - 1.0),
            scale,
        );
        let wake_scaling = 2.0 * user_scaling * freq_axis.delta() * wake_axis.delta();

        let impedance_table = snapshot_impedance(impedance, n_freqs);
        let mut impedance_buf = backend.alloc_complex(n_freqs)?;
        impedance_buf
            .as_mut_slice()
            .copy_from_slice(&impedance_table);
        impedance_buf.sync(CopyDirection::HostToDevice);

        let padded_profile = backend.alloc_real(n_freqs)?;
        let form_factor = backend.alloc_complex(n_freqs)?;
        let wake_losses = backend.alloc_complex(n_freqs)?;
        let wake_complex = backend.alloc_complex(n_freqs)?;
        let wake_potential = backend.alloc_real(bunch_cells)?;
        let r2c_plan = backend.plan_r2c(n_freqs)?;
        let backward_plan = backend.plan_c2c(n_freqs, Direction::Backward)?;

        Ok(Self {
            backend,
            n_freqs,
            bunch_cells,
            freq_axis,
            wake_axis,
            wake_scaling,
            impedance_table,
            impedance_buf,
            padded_profile,
            form_factor,
            wake_losses,
            wake_complex,
            wake_potential,
            csr_spectrum: vec![0.0; n_freqs],
            csr_intensity: 0.0,
            wake_function: None,
            r2c_plan,
            backward_plan,
        })
    }

    /// Build an engine from beam parameters.
    ///
    /// The wake scaling becomes `I_b·Δt·c / scale₀ / (Δ₁·σ_E·E₀)` times the
    /// axis-delta factors.
    pub fn from_beam_parameters<M, Z>(
        mesh: &M,
        impedance: &Z,
        beam: BeamParameters,
        backend: B,
    ) -> Result<Self, FieldError>
    where
        M: DistributionMesh + ?Sized,
        Z: Impedance + ?Sized,
    {
        let user_scaling = beam.current * beam.time_step * SPEED_OF_LIGHT
            / mesh.scale(0)
            / (mesh.delta(1) * beam.energy_spread * beam.energy);
        Self::new(mesh, impedance, user_scaling, backend)
    }

    /// Build an engine that additionally precomputes a real-space wake
    /// function by forward- and backward-transforming the impedance itself
    /// at length `n_max`.
    ///
    /// This alternate mode predates the per-step wake potential and is kept
    /// for comparison runs. Its scaling sign convention has not been
    /// re-validated; prefer [`FieldEngine::update_wake_potential`] on the
    /// hot path. An impedance table shorter than `n_max` is zero-filled
    /// with a warning.
    #[allow(clippy::too_many_arguments)]
    pub fn with_wake_function<M, Z>(
        mesh: &M,
        impedance: &Z,
        beam: BeamParameters,
        bend_radius: f64,
        synchrotron_frequency: f64,
        n_max: usize,
        backend: B,
    ) -> Result<Self, FieldError>
    where
        M: DistributionMesh + ?Sized,
        Z: Impedance + ?Sized,
    {
        let mut engine = Self::from_beam_parameters(mesh, impedance, beam, backend)?;
        let cells = engine.bunch_cells;
        if n_max < cells {
            return Err(FieldError::PaddingTooShort {
                n_freqs: n_max,
                bunch_cells: cells,
            });
        }

        let table = snapshot_impedance(impedance, n_max);
        let mut z = engine.backend.alloc_complex(n_max)?;
        z.as_mut_slice().copy_from_slice(&table);
        z.sync(CopyDirection::HostToDevice);
        let mut spectrum_fwd = engine.backend.alloc_complex(n_max)?;
        let mut spectrum_bwd = engine.backend.alloc_complex(n_max)?;
        let mut forward = engine.backend.plan_c2c(n_max, Direction::Forward)?;
        let mut backward = engine.backend.plan_c2c(n_max, Direction::Backward)?;
        engine
            .backend
            .execute_c2c(&mut forward, &mut z, &mut spectrum_fwd)?;
        engine
            .backend
            .execute_c2c(&mut backward, &mut z, &mut spectrum_bwd)?;

        let g = -beam.current * SPEED_OF_LIGHT * mesh.delta(1) * beam.time_step
            / (2.0 * std::f64::consts::PI
                * synchrotron_frequency
                * beam.energy_spread
                * beam.energy)
            / (std::f64::consts::PI * bend_radius);

        // Equivalent to a DFT of the impedance with Z(-n) = Z*(n). The
        // sample at index `cells` (q == 0) is the self-interaction term;
        // index 0 stays zero to keep the kernel antisymmetric.
        let zcsrf = spectrum_fwd.as_slice();
        let zcsrb = spectrum_bwd.as_slice();
        let mut kernel = vec![0.0; 2 * cells];
        for i in 0..cells {
            // zcsrf[0].re == zcsrb[0].re, so writing index `cells` twice is
            // order-independent
            kernel[cells - i] = g * zcsrf[i].re;
            kernel[cells + i] = g * zcsrb[i].re;
        }
        engine.wake_function = Some(kernel);
        Ok(engine)
    }

    /// Compute the CSR power spectrum and intensity for the current bunch
    /// profile.
    ///
    /// `cutoff ≤ 0` disables high-pass weighting of the intensity sum. Safe
    /// to call every simulation step; an unchanged profile reproduces the
    /// same spectrum. A degenerate all-zero profile yields a zero spectrum
    /// and zero intensity.
    pub fn update_csr<M>(&mut self, mesh: &mut M, cutoff: f64) -> Result<&[f64], FieldError>
    where
        M: DistributionMesh + ?Sized,
    {
        self.transform_profile(mesh)?;

        let form = self.form_factor.as_slice();
        self.csr_intensity = 0.0;
        for i in 0..self.n_freqs {
            let mut highpass = 1.0;
            if cutoff > 0.0 {
                let f = self.freq_axis.scale * self.freq_axis.value(i) / cutoff;
                highpass -= (-(f * f)).exp();
            }
            self.csr_spectrum[i] = self.impedance_table[i].re * form[i].norm_sqr();
            self.csr_intensity += highpass * self.csr_spectrum[i];
        }
        Ok(&self.csr_spectrum)
    }

    /// Compute the spatial wake potential for the current bunch profile.
    ///
    /// The profile is re-read from the mesh; no caching is assumed across
    /// this and [`FieldEngine::update_csr`]. The returned slice is valid
    /// until the next call to either update operation.
    pub fn update_wake_potential<M>(&mut self, mesh: &mut M) -> Result<&[f64], FieldError>
    where
        M: DistributionMesh + ?Sized,
    {
        self.transform_profile(mesh)?;
        self.backend.convolve_one_sided(
            &self.impedance_buf,
            &self.form_factor,
            &mut self.wake_losses,
        )?;
        self.backend.execute_c2c(
            &mut self.backward_plan,
            &mut self.wake_losses,
            &mut self.wake_complex,
        )?;
        self.backend
            .gather_wake(&self.wake_complex, self.wake_scaling, &mut self.wake_potential)?;
        Ok(self.wake_potential.as_slice())
    }

    /// Copy the mirrored buffers between host and device in the given
    /// direction. A no-op under a host-only backend.
    pub fn sync_device(&mut self, direction: CopyDirection) {
        self.padded_profile.sync(direction);
        self.form_factor.sync(direction);
        self.wake_losses.sync(direction);
        self.wake_complex.sync(direction);
        self.wake_potential.sync(direction);
    }

    fn transform_profile<M>(&mut self, mesh: &mut M) -> Result<(), FieldError>
    where
        M: DistributionMesh + ?Sized,
    {
        let profile = mesh.longitudinal_profile();
        if profile.len() != self.bunch_cells {
            return Err(FieldError::ProfileLength {
                got: profile.len(),
                expected: self.bunch_cells,
            });
        }
        self.backend
            .scatter_profile(profile, &mut self.padded_profile)?;
        self.backend.execute_r2c(
            &mut self.r2c_plan,
            &mut self.padded_profile,
            &mut self.form_factor,
        )?;
        Ok(())
    }

    /// Last computed CSR power spectrum, one sample per frequency bin.
    pub fn csr_spectrum(&self) -> &[f64] {
        &self.csr_spectrum
    }

    /// Last computed cutoff-weighted CSR intensity.
    pub fn csr_intensity(&self) -> f64 {
        self.csr_intensity
    }

    /// Last computed wake potential, one sample per bunch cell. Valid until
    /// the next update call; do not retain across updates.
    pub fn wake_potential(&self) -> &[f64] {
        self.wake_potential.as_slice()
    }

    /// Precomputed wake-function kernel, when constructed with one.
    pub fn wake_function(&self) -> Option<&[f64]> {
        self.wake_function.as_deref()
    }

    pub fn frequency_axis(&self) -> Axis {
        self.freq_axis
    }

    pub fn wake_axis(&self) -> Axis {
        self.wake_axis
    }

    pub fn frequency_count(&self) -> usize {
        self.n_freqs
    }

    pub fn cell_count(&self) -> usize {
        self.bunch_cells
    }

    pub fn wake_scaling(&self) -> f64 {
        self.wake_scaling
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

fn snapshot_impedance<Z>(impedance: &Z, n: usize) -> Vec<Complex64>
where
    Z: Impedance + ?Sized,
{
    let known = impedance.frequency_count().min(n);
    let mut table = Vec::with_capacity(n);
    for i in 0..known {
        table.push(impedance.value(i));
    }
    if known < n {
        log::warn!(
            "unknown impedance for high wavenumbers (known: n={known}, needed: N={n}); \
             zero-filling the remainder"
        );
        table.resize(n, Complex64::ZERO);
    }
    table
}
