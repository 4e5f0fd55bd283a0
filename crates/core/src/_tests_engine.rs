#![cfg(test)]

use std::f64::consts::PI;

use num_complex::Complex64;

use super::backend::{
    BackendError, Direction, HostBuffer, SignalBuffer, TransformBackend,
};
use super::engine::{BeamParameters, FieldEngine, FieldError};
use super::impedance::Impedance;
use super::mesh::DistributionMesh;
use super::units::SPEED_OF_LIGHT;

/// Reference backend running textbook DFTs; slow but obviously correct.
struct TestBackend;

impl TransformBackend for TestBackend {
    type Real = HostBuffer<f64>;
    type Complex = HostBuffer<Complex64>;
    type R2cPlan = usize;
    type C2cPlan = (usize, Direction);

    fn alloc_real(&mut self, len: usize) -> Result<Self::Real, BackendError> {
        HostBuffer::zeroed(len)
    }

    fn alloc_complex(&mut self, len: usize) -> Result<Self::Complex, BackendError> {
        HostBuffer::zeroed(len)
    }

    fn plan_r2c(&mut self, len: usize) -> Result<Self::R2cPlan, BackendError> {
        Ok(len)
    }

    fn plan_c2c(
        &mut self,
        len: usize,
        direction: Direction,
    ) -> Result<Self::C2cPlan, BackendError> {
        Ok((len, direction))
    }

    fn execute_r2c(
        &mut self,
        plan: &mut Self::R2cPlan,
        input: &mut Self::Real,
        output: &mut Self::Complex,
    ) -> Result<(), BackendError> {
        let n = *plan;
        let x = input.as_slice().to_vec();
        let out = output.as_mut_slice();
        out.fill(Complex64::ZERO);
        for (k, slot) in out.iter_mut().enumerate().take(n / 2 + 1) {
            let mut sum = Complex64::ZERO;
            for (j, &v) in x.iter().enumerate() {
                let phase = -2.0 * PI * (k as f64) * (j as f64) / n as f64;
                sum += v * Complex64::from_polar(1.0, phase);
            }
            *slot = sum;
        }
        Ok(())
    }

    fn execute_c2c(
        &mut self,
        plan: &mut Self::C2cPlan,
        input: &mut Self::Complex,
        output: &mut Self::Complex,
    ) -> Result<(), BackendError> {
        let (n, direction) = *plan;
        let sign = match direction {
            Direction::Forward => -1.0,
            Direction::Backward => 1.0,
        };
        let x = input.as_slice().to_vec();
        let out = output.as_mut_slice();
        for (k, slot) in out.iter_mut().enumerate() {
            let mut sum = Complex64::ZERO;
            for (j, &v) in x.iter().enumerate() {
                let phase = sign * 2.0 * PI * (k as f64) * (j as f64) / n as f64;
                sum += v * Complex64::from_polar(1.0, phase);
            }
            *slot = sum;
        }
        Ok(())
    }
}

struct TestMesh {
    profile: Vec<f64>,
    cells: usize,
    deltas: [f64; 2],
    scales: [f64; 2],
}

impl TestMesh {
    fn new(profile: Vec<f64>) -> Self {
        let cells = profile.len();
        Self {
            profile,
            cells,
            deltas: [1.0, 1.0],
            // unit frequency-axis scale keeps cutoff numbers tangible
            scales: [SPEED_OF_LIGHT, 1.0],
        }
    }
}

impl DistributionMesh for TestMesh {
    fn cell_count(&self, axis: usize) -> usize {
        if axis == 0 { self.cells } else { 64 }
    }

    fn delta(&self, axis: usize) -> f64 {
        self.deltas[axis]
    }

    fn scale(&self, axis: usize) -> f64 {
        self.scales[axis]
    }

    fn longitudinal_profile(&mut self) -> &[f64] {
        &self.profile
    }
}

struct FlatImpedance {
    value: Complex64,
    count: usize,
}

impl Impedance for FlatImpedance {
    fn frequency_count(&self) -> usize {
        self.count
    }

    fn value(&self, _index: usize) -> Complex64 {
        self.value
    }
}

fn impulse_profile(cells: usize, at: usize) -> Vec<f64> {
    let mut profile = vec![0.0; cells];
    profile[at] = 1.0;
    profile
}

fn gaussian_profile(cells: usize) -> Vec<f64> {
    (0..cells)
        .map(|i| {
            let x = (i as f64 - cells as f64 / 2.0) / (cells as f64 / 8.0);
            (-x * x).exp()
        })
        .collect()
}

fn assert_close(lhs: f64, rhs: f64, tol: f64) {
    assert!((lhs - rhs).abs() < tol, "values differ: {lhs} vs {rhs}");
}

#[test]
fn impulse_profile_has_flat_one_sided_spectrum() {
    let r = 2.5;
    let mut mesh = TestMesh::new(impulse_profile(8, 0));
    let impedance = FlatImpedance {
        value: Complex64::new(r, 0.0),
        count: 16,
    };
    let mut engine = FieldEngine::new(&mesh, &impedance, 1.0, TestBackend).unwrap();

    let spectrum = engine.update_csr(&mut mesh, 0.0).unwrap();
    for (i, &s) in spectrum.iter().enumerate() {
        if i <= 8 {
            assert_close(s, r, 1e-9);
        } else {
            assert_close(s, 0.0, 1e-9);
        }
    }
    // nine populated one-sided bins
    assert_close(engine.csr_intensity(), 9.0 * r, 1e-9);
}

#[test]
fn zero_profile_yields_zero_spectrum_and_wake() {
    let mut mesh = TestMesh::new(vec![0.0; 8]);
    let impedance = FlatImpedance {
        value: Complex64::new(1.5, -0.75),
        count: 16,
    };
    let mut engine = FieldEngine::new(&mesh, &impedance, 3.0, TestBackend).unwrap();

    let spectrum = engine.update_csr(&mut mesh, 2.0).unwrap();
    assert!(spectrum.iter().all(|&s| s == 0.0));
    assert_eq!(engine.csr_intensity(), 0.0);

    let wake = engine.update_wake_potential(&mut mesh).unwrap();
    assert!(wake.iter().all(|&w| w == 0.0));
}

#[test]
fn forward_backward_round_trip_reproduces_padded_buffer() {
    let mut backend = TestBackend;
    let n = 16usize;
    let profile: Vec<f64> = (0..8).map(|i| 0.5 + 0.25 * i as f64).collect();

    let mut padded = backend.alloc_real(n).unwrap();
    backend.scatter_profile(&profile, &mut padded).unwrap();

    let mut spectrum = backend.alloc_complex(n).unwrap();
    let mut recovered = backend.alloc_complex(n).unwrap();
    let mut staged = backend.alloc_complex(n).unwrap();
    for (dst, &src) in staged
        .as_mut_slice()
        .iter_mut()
        .zip(padded.as_slice().iter())
    {
        *dst = Complex64::new(src, 0.0);
    }

    let mut forward = backend.plan_c2c(n, Direction::Forward).unwrap();
    let mut backward = backend.plan_c2c(n, Direction::Backward).unwrap();
    backend
        .execute_c2c(&mut forward, &mut staged, &mut spectrum)
        .unwrap();
    backend
        .execute_c2c(&mut backward, &mut spectrum, &mut recovered)
        .unwrap();

    // both transforms are unnormalized, so the round trip gains a factor n
    for (&orig, &back) in padded.as_slice().iter().zip(recovered.as_slice()) {
        assert_close(back.re / n as f64, orig, 1e-9);
        assert_close(back.im, 0.0, 1e-7);
    }
}

#[test]
fn scatter_then_gather_is_the_identity_on_the_profile() {
    let mut backend = TestBackend;
    let n = 16usize;
    let profile: Vec<f64> = (1..=8).map(|i| i as f64).collect();

    let mut padded = backend.alloc_real(n).unwrap();
    backend.scatter_profile(&profile, &mut padded).unwrap();

    // total zero padding equals n - cells
    let zeros = padded.as_slice().iter().filter(|&&v| v == 0.0).count();
    assert_eq!(zeros, n - profile.len());

    let mut staged = backend.alloc_complex(n).unwrap();
    for (dst, &src) in staged
        .as_mut_slice()
        .iter_mut()
        .zip(padded.as_slice().iter())
    {
        // non-zero imaginary parts must not leak into the gathered wake
        *dst = Complex64::new(src, 0.25);
    }

    let mut wake = backend.alloc_real(profile.len()).unwrap();
    backend.gather_wake(&staged, 1.0, &mut wake).unwrap();
    assert_eq!(wake.as_slice(), profile.as_slice());
}

#[test]
fn higher_cutoff_suppresses_more_intensity() {
    let mut mesh = TestMesh::new(gaussian_profile(8));
    let impedance = FlatImpedance {
        value: Complex64::new(1.0, 0.0),
        count: 16,
    };
    let mut engine = FieldEngine::new(&mesh, &impedance, 1.0, TestBackend).unwrap();

    engine.update_csr(&mut mesh, 0.0).unwrap();
    let unweighted = engine.csr_intensity();
    engine.update_csr(&mut mesh, 0.1).unwrap();
    let low = engine.csr_intensity();
    engine.update_csr(&mut mesh, 0.4).unwrap();
    let mid = engine.csr_intensity();
    engine.update_csr(&mut mesh, 1.6).unwrap();
    let high = engine.csr_intensity();

    assert!(unweighted > 0.0);
    // the high-pass weight 1 - exp(-(f/cutoff)²) shrinks as the cutoff grows
    assert!(unweighted >= low);
    assert!(low > mid);
    assert!(mid > high);
    assert!(high > 0.0);
}

#[test]
fn impulse_with_constant_impedance_matches_analytic_wake() {
    let r = 2.5;
    let mut mesh = TestMesh::new(impulse_profile(8, 4));
    let impedance = FlatImpedance {
        value: Complex64::new(r, 0.0),
        count: 16,
    };
    let mut engine = FieldEngine::new(&mesh, &impedance, 1.0, TestBackend).unwrap();

    // spectrum is r across the populated one-sided bins
    let spectrum = engine.update_csr(&mut mesh, 0.0).unwrap().to_vec();
    for (i, &s) in spectrum.iter().enumerate() {
        let expected = if i <= 8 { r } else { 0.0 };
        assert_close(s, expected, 1e-9);
    }

    let s = engine.wake_scaling();
    assert_close(s, 2.0 / 15.0, 1e-12);

    // backward transform of r on bins 0..8: 8r at the impulse, r on odd
    // neighbours, zero on even ones
    let wake = engine.update_wake_potential(&mut mesh).unwrap();
    let expected = [
        0.0,
        r * s,
        0.0,
        r * s,
        8.0 * r * s,
        r * s,
        0.0,
        r * s,
    ];
    for (&got, &want) in wake.iter().zip(expected.iter()) {
        assert_close(got, want, 1e-9);
    }
}

#[test]
fn short_impedance_table_is_zero_filled() {
    let r = 4.0;
    let mut mesh = TestMesh::new(impulse_profile(8, 0));
    let impedance = FlatImpedance {
        value: Complex64::new(r, 0.0),
        count: 5,
    };
    let mut engine =
        FieldEngine::with_padding(&mesh, &impedance, 16, 1.0, TestBackend).unwrap();

    let spectrum = engine.update_csr(&mut mesh, 0.0).unwrap();
    assert_eq!(spectrum.len(), 16);
    for (i, &s) in spectrum.iter().enumerate() {
        let expected = if i < 5 { r } else { 0.0 };
        assert_close(s, expected, 1e-9);
    }
    assert!(spectrum.iter().all(|s| s.is_finite()));
}

#[test]
fn wake_function_concentrates_for_constant_impedance() {
    let r = 3.0;
    let mesh = TestMesh::new(gaussian_profile(8));
    let impedance = FlatImpedance {
        value: Complex64::new(r, 0.0),
        count: 16,
    };
    let beam = BeamParameters {
        current: 1.0,
        energy: 1.0,
        energy_spread: 1.0,
        time_step: 1.0,
    };
    let engine = FieldEngine::with_wake_function(
        &mesh, &impedance, beam, 1.0, 1.0, 16, TestBackend,
    )
    .unwrap();

    let g = -beam.current * SPEED_OF_LIGHT * mesh.deltas[1] * beam.time_step
        / (2.0 * PI * 1.0 * beam.energy_spread * beam.energy)
        / (PI * 1.0);

    let kernel = engine.wake_function().unwrap();
    assert_eq!(kernel.len(), 16);
    // a constant impedance transforms to a spike at wavenumber zero
    assert_eq!(kernel[0], 0.0);
    let scale = (16.0 * r * g).abs();
    assert_close(kernel[8] / (16.0 * r * g), 1.0, 1e-9);
    for (i, &k) in kernel.iter().enumerate() {
        if i != 8 {
            assert!(k.abs() < 1e-9 * scale, "kernel[{i}] = {k}");
        }
    }
}

#[test]
fn wake_function_zero_fills_short_impedance() {
    let r = 2.0;
    let mesh = TestMesh::new(gaussian_profile(8));
    let impedance = FlatImpedance {
        value: Complex64::new(r, 0.0),
        count: 8,
    };
    let beam = BeamParameters {
        current: 1.0,
        energy: 1.0,
        energy_spread: 1.0,
        time_step: 1.0,
    };
    let engine = FieldEngine::with_wake_function(
        &mesh, &impedance, beam, 1.0, 1.0, 16, TestBackend,
    )
    .unwrap();

    let g = -beam.current * SPEED_OF_LIGHT * mesh.deltas[1] * beam.time_step
        / (2.0 * PI * 1.0 * beam.energy_spread * beam.energy)
        / (PI * 1.0);

    // only the first 8 of 16 wavenumbers are known: the DFT of the
    // zero-filled table has real part 8r at k=0, r at odd k, 0 at even k
    let kernel = engine.wake_function().unwrap();
    let tol = 1e-9 * (8.0 * r * g).abs();
    assert_eq!(kernel[0], 0.0);
    assert_close(kernel[8], 8.0 * r * g, tol);
    assert_close(kernel[9], r * g, tol);
    assert_close(kernel[10], 0.0, tol);
    assert_close(kernel[7], r * g, tol);
    assert_close(kernel[6], 0.0, tol);
    assert!(kernel.iter().all(|k| k.is_finite()));
}

#[test]
fn odd_cell_counts_are_rejected() {
    let mesh = TestMesh::new(vec![0.0; 7]);
    let impedance = FlatImpedance {
        value: Complex64::ONE,
        count: 16,
    };
    let result = FieldEngine::new(&mesh, &impedance, 1.0, TestBackend);
    assert!(matches!(result, Err(FieldError::OddCellCount(7))));
}

#[test]
fn padding_shorter_than_profile_is_rejected() {
    let mesh = TestMesh::new(vec![0.0; 8]);
    let impedance = FlatImpedance {
        value: Complex64::ONE,
        count: 16,
    };
    let result = FieldEngine::with_padding(&mesh, &impedance, 4, 1.0, TestBackend);
    assert!(matches!(
        result,
        Err(FieldError::PaddingTooShort {
            n_freqs: 4,
            bunch_cells: 8
        })
    ));
}

#[test]
fn profile_length_changes_are_detected() {
    let mut mesh = TestMesh::new(vec![0.0; 8]);
    let impedance = FlatImpedance {
        value: Complex64::ONE,
        count: 16,
    };
    let mut engine = FieldEngine::new(&mesh, &impedance, 1.0, TestBackend).unwrap();

    mesh.profile.truncate(6);
    let result = engine.update_csr(&mut mesh, 0.0);
    assert!(matches!(
        result,
        Err(FieldError::ProfileLength {
            got: 6,
            expected: 8
        })
    ));
}

#[test]
fn repeated_updates_are_idempotent_for_a_fixed_profile() {
    let mut mesh = TestMesh::new(gaussian_profile(8));
    let impedance = FlatImpedance {
        value: Complex64::new(1.0, 0.5),
        count: 16,
    };
    let mut engine = FieldEngine::new(&mesh, &impedance, 2.0, TestBackend).unwrap();

    let first = engine.update_csr(&mut mesh, 1.0).unwrap().to_vec();
    let first_intensity = engine.csr_intensity();
    let wake_first = engine.update_wake_potential(&mut mesh).unwrap().to_vec();

    let second = engine.update_csr(&mut mesh, 1.0).unwrap().to_vec();
    let wake_second = engine.update_wake_potential(&mut mesh).unwrap().to_vec();

    assert_eq!(first, second);
    assert_eq!(first_intensity, engine.csr_intensity());
    assert_eq!(wake_first, wake_second);
}
