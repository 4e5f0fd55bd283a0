#![cfg(test)]

use std::f64::consts::PI;
use std::path::PathBuf;
use std::sync::Arc;

use num_complex::Complex64;

use wakefield_core::backend::{Direction, SignalBuffer, TransformBackend};
use wakefield_core::engine::FieldEngine;
use wakefield_core::impedance::Impedance;
use wakefield_core::mesh::DistributionMesh;
use wakefield_core::wisdom::{FsPlanCache, PlanCache, PlanKey, Precision, TransformKind};

use super::CpuBackend;

fn naive_dft(input: &[Complex64], sign: f64) -> Vec<Complex64> {
    let n = input.len();
    (0..n)
        .map(|k| {
            input
                .iter()
                .enumerate()
                .map(|(j, &v)| {
                    let phase = sign * 2.0 * PI * (k as f64) * (j as f64) / n as f64;
                    v * Complex64::from_polar(1.0, phase)
                })
                .sum()
        })
        .collect()
}

fn deterministic_signal(len: usize, seed: u64) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let t = (i as f64 + 1.0) * (seed as f64 + 0.5);
            (0.37 * t).sin() + 0.5 * (0.61 * t).cos()
        })
        .collect()
}

fn assert_complex_close(lhs: Complex64, rhs: Complex64, tol: f64) {
    assert!(
        (lhs - rhs).norm() < tol,
        "complex numbers differ: {lhs:?} vs {rhs:?}"
    );
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("wakefield-cpu-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn r2c_matches_naive_dft_on_the_one_sided_bins() {
    let n = 16usize;
    let signal = deterministic_signal(n, 3);
    let staged: Vec<Complex64> = signal.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    let reference = naive_dft(&staged, -1.0);

    let mut backend = CpuBackend::new();
    let mut input = backend.alloc_real(n).unwrap();
    input.as_mut_slice().copy_from_slice(&signal);
    let mut output = backend.alloc_complex(n).unwrap();
    let mut plan = backend.plan_r2c(n).unwrap();
    backend.execute_r2c(&mut plan, &mut input, &mut output).unwrap();

    let spectrum = output.as_slice();
    for k in 0..=n / 2 {
        assert_complex_close(spectrum[k], reference[k], 1e-9);
    }
    // the redundant upper half is zeroed, not mirrored
    for k in n / 2 + 1..n {
        assert_complex_close(spectrum[k], Complex64::ZERO, 1e-12);
    }
}

#[test]
fn c2c_backward_matches_naive_dft() {
    let n = 12usize;
    let signal: Vec<Complex64> = deterministic_signal(n, 7)
        .iter()
        .zip(deterministic_signal(n, 11))
        .map(|(&re, im)| Complex64::new(re, im))
        .collect();
    let reference = naive_dft(&signal, 1.0);

    let mut backend = CpuBackend::new();
    let mut input = backend.alloc_complex(n).unwrap();
    input.as_mut_slice().copy_from_slice(&signal);
    let mut output = backend.alloc_complex(n).unwrap();
    let mut plan = backend.plan_c2c(n, Direction::Backward).unwrap();
    backend.execute_c2c(&mut plan, &mut input, &mut output).unwrap();

    for (&got, &want) in output.as_slice().iter().zip(reference.iter()) {
        assert_complex_close(got, want, 1e-9);
    }
}

#[test]
fn c2c_round_trip_gains_exactly_n() {
    let n = 32usize;
    let signal: Vec<Complex64> = deterministic_signal(n, 5)
        .iter()
        .map(|&v| Complex64::new(v, -v))
        .collect();

    let mut backend = CpuBackend::new();
    let mut input = backend.alloc_complex(n).unwrap();
    input.as_mut_slice().copy_from_slice(&signal);
    let mut spectrum = backend.alloc_complex(n).unwrap();
    let mut recovered = backend.alloc_complex(n).unwrap();
    let mut forward = backend.plan_c2c(n, Direction::Forward).unwrap();
    let mut backward = backend.plan_c2c(n, Direction::Backward).unwrap();
    backend
        .execute_c2c(&mut forward, &mut input, &mut spectrum)
        .unwrap();
    backend
        .execute_c2c(&mut backward, &mut spectrum, &mut recovered)
        .unwrap();

    for (&orig, &back) in signal.iter().zip(recovered.as_slice()) {
        assert_complex_close(back / n as f64, orig, 1e-9);
    }
}

#[test]
fn length_mismatches_are_rejected_not_truncated() {
    let mut backend = CpuBackend::new();
    let mut plan = backend.plan_r2c(16).unwrap();
    let mut input = backend.alloc_real(8).unwrap();
    let mut output = backend.alloc_complex(16).unwrap();
    assert!(backend.execute_r2c(&mut plan, &mut input, &mut output).is_err());
}

#[test]
fn planning_persists_and_reuses_wisdom() {
    let dir = scratch_dir("wisdom");
    let cache = Arc::new(FsPlanCache::new(&dir));

    let key = PlanKey {
        kind: TransformKind::ComplexToComplex,
        direction: Direction::Backward,
        precision: Precision::Double,
        len: 64,
    };

    let mut backend = CpuBackend::with_plan_cache(cache.clone());
    let _ = backend.plan_c2c(64, Direction::Backward).unwrap();
    let blob = cache.lookup(&key).expect("planning should persist wisdom");
    assert!(dir.join(key.file_name()).is_file());

    // a second backend resolves the same key to the same record and still
    // produces a working plan
    let mut other = CpuBackend::with_plan_cache(cache.clone());
    let mut plan = other.plan_c2c(64, Direction::Backward).unwrap();
    assert_eq!(cache.lookup(&key).as_deref(), Some(blob.as_slice()));

    let mut input = other.alloc_complex(64).unwrap();
    input.as_mut_slice()[1] = Complex64::ONE;
    let mut output = other.alloc_complex(64).unwrap();
    other.execute_c2c(&mut plan, &mut input, &mut output).unwrap();
    // a delta at bin 1 transforms to a unit-magnitude exponential
    for &value in output.as_slice() {
        assert!((value.norm() - 1.0).abs() < 1e-9);
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn corrupt_wisdom_is_ignored_and_replaced() {
    let dir = scratch_dir("corrupt");
    let cache = Arc::new(FsPlanCache::new(&dir));
    let key = PlanKey {
        kind: TransformKind::ComplexToComplex,
        direction: Direction::Forward,
        precision: Precision::Double,
        len: 48,
    };
    cache.store(&key, b"not a wisdom record");

    let mut backend = CpuBackend::with_plan_cache(cache.clone());
    let mut plan = backend.plan_c2c(48, Direction::Forward).unwrap();

    // the unreadable entry was replaced by a fresh one
    let blob = cache.lookup(&key).unwrap();
    assert_ne!(blob.as_slice(), b"not a wisdom record");

    let mut input = backend.alloc_complex(48).unwrap();
    input.as_mut_slice().fill(Complex64::ONE);
    let mut output = backend.alloc_complex(48).unwrap();
    backend.execute_c2c(&mut plan, &mut input, &mut output).unwrap();
    assert_complex_close(output.as_slice()[0], Complex64::new(48.0, 0.0), 1e-9);

    let _ = std::fs::remove_dir_all(&dir);
}

// ---------------------------------------------------------------------------
// Engine integration
// ---------------------------------------------------------------------------

struct TestMesh {
    profile: Vec<f64>,
    cells: usize,
}

impl TestMesh {
    fn new(profile: Vec<f64>) -> Self {
        let cells = profile.len();
        Self { profile, cells }
    }
}

impl DistributionMesh for TestMesh {
    fn cell_count(&self, axis: usize) -> usize {
        if axis == 0 { self.cells } else { 64 }
    }

    fn delta(&self, _axis: usize) -> f64 {
        1.0
    }

    fn scale(&self, _axis: usize) -> f64 {
        1.0
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

#[test]
fn engine_reproduces_the_analytic_impulse_wake() {
    let r = 2.5;
    let mut profile = vec![0.0; 8];
    profile[4] = 1.0;
    let mut mesh = TestMesh::new(profile);
    let impedance = FlatImpedance {
        value: Complex64::new(r, 0.0),
        count: 16,
    };
    let mut engine = FieldEngine::new(&mesh, &impedance, 1.0, CpuBackend::new()).unwrap();

    let s = engine.wake_scaling();
    let wake = engine.update_wake_potential(&mut mesh).unwrap();
    let expected = [0.0, r * s, 0.0, r * s, 8.0 * r * s, r * s, 0.0, r * s];
    for (&got, &want) in wake.iter().zip(expected.iter()) {
        assert!((got - want).abs() < 1e-9, "wake differs: {got} vs {want}");
    }
}

#[test]
fn engine_produces_finite_fields_for_a_gaussian_bunch() {
    let cells = 64usize;
    let profile: Vec<f64> = (0..cells)
        .map(|i| {
            let x = (i as f64 - cells as f64 / 2.0) / 6.0;
            (-x * x).exp()
        })
        .collect();
    let mut mesh = TestMesh::new(profile);
    let impedance = FlatImpedance {
        value: Complex64::new(3.0, 1.0),
        count: 256,
    };
    let mut engine = FieldEngine::new(&mesh, &impedance, 0.5, CpuBackend::new()).unwrap();

    let spectrum = engine.update_csr(&mut mesh, 0.0).unwrap();
    assert_eq!(spectrum.len(), 256);
    assert!(spectrum.iter().all(|s| s.is_finite() && *s >= 0.0));
    assert!(engine.csr_intensity() > 0.0);

    let wake = engine.update_wake_potential(&mut mesh).unwrap();
    assert_eq!(wake.len(), cells);
    assert!(wake.iter().all(|w| w.is_finite()));
    assert!(wake.iter().any(|&w| w != 0.0));
}
