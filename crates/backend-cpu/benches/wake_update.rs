use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use num_complex::Complex64;

use wakefield_backend_cpu::CpuBackend;
use wakefield_core::engine::FieldEngine;
use wakefield_core::impedance::Impedance;
use wakefield_core::mesh::DistributionMesh;

struct BenchMesh {
    profile: Vec<f64>,
}

impl BenchMesh {
    fn gaussian(cells: usize) -> Self {
        let profile = (0..cells)
            .map(|i| {
                let x = (i as f64 - cells as f64 / 2.0) / (cells as f64 / 12.0);
                (-x * x).exp()
            })
            .collect();
        Self { profile }
    }
}

impl DistributionMesh for BenchMesh {
    fn cell_count(&self, axis: usize) -> usize {
        if axis == 0 { self.profile.len() } else { 256 }
    }

    fn delta(&self, _axis: usize) -> f64 {
        1e-3
    }

    fn scale(&self, _axis: usize) -> f64 {
        1.0
    }

    fn longitudinal_profile(&mut self) -> &[f64] {
        &self.profile
    }
}

struct ResistiveImpedance {
    count: usize,
}

impl Impedance for ResistiveImpedance {
    fn frequency_count(&self) -> usize {
        self.count
    }

    fn value(&self, index: usize) -> Complex64 {
        let f = index as f64 / self.count as f64;
        Complex64::new(1.0 + f.sqrt(), -f)
    }
}

fn bench_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_updates");
    for cells in [256usize, 1024] {
        let mut mesh = BenchMesh::gaussian(cells);
        let impedance = ResistiveImpedance { count: 4 * cells };
        let mut engine =
            FieldEngine::new(&mesh, &impedance, 1.0, CpuBackend::new()).expect("engine setup");

        group.bench_with_input(BenchmarkId::new("csr", cells), &cells, |b, _| {
            b.iter(|| {
                let spectrum = engine.update_csr(&mut mesh, 0.2).expect("csr update");
                black_box(spectrum[0]);
            })
        });

        let mut engine =
            FieldEngine::new(&mesh, &impedance, 1.0, CpuBackend::new()).expect("engine setup");
        group.bench_with_input(BenchmarkId::new("wake", cells), &cells, |b, _| {
            b.iter(|| {
                let wake = engine.update_wake_potential(&mut mesh).expect("wake update");
                black_box(wake[0]);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_updates);
criterion_main!(benches);
