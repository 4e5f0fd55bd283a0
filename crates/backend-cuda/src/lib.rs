//! CUDA transform backend using cudarc and cuFFT when enabled.
//!
//! # Memory model
//!
//! [`DeviceBuffer`] keeps each logical buffer resident on the device and
//! mirrors it into host memory on demand:
//! - device kernels and cuFFT work on device memory directly
//! - `as_slice()` / `as_mut_slice()` expose the host view, synchronizing
//!   lazily when the other side holds newer data
//! - `sync(CopyDirection)` performs an explicit bulk copy in exactly one
//!   direction
//!
//! The pointwise pipeline stages override the trait defaults with NVRTC
//! kernels, so between the upload of the bunch profile and the readback of
//! the wake potential the hot path stays on the device. Every stage ends
//! with a stream synchronize: the stages form a strict dependency chain and
//! never overlap speculatively.
//!
//! Without the `cuda` feature the crate compiles to a stub whose backend
//! cannot be constructed; plan creation reports the backend as unavailable
//! instead of silently computing nothing.

#[cfg(feature = "cuda")]
mod cufft;
#[cfg(feature = "cuda")]
mod cufft_sys;
#[cfg(feature = "cuda")]
mod kernels;

#[cfg(feature = "cuda")]
pub use gpu::{CudaBackend, DeviceBuffer};

#[cfg(not(feature = "cuda"))]
pub use stub::CudaBackend;

#[cfg(feature = "cuda")]
mod gpu {
    use std::cell::{Cell, UnsafeCell};
    use std::sync::Arc;

    use cudarc::driver::{CudaContext, CudaSlice, CudaStream};
    use num_complex::Complex64;

    use wakefield_core::backend::{
        BackendError, CopyDirection, Direction, SignalBuffer, TransformBackend,
    };

    use crate::cufft::{CufftPlanD2z, CufftPlanZ2z};
    use crate::kernels::FieldKernels;

    fn exec_err(err: impl std::fmt::Display) -> BackendError {
        BackendError::Execution(err.to_string())
    }

    /// Device-resident buffer with a lazily synchronized host mirror.
    ///
    /// `T` is `f64` or `Complex64`; the device side always stores plain f64
    /// words (complex values as interleaved pairs), which lets one
    /// allocation serve both cuFFT and the pointwise kernels.
    ///
    /// Interior mutability (`UnsafeCell` + `Cell` flags) lets `as_slice()`
    /// refresh the host mirror behind `&self`; the synchronization is
    /// logically const. The type is deliberately `!Sync` — one engine
    /// instance is single-threaded per step.
    pub struct DeviceBuffer<T> {
        device: UnsafeCell<CudaSlice<f64>>,
        host: UnsafeCell<Vec<T>>,
        stream: Arc<CudaStream>,
        /// Device holds newer data than the host mirror.
        host_dirty: Cell<bool>,
        /// Host mirror holds newer data than the device.
        device_dirty: Cell<bool>,
    }

    impl<T: bytemuck::Pod + Default> DeviceBuffer<T> {
        fn zeros(stream: Arc<CudaStream>, len: usize) -> Result<Self, BackendError> {
            let words = len * size_of::<T>() / size_of::<f64>();
            let device = stream
                .alloc_zeros::<f64>(words)
                .map_err(|_| BackendError::Allocation { len })?;
            Ok(Self {
                device: UnsafeCell::new(device),
                host: UnsafeCell::new(vec![T::default(); len]),
                stream,
                host_dirty: Cell::new(false),
                device_dirty: Cell::new(false),
            })
        }

        fn ensure_host_current(&self) {
            if self.host_dirty.get() {
                // Safety: single-threaded access, no aliased references
                let host = unsafe { &mut *self.host.get() };
                let device = unsafe { &*self.device.get() };
                self.stream
                    .memcpy_dtoh(device, bytemuck::cast_slice_mut(host.as_mut_slice()))
                    .expect("device to host copy failed");
                self.host_dirty.set(false);
            }
        }

        fn ensure_device_current(&self) {
            if self.device_dirty.get() {
                // Safety: single-threaded access, no aliased references
                let host = unsafe { &*self.host.get() };
                let device = unsafe { &mut *self.device.get() };
                self.stream
                    .memcpy_htod(bytemuck::cast_slice(host.as_slice()), device)
                    .expect("host to device copy failed");
                self.device_dirty.set(false);
            }
        }

        /// Read access to current device data.
        fn with_device<R>(&self, f: impl FnOnce(&CudaSlice<f64>) -> R) -> R {
            self.ensure_device_current();
            // Safety: single-threaded access, no aliased references
            f(unsafe { &*self.device.get() })
        }

        /// Read-modify-write access to current device data.
        fn with_device_mut<R>(&self, f: impl FnOnce(&mut CudaSlice<f64>) -> R) -> R {
            self.ensure_device_current();
            // Safety: single-threaded access, no aliased references
            let result = f(unsafe { &mut *self.device.get() });
            self.host_dirty.set(true);
            result
        }

        /// Write-only access: the previous contents are overwritten in
        /// full, so a stale device side needs no upload first.
        fn with_device_overwrite<R>(&self, f: impl FnOnce(&mut CudaSlice<f64>) -> R) -> R {
            // Safety: single-threaded access, no aliased references
            let result = f(unsafe { &mut *self.device.get() });
            self.device_dirty.set(false);
            self.host_dirty.set(true);
            result
        }
    }

    impl<T: bytemuck::Pod + Default> SignalBuffer<T> for DeviceBuffer<T> {
        fn len(&self) -> usize {
            // Safety: length never changes after construction
            unsafe { &*self.host.get() }.len()
        }

        fn as_slice(&self) -> &[T] {
            self.ensure_host_current();
            // Safety: single-threaded access; the reference lives as long
            // as &self and no mutation happens behind it
            unsafe { &*self.host.get() }
        }

        fn as_mut_slice(&mut self) -> &mut [T] {
            self.ensure_host_current();
            self.device_dirty.set(true);
            // Safety: &mut self guarantees exclusive access
            unsafe { &mut *self.host.get() }
        }

        fn sync(&mut self, direction: CopyDirection) {
            // Safety: &mut self guarantees exclusive access
            match direction {
                CopyDirection::HostToDevice => {
                    let host = unsafe { &*self.host.get() };
                    let device = unsafe { &mut *self.device.get() };
                    self.stream
                        .memcpy_htod(bytemuck::cast_slice(host.as_slice()), device)
                        .expect("host to device copy failed");
                    self.device_dirty.set(false);
                }
                CopyDirection::DeviceToHost => {
                    let host = unsafe { &mut *self.host.get() };
                    let device = unsafe { &*self.device.get() };
                    self.stream
                        .memcpy_dtoh(device, bytemuck::cast_slice_mut(host.as_mut_slice()))
                        .expect("device to host copy failed");
                    self.host_dirty.set(false);
                }
            }
        }
    }

    /// CUDA backend for device-resident field transforms.
    pub struct CudaBackend {
        #[allow(dead_code)]
        ctx: Arc<CudaContext>,
        stream: Arc<CudaStream>,
        kernels: FieldKernels,
        /// Device staging area for the uploaded bunch profile, reused
        /// across steps.
        profile_scratch: Option<CudaSlice<f64>>,
    }

    impl CudaBackend {
        /// Create a backend on device 0; `None` when no device is usable.
        pub fn try_new() -> Option<Self> {
            let ctx = CudaContext::new(0).ok()?;
            let stream = ctx.default_stream();
            let kernels = FieldKernels::new(&ctx)
                .map_err(|err| log::warn!("CUDA kernel compilation failed: {err}"))
                .ok()?;
            Some(Self {
                ctx,
                stream,
                kernels,
                profile_scratch: None,
            })
        }

        /// Check device availability at runtime.
        pub fn is_available() -> bool {
            CudaContext::new(0).is_ok()
        }

        pub fn stream(&self) -> &Arc<CudaStream> {
            &self.stream
        }

        fn barrier(&self) -> Result<(), BackendError> {
            self.stream.synchronize().map_err(exec_err)
        }

        fn upload_profile(&mut self, profile: &[f64]) -> Result<(), BackendError> {
            let needs_alloc = self
                .profile_scratch
                .as_ref()
                .is_none_or(|s| s.len() != profile.len());
            if needs_alloc {
                let fresh = self
                    .stream
                    .alloc_zeros::<f64>(profile.len())
                    .map_err(|_| BackendError::Allocation { len: profile.len() })?;
                self.profile_scratch = Some(fresh);
            }
            let scratch = self
                .profile_scratch
                .as_mut()
                .ok_or(BackendError::Unavailable("profile scratch missing"))?;
            self.stream
                .memcpy_htod(profile, scratch)
                .map_err(exec_err)?;
            Ok(())
        }
    }

    impl TransformBackend for CudaBackend {
        type Real = DeviceBuffer<f64>;
        type Complex = DeviceBuffer<Complex64>;
        type R2cPlan = CufftPlanD2z;
        type C2cPlan = CufftPlanZ2z;

        fn alloc_real(&mut self, len: usize) -> Result<Self::Real, BackendError> {
            DeviceBuffer::zeros(Arc::clone(&self.stream), len)
        }

        fn alloc_complex(&mut self, len: usize) -> Result<Self::Complex, BackendError> {
            DeviceBuffer::zeros(Arc::clone(&self.stream), len)
        }

        fn plan_r2c(&mut self, len: usize) -> Result<Self::R2cPlan, BackendError> {
            // cuFFT performs and caches its own planning; the file-backed
            // wisdom cache is not consulted here
            let plan = CufftPlanD2z::new(len).map_err(|err| BackendError::Planning {
                len,
                reason: err.to_string(),
            })?;
            plan.set_stream(&self.stream)
                .map_err(|err| BackendError::Planning {
                    len,
                    reason: err.to_string(),
                })?;
            Ok(plan)
        }

        fn plan_c2c(
            &mut self,
            len: usize,
            direction: Direction,
        ) -> Result<Self::C2cPlan, BackendError> {
            let plan =
                CufftPlanZ2z::new(len, direction).map_err(|err| BackendError::Planning {
                    len,
                    reason: err.to_string(),
                })?;
            plan.set_stream(&self.stream)
                .map_err(|err| BackendError::Planning {
                    len,
                    reason: err.to_string(),
                })?;
            Ok(plan)
        }

        fn execute_r2c(
            &mut self,
            plan: &mut Self::R2cPlan,
            input: &mut Self::Real,
            output: &mut Self::Complex,
        ) -> Result<(), BackendError> {
            let n = plan.len();
            if input.len() != n {
                return Err(BackendError::Length {
                    got: input.len(),
                    expected: n,
                });
            }
            if output.len() != n {
                return Err(BackendError::Length {
                    got: output.len(),
                    expected: n,
                });
            }
            input.with_device_mut(|i| {
                output.with_device_overwrite(|o| plan.execute(i, o, &self.stream))
            })
            .map_err(exec_err)?;
            // cuFFT writes only the one-sided bins; clear the redundant
            // upper half so the buffer is a valid one-sided spectrum
            output
                .with_device_mut(|o| unsafe {
                    self.kernels.zero_bins(&self.stream, o, n / 2 + 1, n)
                })
                .map_err(exec_err)?;
            self.barrier()
        }

        fn execute_c2c(
            &mut self,
            plan: &mut Self::C2cPlan,
            input: &mut Self::Complex,
            output: &mut Self::Complex,
        ) -> Result<(), BackendError> {
            let n = plan.len();
            if input.len() != n {
                return Err(BackendError::Length {
                    got: input.len(),
                    expected: n,
                });
            }
            if output.len() != n {
                return Err(BackendError::Length {
                    got: output.len(),
                    expected: n,
                });
            }
            input.with_device_mut(|i| {
                output.with_device_overwrite(|o| plan.execute(i, o, &self.stream))
            })
            .map_err(exec_err)?;
            self.barrier()
        }

        fn scatter_profile(
            &mut self,
            profile: &[f64],
            padded: &mut Self::Real,
        ) -> Result<(), BackendError> {
            let n = padded.len();
            let cells = profile.len();
            if n < cells {
                return Err(BackendError::Length {
                    got: n,
                    expected: cells,
                });
            }
            self.upload_profile(profile)?;
            let scratch = self
                .profile_scratch
                .as_ref()
                .ok_or(BackendError::Unavailable("profile scratch missing"))?;
            padded
                .with_device_overwrite(|p| unsafe {
                    self.kernels
                        .scatter_profile(&self.stream, p, scratch, n, cells)
                })
                .map_err(exec_err)?;
            self.barrier()
        }

        fn convolve_one_sided(
            &mut self,
            impedance: &Self::Complex,
            form_factor: &Self::Complex,
            wake_losses: &mut Self::Complex,
        ) -> Result<(), BackendError> {
            let n = wake_losses.len();
            if impedance.len() != n || form_factor.len() != n {
                return Err(BackendError::Length {
                    got: impedance.len().min(form_factor.len()),
                    expected: n,
                });
            }
            impedance.with_device(|z| {
                form_factor.with_device(|f| {
                    wake_losses.with_device_overwrite(|w| unsafe {
                        self.kernels
                            .convolve_one_sided(&self.stream, w, z, f, n, n / 2)
                    })
                })
            })
            .map_err(exec_err)?;
            self.barrier()
        }

        fn gather_wake(
            &mut self,
            wake_complex: &Self::Complex,
            scaling: f64,
            wake: &mut Self::Real,
        ) -> Result<(), BackendError> {
            let n = wake_complex.len();
            let cells = wake.len();
            if n < cells {
                return Err(BackendError::Length {
                    got: n,
                    expected: cells,
                });
            }
            wake_complex
                .with_device(|src| {
                    wake.with_device_overwrite(|dst| unsafe {
                        self.kernels
                            .gather_wake(&self.stream, dst, src, n, cells, scaling)
                    })
                })
                .map_err(exec_err)?;
            self.barrier()
        }
    }
}

#[cfg(not(feature = "cuda"))]
mod stub {
    use num_complex::Complex64;

    use wakefield_core::backend::{BackendError, Direction, HostBuffer, TransformBackend};

    const UNAVAILABLE: &str = "wakefield-backend-cuda was compiled without the `cuda` feature";

    /// Stub backend: reports unavailability instead of computing nothing.
    pub struct CudaBackend {
        _private: (),
    }

    impl CudaBackend {
        /// Always `None` without the `cuda` feature.
        pub fn try_new() -> Option<Self> {
            None
        }

        pub fn is_available() -> bool {
            false
        }
    }

    impl TransformBackend for CudaBackend {
        type Real = HostBuffer<f64>;
        type Complex = HostBuffer<Complex64>;
        type R2cPlan = ();
        type C2cPlan = ();

        fn alloc_real(&mut self, _len: usize) -> Result<Self::Real, BackendError> {
            Err(BackendError::Unavailable(UNAVAILABLE))
        }

        fn alloc_complex(&mut self, _len: usize) -> Result<Self::Complex, BackendError> {
            Err(BackendError::Unavailable(UNAVAILABLE))
        }

        fn plan_r2c(&mut self, _len: usize) -> Result<Self::R2cPlan, BackendError> {
            Err(BackendError::Unavailable(UNAVAILABLE))
        }

        fn plan_c2c(
            &mut self,
            _len: usize,
            _direction: Direction,
        ) -> Result<Self::C2cPlan, BackendError> {
            Err(BackendError::Unavailable(UNAVAILABLE))
        }

        fn execute_r2c(
            &mut self,
            _plan: &mut Self::R2cPlan,
            _input: &mut Self::Real,
            _output: &mut Self::Complex,
        ) -> Result<(), BackendError> {
            Err(BackendError::Unavailable(UNAVAILABLE))
        }

        fn execute_c2c(
            &mut self,
            _plan: &mut Self::C2cPlan,
            _input: &mut Self::Complex,
            _output: &mut Self::Complex,
        ) -> Result<(), BackendError> {
            Err(BackendError::Unavailable(UNAVAILABLE))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    #[cfg(not(feature = "cuda"))]
    fn stub_backend_is_unavailable() {
        assert!(!CudaBackend::is_available());
        assert!(CudaBackend::try_new().is_none());
    }

    #[cfg(feature = "cuda")]
    mod gpu_tests {
        use num_complex::Complex64;

        use wakefield_backend_cpu::CpuBackend;
        use wakefield_core::backend::{CopyDirection, Direction, SignalBuffer, TransformBackend};
        use wakefield_core::engine::FieldEngine;
        use wakefield_core::impedance::Impedance;
        use wakefield_core::mesh::DistributionMesh;

        use super::super::CudaBackend;

        fn skip_without_cuda() -> Option<CudaBackend> {
            let backend = CudaBackend::try_new();
            if backend.is_none() {
                eprintln!("skipping: no usable CUDA device");
            }
            backend
        }

        struct TestMesh {
            profile: Vec<f64>,
        }

        impl DistributionMesh for TestMesh {
            fn cell_count(&self, axis: usize) -> usize {
                if axis == 0 { self.profile.len() } else { 32 }
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

        struct RampImpedance {
            count: usize,
        }

        impl Impedance for RampImpedance {
            fn frequency_count(&self) -> usize {
                self.count
            }

            fn value(&self, index: usize) -> Complex64 {
                let f = index as f64 / self.count as f64;
                Complex64::new(1.0 + 2.0 * f, -0.5 * f)
            }
        }

        fn gaussian_profile(cells: usize) -> Vec<f64> {
            (0..cells)
                .map(|i| {
                    let x = (i as f64 - cells as f64 / 2.0) / (cells as f64 / 8.0);
                    (-x * x).exp()
                })
                .collect()
        }

        #[test]
        fn device_buffer_round_trips_through_explicit_sync() {
            let Some(mut backend) = skip_without_cuda() else {
                return;
            };
            let mut buffer = backend.alloc_complex(16).unwrap();
            for (i, value) in buffer.as_mut_slice().iter_mut().enumerate() {
                *value = Complex64::new(i as f64, -(i as f64));
            }
            buffer.sync(CopyDirection::HostToDevice);
            buffer.sync(CopyDirection::DeviceToHost);
            for (i, &value) in buffer.as_slice().iter().enumerate() {
                assert_eq!(value, Complex64::new(i as f64, -(i as f64)));
            }
        }

        #[test]
        fn device_transforms_match_the_host_backend() {
            let Some(mut gpu) = skip_without_cuda() else {
                return;
            };
            let mut cpu = CpuBackend::new();
            let n = 64usize;
            let signal: Vec<f64> = (0..n).map(|i| (0.17 * i as f64).sin()).collect();

            let mut gpu_in = gpu.alloc_real(n).unwrap();
            gpu_in.as_mut_slice().copy_from_slice(&signal);
            let mut gpu_out = gpu.alloc_complex(n).unwrap();
            let mut gpu_plan = gpu.plan_r2c(n).unwrap();
            gpu.execute_r2c(&mut gpu_plan, &mut gpu_in, &mut gpu_out).unwrap();

            let mut cpu_in = cpu.alloc_real(n).unwrap();
            cpu_in.as_mut_slice().copy_from_slice(&signal);
            let mut cpu_out = cpu.alloc_complex(n).unwrap();
            let mut cpu_plan = cpu.plan_r2c(n).unwrap();
            cpu.execute_r2c(&mut cpu_plan, &mut cpu_in, &mut cpu_out).unwrap();

            for (&g, &c) in gpu_out.as_slice().iter().zip(cpu_out.as_slice()) {
                assert!((g - c).norm() < 1e-9, "spectra differ: {g:?} vs {c:?}");
            }

            let mut gpu_back = gpu.alloc_complex(n).unwrap();
            let mut gpu_bwd = gpu.plan_c2c(n, Direction::Backward).unwrap();
            gpu.execute_c2c(&mut gpu_bwd, &mut gpu_out, &mut gpu_back).unwrap();

            let mut cpu_back = cpu.alloc_complex(n).unwrap();
            let mut cpu_bwd = cpu.plan_c2c(n, Direction::Backward).unwrap();
            cpu.execute_c2c(&mut cpu_bwd, &mut cpu_out, &mut cpu_back).unwrap();

            for (&g, &c) in gpu_back.as_slice().iter().zip(cpu_back.as_slice()) {
                assert!((g - c).norm() < 1e-9, "transforms differ: {g:?} vs {c:?}");
            }
        }

        #[test]
        fn engines_agree_across_backends() {
            let Some(gpu) = skip_without_cuda() else {
                return;
            };
            let mut mesh = TestMesh {
                profile: gaussian_profile(32),
            };
            let impedance = RampImpedance { count: 128 };

            let mut host_engine =
                FieldEngine::new(&mesh, &impedance, 1.5, CpuBackend::new()).unwrap();
            let mut device_engine = FieldEngine::new(&mesh, &impedance, 1.5, gpu).unwrap();

            let host_spectrum = host_engine.update_csr(&mut mesh, 0.3).unwrap().to_vec();
            let device_spectrum = device_engine.update_csr(&mut mesh, 0.3).unwrap().to_vec();
            for (&h, &d) in host_spectrum.iter().zip(device_spectrum.iter()) {
                assert!((h - d).abs() < 1e-9, "CSR spectra differ: {h} vs {d}");
            }
            assert!(
                (host_engine.csr_intensity() - device_engine.csr_intensity()).abs() < 1e-9
            );

            let host_wake = host_engine.update_wake_potential(&mut mesh).unwrap().to_vec();
            let device_wake = device_engine
                .update_wake_potential(&mut mesh)
                .unwrap()
                .to_vec();
            for (&h, &d) in host_wake.iter().zip(device_wake.iter()) {
                assert!((h - d).abs() < 1e-9, "wake potentials differ: {h} vs {d}");
            }
        }
    }
}
