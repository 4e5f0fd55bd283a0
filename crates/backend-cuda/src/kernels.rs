//! CUDA kernels for the pointwise field-pipeline stages.
//!
//! These kernels keep the padding, convolution, and descaling stages
//! device-resident between the two transforms, so the per-step hot path
//! never round-trips through host memory.
//!
//! All complex buffers are stored as interleaved f64 pairs
//! `[re, im, re, im, ...]`, matching the memory layout of `Complex64`.

use std::sync::Arc;

use cudarc::driver::{
    CudaContext, CudaFunction, CudaModule, CudaSlice, CudaStream, DriverError, LaunchConfig,
    PushKernelArg,
};

const KERNEL_SOURCE: &str = r#"
extern "C" {

/// Recenter the bunch profile into the zero-padded transform buffer.
/// For p < half:          padded[p] = profile[half + p]
/// For p >= n - half:     padded[p] = profile[p - (n - half)]
/// Everything in between is zeroed, so no stale samples survive.
__global__ void scatter_profile_kernel(
    double* __restrict__ padded,        // real, length n
    const double* __restrict__ profile, // real, length cells
    size_t n,
    size_t cells
) {
    size_t p = blockIdx.x * blockDim.x + threadIdx.x;
    if (p < n) {
        size_t half = cells / 2;
        if (p < half) {
            padded[p] = profile[half + p];
        } else if (p >= n - half) {
            padded[p] = profile[p - (n - half)];
        } else {
            padded[p] = 0.0;
        }
    }
}

/// One-sided wake-loss spectrum: losses[i] = impedance[i] * form[i] for
/// i < half, zero at and above (impedance at negative frequencies is zero).
__global__ void convolve_one_sided_kernel(
    double* __restrict__ losses,          // [re, im, ...] length 2*n
    const double* __restrict__ impedance, // [re, im, ...] length 2*n
    const double* __restrict__ form,      // [re, im, ...] length 2*n
    size_t n,
    size_t half
) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) {
        if (i < half) {
            double z_re = impedance[2*i];
            double z_im = impedance[2*i + 1];
            double f_re = form[2*i];
            double f_im = form[2*i + 1];
            losses[2*i]     = z_re * f_re - z_im * f_im;
            losses[2*i + 1] = z_re * f_im + z_im * f_re;
        } else {
            losses[2*i] = 0.0;
            losses[2*i + 1] = 0.0;
        }
    }
}

/// Undo the recentring on the transformed wake: real part, scaled, back in
/// natural spatial order.
/// For d >= half: source bin d - half; for d < half: source bin n - half + d.
__global__ void gather_wake_kernel(
    double* __restrict__ wake,            // real, length cells
    const double* __restrict__ wake_cplx, // [re, im, ...] length 2*n
    size_t n,
    size_t cells,
    double scaling
) {
    size_t d = blockIdx.x * blockDim.x + threadIdx.x;
    if (d < cells) {
        size_t half = cells / 2;
        size_t p = (d >= half) ? (d - half) : (n - half + d);
        wake[d] = scaling * wake_cplx[2*p];
    }
}

/// Zero the complex bins in [start, n); used to clear the redundant upper
/// half after a real-to-complex transform.
__global__ void zero_bins_kernel(
    double* __restrict__ data, // [re, im, ...] length 2*n
    size_t start,
    size_t n
) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i >= start && i < n) {
        data[2*i] = 0.0;
        data[2*i + 1] = 0.0;
    }
}

} // extern "C"
"#;

/// Compiled field-pipeline kernels.
pub struct FieldKernels {
    #[allow(dead_code)]
    module: Arc<CudaModule>,
    scatter_profile: CudaFunction,
    convolve_one_sided: CudaFunction,
    gather_wake: CudaFunction,
    zero_bins: CudaFunction,
}

impl FieldKernels {
    /// Compile and load the kernels; called once at backend construction.
    pub fn new(ctx: &Arc<CudaContext>) -> Result<Self, Box<dyn std::error::Error>> {
        log::debug!("compiling field-pipeline CUDA kernels");

        let ptx = cudarc::nvrtc::compile_ptx(KERNEL_SOURCE)?;
        let module = ctx.load_module(ptx)?;

        let scatter_profile = module.load_function("scatter_profile_kernel")?;
        let convolve_one_sided = module.load_function("convolve_one_sided_kernel")?;
        let gather_wake = module.load_function("gather_wake_kernel")?;
        let zero_bins = module.load_function("zero_bins_kernel")?;

        log::debug!("field-pipeline CUDA kernels compiled");

        Ok(Self {
            module,
            scatter_profile,
            convolve_one_sided,
            gather_wake,
            zero_bins,
        })
    }

    fn launch_config(n: usize) -> LaunchConfig {
        const BLOCK_SIZE: u32 = 256;
        let grid_size = ((n as u32) + BLOCK_SIZE - 1) / BLOCK_SIZE;
        LaunchConfig {
            grid_dim: (grid_size, 1, 1),
            block_dim: (BLOCK_SIZE, 1, 1),
            shared_mem_bytes: 0,
        }
    }

    /// Scatter `cells` profile samples into the length-`n` padded buffer.
    ///
    /// # Safety
    /// `padded` must hold `n` f64 values, `profile` must hold `cells`.
    pub unsafe fn scatter_profile(
        &self,
        stream: &CudaStream,
        padded: &mut CudaSlice<f64>,
        profile: &CudaSlice<f64>,
        n: usize,
        cells: usize,
    ) -> Result<(), DriverError> {
        let cfg = Self::launch_config(n);
        stream
            .launch_builder(&self.scatter_profile)
            .arg(padded)
            .arg(profile)
            .arg(&n)
            .arg(&cells)
            .launch(cfg)?;
        Ok(())
    }

    /// Multiply impedance and form factor into the wake-loss buffer,
    /// zeroing bins at and above `half`.
    ///
    /// # Safety
    /// All three buffers must hold `n` complex elements (2n f64).
    pub unsafe fn convolve_one_sided(
        &self,
        stream: &CudaStream,
        losses: &mut CudaSlice<f64>,
        impedance: &CudaSlice<f64>,
        form: &CudaSlice<f64>,
        n: usize,
        half: usize,
    ) -> Result<(), DriverError> {
        let cfg = Self::launch_config(n);
        stream
            .launch_builder(&self.convolve_one_sided)
            .arg(losses)
            .arg(impedance)
            .arg(form)
            .arg(&n)
            .arg(&half)
            .launch(cfg)?;
        Ok(())
    }

    /// Descale and unshift the complex wake into the spatial wake buffer.
    ///
    /// # Safety
    /// `wake` must hold `cells` f64 values, `wake_cplx` `n` complex ones.
    pub unsafe fn gather_wake(
        &self,
        stream: &CudaStream,
        wake: &mut CudaSlice<f64>,
        wake_cplx: &CudaSlice<f64>,
        n: usize,
        cells: usize,
        scaling: f64,
    ) -> Result<(), DriverError> {
        let cfg = Self::launch_config(cells);
        stream
            .launch_builder(&self.gather_wake)
            .arg(wake)
            .arg(wake_cplx)
            .arg(&n)
            .arg(&cells)
            .arg(&scaling)
            .launch(cfg)?;
        Ok(())
    }

    /// Zero complex bins `start..n` of a spectrum buffer.
    ///
    /// # Safety
    /// `data` must hold `n` complex elements (2n f64).
    pub unsafe fn zero_bins(
        &self,
        stream: &CudaStream,
        data: &mut CudaSlice<f64>,
        start: usize,
        n: usize,
    ) -> Result<(), DriverError> {
        let cfg = Self::launch_config(n);
        stream
            .launch_builder(&self.zero_bins)
            .arg(data)
            .arg(&start)
            .arg(&n)
            .launch(cfg)?;
        Ok(())
    }
}
