//! Backend traits for the transform pipeline.
//!
//! # Conventions
//!
//! - Forward transforms use the `e^{-2πi kn/N}` sign, backward transforms
//!   `e^{+2πi kn/N}`; neither is normalized. A forward/backward round trip
//!   therefore yields the input times `N`.
//! - The real-to-complex transform writes bins `0..=n/2` of its length-`n`
//!   complex output and zeroes the redundant upper half, so the output can
//!   be consumed directly as a one-sided spectrum.
//!
//! Backends must agree on both conventions; the field engine relies on them
//! for bin alignment and for a single wake-scaling factor shared by the
//! host and device paths.

use num_complex::Complex64;

/// Transform direction for complex-to-complex plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

/// Copy direction between the host and device views of a mirrored buffer.
///
/// The two directions are mutually exclusive; a sync call performs exactly
/// one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    HostToDevice,
    DeviceToHost,
}

/// Errors from buffer allocation, plan creation, and plan execution.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("buffer allocation of {len} elements failed")]
    Allocation { len: usize },

    #[error("transform planning failed for length {len}: {reason}")]
    Planning { len: usize, reason: String },

    #[error("transform execution failed: {0}")]
    Execution(String),

    #[error("buffer length {got} does not match expected {expected}")]
    Length { got: usize, expected: usize },

    #[error("backend is not available: {0}")]
    Unavailable(&'static str),
}

/// A fixed-length numeric buffer owned by a backend.
///
/// Device backends mirror the data between host and device memory; the
/// slice accessors always expose the host view (synchronizing lazily where
/// needed), while `sync` performs an explicit bulk copy.
pub trait SignalBuffer<T> {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_slice(&self) -> &[T];

    fn as_mut_slice(&mut self) -> &mut [T];

    /// Copy between the host and device views. Host-only buffers have
    /// nothing to mirror; the default does nothing.
    fn sync(&mut self, _direction: CopyDirection) {}
}

/// Owning host-memory buffer handle.
#[derive(Debug, Clone)]
pub struct HostBuffer<T> {
    data: Vec<T>,
}

impl<T: Copy + Default> HostBuffer<T> {
    /// Allocate a zeroed buffer, reporting exhaustion instead of aborting.
    pub fn zeroed(len: usize) -> Result<Self, BackendError> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| BackendError::Allocation { len })?;
        data.resize(len, T::default());
        Ok(Self { data })
    }
}

impl<T> SignalBuffer<T> for HostBuffer<T> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn as_slice(&self) -> &[T] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Capability interface for the forward/backward transform pipeline.
///
/// The field engine depends only on this trait; a host implementation and a
/// device implementation are interchangeable behind it. Plans are bound to
/// a transform length at creation and released when dropped.
///
/// The three pointwise stages (`scatter_profile`, `convolve_one_sided`,
/// `gather_wake`) have host-slice default implementations. A device backend
/// may override them with resident kernels to keep the hot path off the
/// host; the defaults remain the semantic reference either way.
pub trait TransformBackend {
    type Real: SignalBuffer<f64>;
    type Complex: SignalBuffer<Complex64>;
    type R2cPlan;
    type C2cPlan;

    fn alloc_real(&mut self, len: usize) -> Result<Self::Real, BackendError>;

    fn alloc_complex(&mut self, len: usize) -> Result<Self::Complex, BackendError>;

    /// Create a forward real-to-complex plan for transforms of `len` samples.
    fn plan_r2c(&mut self, len: usize) -> Result<Self::R2cPlan, BackendError>;

    /// Create a complex-to-complex plan for transforms of `len` samples.
    fn plan_c2c(&mut self, len: usize, direction: Direction)
    -> Result<Self::C2cPlan, BackendError>;

    /// Execute a real-to-complex plan. `input` may be used as scratch.
    fn execute_r2c(
        &mut self,
        plan: &mut Self::R2cPlan,
        input: &mut Self::Real,
        output: &mut Self::Complex,
    ) -> Result<(), BackendError>;

    /// Execute a complex-to-complex plan out of place.
    fn execute_c2c(
        &mut self,
        plan: &mut Self::C2cPlan,
        input: &mut Self::Complex,
        output: &mut Self::Complex,
    ) -> Result<(), BackendError>;

    /// Recenter a periodic bunch profile into the zero-padded transform
    /// buffer: the second half of the profile lands at the head of the
    /// buffer, the first half wraps to its tail, everything between is
    /// zeroed. The profile length must be even and no longer than the
    /// buffer.
    fn scatter_profile(
        &mut self,
        profile: &[f64],
        padded: &mut Self::Real,
    ) -> Result<(), BackendError> {
        let cells = profile.len();
        let half = cells / 2;
        let data = padded.as_mut_slice();
        let n = data.len();
        if n < cells {
            return Err(BackendError::Length {
                got: n,
                expected: cells,
            });
        }
        data.fill(0.0);
        data[..half].copy_from_slice(&profile[half..]);
        data[n - half..].copy_from_slice(&profile[..half]);
        Ok(())
    }

    /// Build the wake-loss spectrum: `wake_losses[i] = impedance[i] ·
    /// form_factor[i]` for bins below `n/2`, zero at and above. Dropping the
    /// upper bins treats the impedance at negative frequencies as zero (a
    /// causal, one-sided response).
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
        let half = n / 2;
        let z = impedance.as_slice();
        let form = form_factor.as_slice();
        let losses = wake_losses.as_mut_slice();
        for i in 0..half {
            losses[i] = z[i] * form[i];
        }
        losses[half..].fill(Complex64::ZERO);
        Ok(())
    }

    /// Undo the recentring of `scatter_profile` on the transformed wake:
    /// take the real part of the padded complex wake, multiply by `scaling`,
    /// and place the samples back in natural spatial order.
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
        let half = cells / 2;
        let src = wake_complex.as_slice();
        let dst = wake.as_mut_slice();
        for i in 0..half {
            dst[half + i] = src[i].re * scaling;
            dst[half - 1 - i] = src[n - 1 - i].re * scaling;
        }
        Ok(())
    }
}
