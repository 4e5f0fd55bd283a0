//! Safe Rust wrappers for 1D cuFFT double-precision transforms.
//!
//! RAII plan types for the two transform shapes the field pipeline needs:
//! forward real-to-complex (D2Z) and complex-to-complex (Z2Z) in either
//! direction. Plans are created once per transform length and reused for
//! every execution; cuFFT caches its own planning internally, so no
//! file-backed wisdom is consulted here.

use std::sync::Arc;

use cudarc::driver::{CudaSlice, CudaStream, DevicePtrMut};

use wakefield_core::backend::Direction;

use crate::cufft_sys::{
    CUFFT_FORWARD, CUFFT_INVERSE, CufftError, cudaStream_t, cufftDestroy, cufftDoubleComplex,
    cufftDoubleReal, cufftExecD2Z, cufftExecZ2Z, cufftHandle, cufftPlan1d, cufftSetStream,
    cufftType,
};

/// A 1D forward real-to-complex (D2Z) plan.
///
/// cuFFT plans are thread-safe for execution but not for creation or
/// destruction; the type is `Send` but not `Sync`.
pub struct CufftPlanD2z {
    handle: cufftHandle,
    len: usize,
}

unsafe impl Send for CufftPlanD2z {}

impl CufftPlanD2z {
    pub fn new(len: usize) -> Result<Self, CufftError> {
        let mut handle: cufftHandle = 0;
        unsafe {
            cufftPlan1d(&mut handle, len as i32, cufftType::CUFFT_D2Z, 1).to_result()?;
        }
        Ok(Self { handle, len })
    }

    pub fn set_stream(&self, stream: &Arc<CudaStream>) -> Result<(), CufftError> {
        let stream_ptr = stream.cu_stream() as cudaStream_t;
        unsafe { cufftSetStream(self.handle, stream_ptr).to_result() }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Executes the forward transform.
    ///
    /// `input` holds `len` real samples; `output` holds at least
    /// `2*(len/2 + 1)` f64 values as interleaved complex pairs. Only the
    /// one-sided bins are written; the caller zeroes the remainder.
    ///
    /// # Panics
    /// Panics on buffer-length mismatch (programmer error, not runtime
    /// input).
    pub fn execute(
        &self,
        input: &mut CudaSlice<f64>,
        output: &mut CudaSlice<f64>,
        stream: &Arc<CudaStream>,
    ) -> Result<(), CufftError> {
        assert_eq!(input.len(), self.len, "D2Z input length mismatch");
        assert!(
            output.len() >= 2 * (self.len / 2 + 1),
            "D2Z output too short for one-sided bins"
        );
        let in_ptr = input.device_ptr_mut(stream).0 as *mut cufftDoubleReal;
        let out_ptr = output.device_ptr_mut(stream).0 as *mut cufftDoubleComplex;
        unsafe { cufftExecD2Z(self.handle, in_ptr, out_ptr).to_result() }
    }
}

impl Drop for CufftPlanD2z {
    fn drop(&mut self) {
        // nothing useful to do about a failed destroy
        unsafe {
            let _ = cufftDestroy(self.handle);
        }
    }
}

/// A 1D complex-to-complex (Z2Z) plan bound to one direction.
pub struct CufftPlanZ2z {
    handle: cufftHandle,
    len: usize,
    direction: Direction,
}

unsafe impl Send for CufftPlanZ2z {}

impl CufftPlanZ2z {
    pub fn new(len: usize, direction: Direction) -> Result<Self, CufftError> {
        let mut handle: cufftHandle = 0;
        unsafe {
            cufftPlan1d(&mut handle, len as i32, cufftType::CUFFT_Z2Z, 1).to_result()?;
        }
        Ok(Self {
            handle,
            len,
            direction,
        })
    }

    pub fn set_stream(&self, stream: &Arc<CudaStream>) -> Result<(), CufftError> {
        let stream_ptr = stream.cu_stream() as cudaStream_t;
        unsafe { cufftSetStream(self.handle, stream_ptr).to_result() }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Executes the transform out of place in the plan's direction.
    ///
    /// Both buffers hold `len` complex values as `2*len` interleaved f64
    /// pairs. The transform is unnormalized in both directions.
    ///
    /// # Panics
    /// Panics on buffer-length mismatch.
    pub fn execute(
        &self,
        input: &mut CudaSlice<f64>,
        output: &mut CudaSlice<f64>,
        stream: &Arc<CudaStream>,
    ) -> Result<(), CufftError> {
        assert_eq!(input.len(), 2 * self.len, "Z2Z input length mismatch");
        assert_eq!(output.len(), 2 * self.len, "Z2Z output length mismatch");
        let sign = match self.direction {
            Direction::Forward => CUFFT_FORWARD,
            Direction::Backward => CUFFT_INVERSE,
        };
        let in_ptr = input.device_ptr_mut(stream).0 as *mut cufftDoubleComplex;
        let out_ptr = output.device_ptr_mut(stream).0 as *mut cufftDoubleComplex;
        unsafe { cufftExecZ2Z(self.handle, in_ptr, out_ptr, sign).to_result() }
    }
}

impl Drop for CufftPlanZ2z {
    fn drop(&mut self) {
        unsafe {
            let _ = cufftDestroy(self.handle);
        }
    }
}
