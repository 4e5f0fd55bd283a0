//! Raw FFI bindings to NVIDIA cuFFT.
//!
//! Only the entry points needed for batched-1 one-dimensional transforms
//! are declared: real-to-complex (D2Z) and complex-to-complex (Z2Z) in
//! double precision.
//!
//! cuFFT documentation: https://docs.nvidia.com/cuda/cufft/

#![allow(non_camel_case_types)]
#![allow(dead_code)]

use std::ffi::c_int;

/// cuFFT plan handle.
pub type cufftHandle = c_int;

/// cuFFT result/error codes.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum cufftResult {
    CUFFT_SUCCESS = 0,
    CUFFT_INVALID_PLAN = 1,
    CUFFT_ALLOC_FAILED = 2,
    CUFFT_INVALID_TYPE = 3,
    CUFFT_INVALID_VALUE = 4,
    CUFFT_INTERNAL_ERROR = 5,
    CUFFT_EXEC_FAILED = 6,
    CUFFT_SETUP_FAILED = 7,
    CUFFT_INVALID_SIZE = 8,
    CUFFT_UNALIGNED_DATA = 9,
    CUFFT_INCOMPLETE_PARAMETER_LIST = 10,
    CUFFT_INVALID_DEVICE = 11,
    CUFFT_PARSE_ERROR = 12,
    CUFFT_NO_WORKSPACE = 13,
    CUFFT_NOT_IMPLEMENTED = 14,
    CUFFT_LICENSE_ERROR = 15,
    CUFFT_NOT_SUPPORTED = 16,
}

impl cufftResult {
    pub fn is_success(self) -> bool {
        self == cufftResult::CUFFT_SUCCESS
    }

    pub fn to_result(self) -> Result<(), CufftError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(CufftError(self))
        }
    }
}

/// cuFFT transform types.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum cufftType {
    /// Real to complex (interleaved), single precision
    CUFFT_R2C = 0x2a,
    /// Complex (interleaved) to real, single precision
    CUFFT_C2R = 0x2c,
    /// Complex to complex (interleaved), single precision
    CUFFT_C2C = 0x29,
    /// Double to double-complex (interleaved)
    CUFFT_D2Z = 0x6a,
    /// Double-complex (interleaved) to double
    CUFFT_Z2D = 0x6c,
    /// Double-complex to double-complex (interleaved)
    CUFFT_Z2Z = 0x69,
}

/// Direction constants for Z2Z transforms.
pub const CUFFT_FORWARD: c_int = -1;
pub const CUFFT_INVERSE: c_int = 1;

/// Double-precision real sample (matches cufftDoubleReal).
pub type cufftDoubleReal = f64;

/// Double-precision complex number (matches cuDoubleComplex).
///
/// Same memory layout as `num_complex::Complex64`: `[real: f64, imag: f64]`
/// with C representation.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct cufftDoubleComplex {
    pub x: f64, // real part
    pub y: f64, // imaginary part
}

/// CUDA stream type (opaque pointer).
pub type cudaStream_t = *mut std::ffi::c_void;

// Link against the cuFFT library; the search path is handled by build.rs.
#[link(name = "cufft")]
unsafe extern "C" {
    /// Creates a 1D FFT plan.
    ///
    /// # Parameters
    /// - `plan`: receives the created plan handle
    /// - `nx`: transform length
    /// - `fft_type`: transform data type (e.g. CUFFT_D2Z, CUFFT_Z2Z)
    /// - `batch`: number of transforms of size `nx` (1 here)
    pub fn cufftPlan1d(
        plan: *mut cufftHandle,
        nx: c_int,
        fft_type: cufftType,
        batch: c_int,
    ) -> cufftResult;

    /// Executes a double-precision real-to-complex forward transform.
    ///
    /// Writes `nx/2 + 1` complex values to `odata`; the remaining bins of a
    /// longer output buffer are untouched.
    pub fn cufftExecD2Z(
        plan: cufftHandle,
        idata: *mut cufftDoubleReal,
        odata: *mut cufftDoubleComplex,
    ) -> cufftResult;

    /// Executes a double-precision complex-to-complex transform.
    ///
    /// `direction` is `CUFFT_FORWARD` (-1) or `CUFFT_INVERSE` (1). cuFFT is
    /// unnormalized in both directions: forward followed by inverse yields
    /// `nx * x`.
    pub fn cufftExecZ2Z(
        plan: cufftHandle,
        idata: *mut cufftDoubleComplex,
        odata: *mut cufftDoubleComplex,
        direction: c_int,
    ) -> cufftResult;

    /// Associates a CUDA stream with a plan; all launches for the plan then
    /// use this stream.
    pub fn cufftSetStream(plan: cufftHandle, stream: cudaStream_t) -> cufftResult;

    /// Destroys a plan and releases its resources.
    pub fn cufftDestroy(plan: cufftHandle) -> cufftResult;
}

/// Error type for cuFFT operations.
#[derive(Debug, Clone, Copy)]
pub struct CufftError(pub cufftResult);

impl std::fmt::Display for CufftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cuFFT error: {:?}", self.0)
    }
}

impl std::error::Error for CufftError {}
