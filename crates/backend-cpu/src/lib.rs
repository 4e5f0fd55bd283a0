//! Host-memory transform backend built on realfft and rustfft.
//!
//! Forward real-to-complex transforms come from `realfft`, complex
//! transforms from `rustfft`. Plan creation runs a measured search over the
//! candidate algorithms for the requested length and persists the winner
//! through the injected [`PlanCache`], so repeated runs (and sibling engine
//! instances planning the same length) skip the search.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use byteorder::{LittleEndian, ReadBytesExt};
use num_complex::Complex64;
use realfft::{RealFftPlanner, RealToComplex};
use rustfft::algorithm::Radix4;
use rustfft::{Fft, FftDirection, FftPlanner};

use wakefield_core::backend::{
    BackendError, Direction, HostBuffer, SignalBuffer, TransformBackend,
};
use wakefield_core::wisdom::{NullPlanCache, PlanCache, PlanKey, Precision, TransformKind};

#[cfg(test)]
mod _tests_lib;

/// Iterations per candidate when measuring transform strategies.
const SEARCH_RUNS: u32 = 4;

/// Complex-to-complex strategy recorded in a wisdom entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// Whatever `FftPlanner` picks for the length.
    Planner,
    /// Explicit radix-4 butterfly chain (power-of-two lengths only).
    Radix4,
}

impl Strategy {
    fn tag(self) -> u8 {
        match self {
            Strategy::Planner => 0,
            Strategy::Radix4 => 1,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Strategy::Planner),
            1 => Some(Strategy::Radix4),
            _ => None,
        }
    }
}

const WISDOM_MAGIC: u32 = 0x5746_5731; // "WFW1"

fn encode_wisdom(strategy: Strategy, measured_ns: u64) -> Vec<u8> {
    let mut blob = Vec::with_capacity(13);
    blob.extend_from_slice(&WISDOM_MAGIC.to_le_bytes());
    blob.push(strategy.tag());
    blob.extend_from_slice(&measured_ns.to_le_bytes());
    blob
}

fn decode_wisdom(blob: &[u8]) -> Option<(Strategy, u64)> {
    let mut cursor = Cursor::new(blob);
    if cursor.read_u32::<LittleEndian>().ok()? != WISDOM_MAGIC {
        return None;
    }
    let strategy = Strategy::from_tag(cursor.read_u8().ok()?)?;
    let measured_ns = cursor.read_u64::<LittleEndian>().ok()?;
    Some((strategy, measured_ns))
}

/// Host backend; owns the transform planners and the wisdom cache handle.
pub struct CpuBackend {
    planner: FftPlanner<f64>,
    real_planner: RealFftPlanner<f64>,
    cache: Arc<dyn PlanCache>,
}

impl CpuBackend {
    /// Backend without persisted wisdom.
    pub fn new() -> Self {
        Self::with_plan_cache(Arc::new(NullPlanCache))
    }

    /// Backend consulting `cache` whenever a plan is created.
    pub fn with_plan_cache(cache: Arc<dyn PlanCache>) -> Self {
        Self {
            planner: FftPlanner::new(),
            real_planner: RealFftPlanner::new(),
            cache,
        }
    }

    fn plan_default(&mut self, len: usize, direction: Direction) -> Arc<dyn Fft<f64>> {
        self.planner.plan_fft(len, fft_direction(direction))
    }

    /// Measure the candidates for a complex transform of `len` samples and
    /// return the fastest together with its wisdom record.
    fn search_c2c(
        &mut self,
        len: usize,
        direction: Direction,
    ) -> (Arc<dyn Fft<f64>>, Strategy, u64) {
        let mut best = {
            let fft = self.plan_default(len, direction);
            let measured = measure_c2c(fft.as_ref());
            (fft, Strategy::Planner, measured)
        };
        if len.is_power_of_two() {
            let fft: Arc<dyn Fft<f64>> = Arc::new(Radix4::new(len, fft_direction(direction)));
            let measured = measure_c2c(fft.as_ref());
            if measured < best.2 {
                best = (fft, Strategy::Radix4, measured);
            }
        }
        best
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn fft_direction(direction: Direction) -> FftDirection {
    match direction {
        Direction::Forward => FftDirection::Forward,
        Direction::Backward => FftDirection::Inverse,
    }
}

fn measure_c2c(fft: &dyn Fft<f64>) -> u64 {
    let mut buffer = vec![Complex64::ZERO; fft.len()];
    let mut scratch = vec![Complex64::ZERO; fft.get_inplace_scratch_len()];
    let mut best = u64::MAX;
    for _ in 0..SEARCH_RUNS {
        let start = Instant::now();
        fft.process_with_scratch(&mut buffer, &mut scratch);
        best = best.min(start.elapsed().as_nanos() as u64);
    }
    best
}

fn measure_r2c(fft: &dyn RealToComplex<f64>, len: usize) -> u64 {
    let mut input = vec![0.0; len];
    let mut output = vec![Complex64::ZERO; len / 2 + 1];
    let mut best = u64::MAX;
    for _ in 0..SEARCH_RUNS {
        let start = Instant::now();
        // zero input cannot fail length checks; ignore numerical status
        let _ = fft.process(&mut input, &mut output);
        best = best.min(start.elapsed().as_nanos() as u64);
    }
    best
}

/// Forward real-to-complex plan bound to a transform length.
pub struct CpuR2cPlan {
    fft: Arc<dyn RealToComplex<f64>>,
    spectrum: Vec<Complex64>,
    len: usize,
}

/// Complex-to-complex plan bound to a transform length and direction.
pub struct CpuC2cPlan {
    fft: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
    len: usize,
}

impl TransformBackend for CpuBackend {
    type Real = HostBuffer<f64>;
    type Complex = HostBuffer<Complex64>;
    type R2cPlan = CpuR2cPlan;
    type C2cPlan = CpuC2cPlan;

    fn alloc_real(&mut self, len: usize) -> Result<Self::Real, BackendError> {
        HostBuffer::zeroed(len)
    }

    fn alloc_complex(&mut self, len: usize) -> Result<Self::Complex, BackendError> {
        HostBuffer::zeroed(len)
    }

    fn plan_r2c(&mut self, len: usize) -> Result<Self::R2cPlan, BackendError> {
        if len < 2 {
            return Err(BackendError::Planning {
                len,
                reason: "real transform needs at least two samples".into(),
            });
        }
        let key = PlanKey {
            kind: TransformKind::RealToComplex,
            direction: Direction::Forward,
            precision: Precision::Double,
            len,
        };
        let fft = self.real_planner.plan_fft_forward(len);
        if self
            .cache
            .lookup(&key)
            .and_then(|blob| decode_wisdom(&blob))
            .is_none()
        {
            // warm the twiddle tables once and remember that it happened
            let measured_ns = measure_r2c(fft.as_ref(), len);
            self.cache.store(&key, &encode_wisdom(Strategy::Planner, measured_ns));
        }
        Ok(CpuR2cPlan {
            fft,
            spectrum: vec![Complex64::ZERO; len / 2 + 1],
            len,
        })
    }

    fn plan_c2c(
        &mut self,
        len: usize,
        direction: Direction,
    ) -> Result<Self::C2cPlan, BackendError> {
        if len < 2 {
            return Err(BackendError::Planning {
                len,
                reason: "complex transform needs at least two samples".into(),
            });
        }
        let key = PlanKey {
            kind: TransformKind::ComplexToComplex,
            direction,
            precision: Precision::Double,
            len,
        };
        let cached = self.cache.lookup(&key).and_then(|blob| decode_wisdom(&blob));
        let fft: Arc<dyn Fft<f64>> = match cached {
            Some((Strategy::Radix4, _)) if len.is_power_of_two() => {
                Arc::new(Radix4::new(len, fft_direction(direction)))
            }
            Some((Strategy::Planner, _)) => self.plan_default(len, direction),
            _ => {
                // no usable wisdom: measure the candidates, persist the winner
                let (fft, strategy, measured_ns) = self.search_c2c(len, direction);
                log::debug!(
                    "planned c2c length {len} ({direction:?}): {strategy:?}, {measured_ns} ns"
                );
                self.cache.store(&key, &encode_wisdom(strategy, measured_ns));
                fft
            }
        };
        let scratch = vec![Complex64::ZERO; fft.get_inplace_scratch_len()];
        Ok(CpuC2cPlan { fft, scratch, len })
    }

    fn execute_r2c(
        &mut self,
        plan: &mut Self::R2cPlan,
        input: &mut Self::Real,
        output: &mut Self::Complex,
    ) -> Result<(), BackendError> {
        if input.len() != plan.len {
            return Err(BackendError::Length {
                got: input.len(),
                expected: plan.len,
            });
        }
        if output.len() != plan.len {
            return Err(BackendError::Length {
                got: output.len(),
                expected: plan.len,
            });
        }
        plan.fft
            .process(input.as_mut_slice(), &mut plan.spectrum)
            .map_err(|err| BackendError::Execution(err.to_string()))?;
        let out = output.as_mut_slice();
        out[..plan.spectrum.len()].copy_from_slice(&plan.spectrum);
        // only bins 0..=len/2 are non-redundant for a real input
        out[plan.spectrum.len()..].fill(Complex64::ZERO);
        Ok(())
    }

    fn execute_c2c(
        &mut self,
        plan: &mut Self::C2cPlan,
        input: &mut Self::Complex,
        output: &mut Self::Complex,
    ) -> Result<(), BackendError> {
        if input.len() != plan.len {
            return Err(BackendError::Length {
                got: input.len(),
                expected: plan.len,
            });
        }
        if output.len() != plan.len {
            return Err(BackendError::Length {
                got: output.len(),
                expected: plan.len,
            });
        }
        output.as_mut_slice().copy_from_slice(input.as_slice());
        plan.fft
            .process_with_scratch(output.as_mut_slice(), &mut plan.scratch);
        Ok(())
    }
}
