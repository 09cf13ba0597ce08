//! FFT computation using rustfft
//!
//! Real-input forward transform returning the one-sided spectrum
//! (bins `0..=N/2`), unnormalized, same convention as `numpy.fft.rfft`.
//!
//! # Example
//!
//! ```ignore
//! use pv_fft::processing::TransformEngine;
//!
//! let mut engine = TransformEngine::new();
//! let spectrum = engine.transform(&[0.0, 1.0, 0.0, 0.0])?;
//! assert_eq!(spectrum.len(), 3);
//! ```

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use super::{ProcessingError, SpectrumHalf};

// ============================================================================
// Transform Engine (planned for repeated use)
// ============================================================================

/// Real-input FFT with a plan kept for the current length.
///
/// The planner handles any length: mixed-radix for small prime factors,
/// Rader/Bluestein for large primes. A new plan is made only when the input
/// length changes.
pub struct TransformEngine {
    planner: FftPlanner<f64>,
    plan: Option<Arc<dyn Fft<f64>>>,
    size: usize,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl Default for TransformEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransformEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformEngine")
            .field("size", &self.size)
            .field("planned", &self.plan.is_some())
            .finish()
    }
}

impl TransformEngine {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            plan: None,
            size: 0,
            buffer: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Length of the current plan (0 before the first transform).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Make sure a plan for `size` points exists. Returns true if a new plan
    /// was created.
    pub fn replan(&mut self, size: usize) -> bool {
        if self.plan.is_some() && self.size == size {
            return false;
        }

        let fft = self.planner.plan_fft_forward(size);
        self.scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        self.plan = Some(fft);
        self.size = size;
        tracing::debug!(size, "Planned forward FFT");
        true
    }

    /// Compute the one-sided DFT of `samples`.
    ///
    /// X[k] = Σ x[n]·e^{-2πi·k·n/N} for k = 0..=N/2.
    pub fn transform(&mut self, samples: &[f64]) -> Result<SpectrumHalf, ProcessingError> {
        if samples.is_empty() {
            return Err(ProcessingError::EmptyInput);
        }

        self.replan(samples.len());
        let fft = self
            .plan
            .as_ref()
            .ok_or_else(|| ProcessingError::FftError("no plan after replan".to_string()))?;

        self.buffer.clear();
        self.buffer
            .extend(samples.iter().map(|&x| Complex::new(x, 0.0)));

        fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let bins = SpectrumHalf::bins_for(samples.len());
        let half = &self.buffer[..bins];
        Ok(SpectrumHalf {
            real: half.iter().map(|c| c.re).collect(),
            imag: half.iter().map(|c| c.im).collect(),
        })
    }
}

/// Frequency of each one-sided bin: `k · sample_freq / N`.
pub fn frequency_scale(samples: usize, sample_freq: f64) -> Vec<f64> {
    if samples == 0 {
        return Vec::new();
    }
    let resolution = sample_freq / samples as f64;
    (0..SpectrumHalf::bins_for(samples))
        .map(|k| k as f64 * resolution)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
