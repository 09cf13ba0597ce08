//! Signal processing module - windowing and real-input FFT

mod fft;
mod window;

pub use fft::*;
pub use window::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::defaults::MAGNITUDE_FLOOR_DB;

/// Errors in signal processing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
    #[error("Empty input: the transform needs at least one sample")]
    EmptyInput,

    #[error("FFT error: {0}")]
    FftError(String),
}

/// One-sided spectrum of a real signal: bins `0..=N/2`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumHalf {
    /// Real part of each bin
    pub real: Vec<f64>,
    /// Imaginary part of each bin
    pub imag: Vec<f64>,
}

impl SpectrumHalf {
    /// Number of non-redundant bins for an input of `samples` points.
    pub const fn bins_for(samples: usize) -> usize {
        samples / 2 + 1
    }

    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }

    /// Magnitude of each bin in dB: `20·log10(|X[k]|)`.
    ///
    /// Zero bins are clamped to [`MAGNITUDE_FLOOR_DB`]. NaN passes through.
    pub fn magnitude_db(&self) -> Vec<f64> {
        self.real
            .iter()
            .zip(&self.imag)
            .map(|(re, im)| {
                let db = 20.0 * re.hypot(*im).log10();
                if db < MAGNITUDE_FLOOR_DB {
                    MAGNITUDE_FLOOR_DB
                } else {
                    db
                }
            })
            .collect()
    }

    /// Phase of each bin in radians, in `(-π, π]`.
    pub fn phase(&self) -> Vec<f64> {
        self.real
            .iter()
            .zip(&self.imag)
            .map(|(re, im)| im.atan2(*re))
            .collect()
    }
}
