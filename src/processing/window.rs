//! Window coefficient table and applicator.
//!
//! Coefficients are generated on demand and memoized per (type, length),
//! so repeated triggers with the same array size reuse the same vector.

use std::borrow::Cow;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use crate::config::defaults::MAX_CACHED_WINDOWS;
use crate::types::WindowType;

/// Generate window coefficients w[n] for n = 0..length.
///
/// Symmetric definitions (denominator `length - 1`). Windows of length 0 or 1
/// cannot be shaped and come out as all-ones.
pub fn generate_window(window_type: WindowType, length: usize) -> Vec<f64> {
    if length <= 1 || window_type == WindowType::None {
        return vec![1.0; length];
    }

    let denom = (length - 1) as f64;
    (0..length)
        .map(|n| {
            let x = n as f64 / denom;
            match window_type {
                WindowType::None => 1.0,
                WindowType::Hann => {
                    let s = (PI * x).sin();
                    s * s
                }
                WindowType::Hamming => 0.54 - 0.46 * (2.0 * PI * x).cos(),
                WindowType::Blackman => {
                    0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
                }
            }
        })
        .collect()
}

// ============================================================================
// Window Table
// ============================================================================

/// Memoized window coefficients keyed by (type, length).
#[derive(Debug, Default)]
pub struct WindowTable {
    cache: HashMap<(WindowType, usize), Arc<[f64]>>,
}

impl WindowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coefficients for `(window_type, length)`, generated on first use.
    pub fn coefficients(&mut self, window_type: WindowType, length: usize) -> Arc<[f64]> {
        if let Some(coeffs) = self.cache.get(&(window_type, length)) {
            return Arc::clone(coeffs);
        }

        // Bounded: start over once full
        if self.cache.len() >= MAX_CACHED_WINDOWS {
            tracing::debug!(entries = self.cache.len(), "Window cache full, clearing");
            self.cache.clear();
        }

        let coeffs: Arc<[f64]> = generate_window(window_type, length).into();
        self.cache.insert((window_type, length), Arc::clone(&coeffs));
        coeffs
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

// ============================================================================
// Window Applicator
// ============================================================================

/// Multiplies samples elementwise by the selected window.
#[derive(Debug, Default)]
pub struct WindowApplicator {
    table: WindowTable,
}

impl WindowApplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `window_type` to `samples` without touching the input.
    ///
    /// `WindowType::None` borrows the samples as they are.
    pub fn apply<'a>(&mut self, samples: &'a [f64], window_type: WindowType) -> Cow<'a, [f64]> {
        if window_type == WindowType::None {
            return Cow::Borrowed(samples);
        }

        let coeffs = self.table.coefficients(window_type, samples.len());
        Cow::Owned(samples.iter().zip(coeffs.iter()).map(|(s, w)| s * w).collect())
    }

    /// Coefficients currently in effect for `(window_type, length)`.
    pub fn coefficients(&mut self, window_type: WindowType, length: usize) -> Arc<[f64]> {
        self.table.coefficients(window_type, length)
    }

    pub fn table(&self) -> &WindowTable {
        &self.table
    }
}
