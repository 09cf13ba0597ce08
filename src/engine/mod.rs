//! Execution controller for one FFT engine instance.
//!
//! ## Architecture
//!
//! - **Controller** (`FftEngine`): synchronous, run-to-completion state
//!   machine `Idle → Validating → Processing → Publishing → Idle`, with the
//!   fault edge `Validating → Faulted → Idle`.
//! - **Outputs** (`OutputHandle`): lock-free snapshots readable by any
//!   number of observers while the controller owns the only writer.

mod controller;
mod outputs;
mod timer;

pub use controller::{EngineInputs, ExecutionOutcome, ExecutionState, FftEngine, WindowSelector};
pub use outputs::{OutputHandle, Publication};
pub use timer::PhaseTimer;

use thiserror::Error;

use crate::processing::ProcessingError;
use crate::types::UnsupportedWindowType;

/// Errors that reject a trigger.
///
/// An empty input array is not an error: it is handled inside the state
/// machine and reported as [`ExecutionOutcome::Faulted`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    UnsupportedWindowType(#[from] UnsupportedWindowType),

    #[error("Processing failed: {0}")]
    Processing(#[from] ProcessingError),
}
