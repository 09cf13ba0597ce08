//! pv-fft: windowed real-input FFT engine for process variables
//!
//! An engine instance takes a real-valued sample array, applies a selectable
//! window, computes the forward FFT and publishes the non-redundant half of
//! the spectrum as a pair of real/imaginary arrays.
//!
//! ## Architecture
//!
//! - **Processing**: window tables and the FFT transform
//! - **Engine**: the per-instance execution controller and its outputs
//! - **Binding**: value-change and process-request trigger policies
//! - **Service**: named instances, one worker task each, fed from an event source

pub mod binding;
pub mod config;
pub mod engine;
pub mod processing;
pub mod service;
pub mod types;

// Re-export configuration
pub use config::{EngineConfig, InstanceConfig};

// Re-export commonly used types
pub use types::{AlarmSeverity, AlarmState, AlarmStatus, SignalType, TriggerMode, WindowType};

// Re-export engine
pub use engine::{EngineError, ExecutionOutcome, ExecutionState, FftEngine, OutputHandle, Publication};

// Re-export processing
pub use processing::{ProcessingError, SpectrumHalf};

// Re-export binding and service
pub use binding::{BindingEvent, PvBinding};
pub use service::{EngineRegistry, EngineService, InstanceHandle, ServiceError};
