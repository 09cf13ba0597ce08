//! Engine Configuration Module
//!
//! Engine instances, their trigger modes and default window/sample
//! frequency, loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `PVFFT_CONFIG` environment variable (path to TOML file)
//! 2. `pvfft.toml` in the current working directory
//! 3. Built-in defaults (instances `A1`..`A4`)
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! config::init(EngineConfig::load());
//! let instances = &config::get().instances;
//! ```

mod engine_config;
pub mod defaults;
pub mod validation;

pub use engine_config::*;

use std::sync::OnceLock;

/// Global engine configuration, initialized once at startup.
static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize the global engine configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: EngineConfig) {
    if ENGINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global engine configuration.
///
/// Returns `None` before `init()`.
pub fn get() -> Option<&'static EngineConfig> {
    ENGINE_CONFIG.get()
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    ENGINE_CONFIG.get().is_some()
}
