//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Configuration Loading
// ============================================================================

/// Environment variable holding the path to the engine TOML file.
pub const CONFIG_ENV_VAR: &str = "PVFFT_CONFIG";

/// Config file looked up in the current working directory.
pub const CONFIG_FILE_NAME: &str = "pvfft.toml";

// ============================================================================
// Engine
// ============================================================================

/// Sample frequency (Hz) used for the frequency scale when none is configured.
pub const DEFAULT_SAMPLE_FREQ_HZ: f64 = 1.0;

/// Upper bound on memoized window coefficient vectors per instance.
pub const MAX_CACHED_WINDOWS: usize = 16;

/// Floor for magnitude outputs (dB). Zero bins publish this instead of
/// `-inf`, which JSON cannot carry. Below the dB value of the smallest
/// normal f64 (about -6153 dB), so only zero and subnormal magnitudes clamp.
pub const MAGNITUDE_FLOOR_DB: f64 = -6200.0;

// ============================================================================
// Execution Phase Timing
// ============================================================================

/// Window application and input snapshot (seconds).
pub const PREPARE_THRESHOLD_SECS: f64 = 5e-3;

/// FFT planning after a size change (seconds).
pub const REPLAN_THRESHOLD_SECS: f64 = 0.1;

/// Transform execution (seconds).
pub const EXECUTE_THRESHOLD_SECS: f64 = 3e-3;

/// Derived outputs and publication (seconds).
pub const POST_PROCESS_THRESHOLD_SECS: f64 = 1e-3;

// ============================================================================
// Service
// ============================================================================

/// Bounded event queue depth per instance worker.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
