//! Engine Configuration - instances and their defaults as TOML values
//!
//! Window types are parsed here, so an unsupported window name is rejected
//! when the file is loaded rather than on the first trigger.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults::{
    CONFIG_ENV_VAR, CONFIG_FILE_NAME, DEFAULT_CHANNEL_CAPACITY, DEFAULT_SAMPLE_FREQ_HZ,
};
use crate::types::{TriggerMode, WindowType};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for an engine host.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$PVFFT_CONFIG` env var
/// 2. `./pvfft.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Values used by instances that don't set their own
    #[serde(default)]
    pub defaults: InstanceDefaults,

    /// One entry per engine instance (input/output PV group)
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

impl Default for EngineConfig {
    /// Four instances mirroring the reference test database: three fired by
    /// value change, one by explicit process request.
    fn default() -> Self {
        let instance = |name: &str, trigger| InstanceConfig {
            name: name.to_string(),
            trigger,
            ..InstanceConfig::default()
        };
        Self {
            defaults: InstanceDefaults::default(),
            instances: vec![
                instance("A1", TriggerMode::ValueChange),
                instance("A2", TriggerMode::ValueChange),
                instance("A3", TriggerMode::ValueChange),
                instance("A4", TriggerMode::Process),
            ],
        }
    }
}

/// Fallback values for instance fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceDefaults {
    /// Window type selected at startup
    pub window: WindowType,
    /// Sample frequency in Hz (only affects the frequency scale)
    pub sample_freq: f64,
    /// Event queue depth per instance
    pub channel_capacity: usize,
}

impl Default for InstanceDefaults {
    fn default() -> Self {
        Self {
            window: WindowType::None,
            sample_freq: DEFAULT_SAMPLE_FREQ_HZ,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// A single engine instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Instance name, the first token of every PV link to it
    pub name: String,

    /// What the binding treats as a trigger
    #[serde(default)]
    pub trigger: TriggerMode,

    /// Initial window type (falls back to `defaults.window`)
    #[serde(default)]
    pub window: Option<WindowType>,

    /// Sample frequency in Hz (falls back to `defaults.sample_freq`)
    #[serde(default)]
    pub sample_freq: Option<f64>,

    /// Event queue depth (falls back to `defaults.channel_capacity`)
    #[serde(default)]
    pub channel_capacity: Option<usize>,

    /// Optional derived outputs
    #[serde(default)]
    pub outputs: DerivedOutputs,
}

impl InstanceConfig {
    pub fn new(name: impl Into<String>, trigger: TriggerMode) -> Self {
        Self {
            name: name.into(),
            trigger,
            ..Self::default()
        }
    }

    pub fn window_or(&self, defaults: &InstanceDefaults) -> WindowType {
        self.window.unwrap_or(defaults.window)
    }

    pub fn sample_freq_or(&self, defaults: &InstanceDefaults) -> f64 {
        self.sample_freq.unwrap_or(defaults.sample_freq)
    }

    pub fn channel_capacity_or(&self, defaults: &InstanceDefaults) -> usize {
        self.channel_capacity.unwrap_or(defaults.channel_capacity)
    }
}

/// Outputs computed in addition to the real/imaginary pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivedOutputs {
    /// Magnitude in dB
    pub magnitude: bool,
    /// Phase in radians
    pub phase: bool,
    /// Frequency of each bin
    pub fscale: bool,
    /// Window coefficients in effect
    pub window: bool,
}

impl DerivedOutputs {
    pub const ALL: Self = Self {
        magnitude: true,
        phase: true,
        fscale: true,
        window: true,
    };
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$PVFFT_CONFIG` environment variable
    /// 2. `./pvfft.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), instances = config.instances.len(), "Loaded engine config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./pvfft.toml
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(instances = config.instances.len(), "Loaded engine config from ./{}", CONFIG_FILE_NAME);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", CONFIG_FILE_NAME);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", CONFIG_FILE_NAME);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::ParseStr(inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys only warn; unparseable values (including unsupported
    /// window names) and failed validation are errors.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents).map_err(ConfigError::ParseStr)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Look up an instance by name.
    pub fn instance(&self, name: &str) -> Option<&InstanceConfig> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// Validate instance definitions.
    ///
    /// Rules:
    /// - Names are non-empty, unique, and contain no whitespace (a PV link
    ///   splits on spaces)
    /// - Sample frequencies are finite and > 0
    /// - Channel capacities are > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        Self::check_sample_freq(self.defaults.sample_freq, "defaults.sample_freq", &mut errors);
        if self.defaults.channel_capacity == 0 {
            errors.push("defaults.channel_capacity: must be > 0".to_string());
        }

        let mut seen = HashSet::new();
        for (idx, inst) in self.instances.iter().enumerate() {
            let label = if inst.name.is_empty() {
                format!("instances[{idx}]")
            } else {
                format!("instances.{}", inst.name)
            };

            if inst.name.is_empty() {
                errors.push(format!("{label}: name must not be empty"));
            } else if inst.name.chars().any(char::is_whitespace) {
                errors.push(format!("{label}: name must not contain whitespace"));
            } else if !seen.insert(inst.name.as_str()) {
                errors.push(format!("{label}: duplicate instance name"));
            }

            if let Some(freq) = inst.sample_freq {
                Self::check_sample_freq(freq, &format!("{label}.sample_freq"), &mut errors);
            }
            if inst.channel_capacity == Some(0) {
                errors.push(format!("{label}.channel_capacity: must be > 0"));
            }
        }

        if self.instances.is_empty() {
            warn!("Engine config defines no instances");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_sample_freq(freq: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass, so check finiteness first
        if !freq.is_finite() || freq <= 0.0 {
            errors.push(format!("{name}: must be finite and > 0 (got {freq})"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    ParseStr(toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::ParseStr(e) => write!(f, "Config parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}
