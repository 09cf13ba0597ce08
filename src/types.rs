//! Shared value types for the FFT engine boundary.
//!
//! Window selection, alarm severity/status pairs, the named signals a PV
//! link can bind to, and the two trigger modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Window Type
// ============================================================================

/// Windowing function applied to the samples before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WindowType {
    /// Rectangular window; the applicator skips multiplication entirely.
    #[default]
    None,
    /// Hann window: w[n] = sin²(πn/(N-1))
    #[serde(alias = "Hanning")]
    Hann,
    /// Hamming window: w[n] = 0.54 - 0.46·cos(2πn/(N-1))
    Hamming,
    /// Blackman window: w[n] = 0.42 - 0.5·cos(2πn/(N-1)) + 0.08·cos(4πn/(N-1))
    Blackman,
}

/// A window selector value that does not name a supported window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported window type '{0}'")]
pub struct UnsupportedWindowType(pub String);

impl WindowType {
    pub const ALL: [Self; 4] = [Self::None, Self::Hann, Self::Hamming, Self::Blackman];

    /// Display name, as written on the selector PV.
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Hann => "Hann",
            Self::Hamming => "Hamming",
            Self::Blackman => "Blackman",
        }
    }

    /// Map an enumerated-record index (mbbo VAL) to a window type.
    pub fn from_index(index: u16) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WindowType {
    type Err = UnsupportedWindowType;

    /// Accepts the display names (case-insensitive), "Hanning", and the
    /// numeric enum index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(index) = trimmed.parse::<u16>() {
            return Self::from_index(index).ok_or_else(|| UnsupportedWindowType(s.to_string()));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "hann" | "hanning" => Ok(Self::Hann),
            "hamming" => Ok(Self::Hamming),
            "blackman" => Ok(Self::Blackman),
            _ => Err(UnsupportedWindowType(s.to_string())),
        }
    }
}

// ============================================================================
// Alarm State
// ============================================================================

/// Alarm severity, numbered as in the control-system alarm menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(u16)]
pub enum AlarmSeverity {
    #[default]
    NoAlarm = 0,
    Minor = 1,
    Major = 2,
    Invalid = 3,
}

/// Alarm status (cause code), numbered as in the control-system alarm menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u16)]
pub enum AlarmStatus {
    #[default]
    NoError = 0,
    Read = 1,
    Write = 2,
    HiHi = 3,
    High = 4,
    LoLo = 5,
    Low = 6,
    State = 7,
    Cos = 8,
    Comm = 9,
    Timeout = 10,
    HwLimit = 11,
    Calc = 12,
    Scan = 13,
    Link = 14,
    Soft = 15,
    BadSub = 16,
    Udf = 17,
    Disable = 18,
    Simm = 19,
    ReadAccess = 20,
    WriteAccess = 21,
}

impl AlarmSeverity {
    pub const fn code(self) -> u16 {
        self as u16
    }
}

impl AlarmStatus {
    pub const fn code(self) -> u16 {
        self as u16
    }
}

/// Severity/status pair attached to the input binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AlarmState {
    pub severity: AlarmSeverity,
    pub status: AlarmStatus,
}

impl AlarmState {
    pub const CLEAR: Self = Self {
        severity: AlarmSeverity::NoAlarm,
        status: AlarmStatus::NoError,
    };

    pub const fn new(severity: AlarmSeverity, status: AlarmStatus) -> Self {
        Self { severity, status }
    }

    /// Raised when a trigger arrives with an empty input array.
    pub const fn invalid_write() -> Self {
        Self::new(AlarmSeverity::Invalid, AlarmStatus::Write)
    }

    pub fn is_alarmed(&self) -> bool {
        self.severity != AlarmSeverity::NoAlarm
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.severity, self.status)
    }
}

// ============================================================================
// Signal Types
// ============================================================================

/// A named signal on an engine instance, as written in a PV link
/// (`"<instance> <signal>"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    InputReal,
    SetWindowType,
    SetSampleFreq,
    Process,
    ExecutionTime,
    ExecutionCount,
    OutputReal,
    OutputImag,
    OutputMagn,
    OutputPhas,
    OutputFscale,
    OutputWindow,
}

/// A signal name that no engine signal answers to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown signal type '{0}'")]
pub struct UnknownSignalType(pub String);

impl SignalType {
    pub const fn name(self) -> &'static str {
        match self {
            Self::InputReal => "input-real",
            Self::SetWindowType => "windowtype",
            Self::SetSampleFreq => "sample-freq",
            Self::Process => "process",
            Self::ExecutionTime => "exectime",
            Self::ExecutionCount => "execcount",
            Self::OutputReal => "output-real",
            Self::OutputImag => "output-imag",
            Self::OutputMagn => "output-magn",
            Self::OutputPhas => "output-phas",
            Self::OutputFscale => "output-fscale",
            Self::OutputWindow => "output-window",
        }
    }

    /// Signals that feed the engine (writes from the binding).
    pub const fn is_input(self) -> bool {
        matches!(
            self,
            Self::InputReal | Self::SetWindowType | Self::SetSampleFreq | Self::Process
        )
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignalType {
    type Err = UnknownSignalType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input-real" => Ok(Self::InputReal),
            "windowtype" => Ok(Self::SetWindowType),
            "sample-freq" => Ok(Self::SetSampleFreq),
            "process" => Ok(Self::Process),
            "exectime" => Ok(Self::ExecutionTime),
            "execcount" => Ok(Self::ExecutionCount),
            "output-real" => Ok(Self::OutputReal),
            "output-imag" => Ok(Self::OutputImag),
            "output-magn" => Ok(Self::OutputMagn),
            "output-phas" => Ok(Self::OutputPhas),
            "output-fscale" => Ok(Self::OutputFscale),
            "output-window" => Ok(Self::OutputWindow),
            other => Err(UnknownSignalType(other.to_string())),
        }
    }
}

// ============================================================================
// Trigger Mode
// ============================================================================

/// What the binding treats as "fire the controller".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Processing fires when the input array receives a new value.
    #[default]
    ValueChange,
    /// Processing fires only on an explicit process request (`.PROC`).
    Process,
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValueChange => write!(f, "value-change"),
            Self::Process => write!(f, "process"),
        }
    }
}
