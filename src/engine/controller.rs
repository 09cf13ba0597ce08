//! The execution controller.
//!
//! One `FftEngine` per configured PV group. Every trigger runs
//! `execute()` to completion on `&mut self`, so an instance never sees a
//! second trigger (or a window-type change) mid-execution.

use serde::Serialize;
use std::fmt::Write as _;
use tracing::{debug, error, warn};

use super::outputs::{output_channel, OutputHandle, OutputWriter, Publication};
use super::timer::PhaseTimer;
use super::EngineError;
use crate::config::defaults::{
    DEFAULT_SAMPLE_FREQ_HZ, EXECUTE_THRESHOLD_SECS, POST_PROCESS_THRESHOLD_SECS,
    PREPARE_THRESHOLD_SECS, REPLAN_THRESHOLD_SECS,
};
use crate::config::{DerivedOutputs, InstanceConfig, InstanceDefaults};
use crate::processing::{frequency_scale, generate_window, TransformEngine, WindowApplicator};
use crate::types::{AlarmState, TriggerMode, UnsupportedWindowType, WindowType};

// ============================================================================
// State Machine
// ============================================================================

/// Controller state. `Idle` is both initial and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionState {
    Idle,
    Validating,
    Processing,
    Publishing,
    Faulted,
}

/// Result of one accepted trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExecutionOutcome {
    /// New outputs are visible; `execution` is the new count.
    Published { execution: u64, bins: usize },
    /// Input was rejected; outputs and count are unchanged.
    Faulted(AlarmState),
}

#[derive(Debug)]
struct StateMachine {
    state: ExecutionState,
    trace: Vec<ExecutionState>,
}

impl StateMachine {
    fn new() -> Self {
        Self {
            state: ExecutionState::Idle,
            trace: Vec::with_capacity(5),
        }
    }

    fn begin(&mut self) {
        self.trace.clear();
        self.trace.push(ExecutionState::Idle);
    }

    fn enter(&mut self, state: ExecutionState) {
        self.state = state;
        self.trace.push(state);
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// Value last written to the window-type selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowSelector {
    Known(WindowType),
    /// A raw selector value that names no supported window. Triggers are
    /// rejected until a valid value is written.
    Unsupported(String),
}

/// Current values of the input signals, read at validation time.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInputs {
    pub samples: Vec<f64>,
    pub window: WindowSelector,
    pub sample_freq: f64,
}

impl Default for EngineInputs {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            window: WindowSelector::Known(WindowType::None),
            sample_freq: DEFAULT_SAMPLE_FREQ_HZ,
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Windowed real-input FFT engine for one PV group.
pub struct FftEngine {
    name: String,
    trigger_mode: TriggerMode,
    derived: DerivedOutputs,
    inputs: EngineInputs,
    applicator: WindowApplicator,
    transform: TransformEngine,
    machine: StateMachine,
    writer: OutputWriter,
    handle: OutputHandle,
    /// (length, window, sample_freq) of the last published execution,
    /// used to republish fscale/window only when they change.
    last_shape: Option<(usize, WindowType, f64)>,
}

impl FftEngine {
    /// A fresh instance: count 0, outputs empty, alarm clear, window None.
    pub fn new(name: impl Into<String>) -> Self {
        let (writer, handle) = output_channel();
        Self {
            name: name.into(),
            trigger_mode: TriggerMode::ValueChange,
            derived: DerivedOutputs::default(),
            inputs: EngineInputs::default(),
            applicator: WindowApplicator::new(),
            transform: TransformEngine::new(),
            machine: StateMachine::new(),
            writer,
            handle,
            last_shape: None,
        }
    }

    pub fn from_config(config: &InstanceConfig, defaults: &InstanceDefaults) -> Self {
        let mut engine = Self::new(config.name.clone())
            .with_trigger_mode(config.trigger)
            .with_derived_outputs(config.outputs);
        engine.set_window_type(config.window_or(defaults));
        engine.set_sample_freq(config.sample_freq_or(defaults));
        engine
    }

    pub fn with_trigger_mode(mut self, mode: TriggerMode) -> Self {
        self.trigger_mode = mode;
        self
    }

    pub fn with_derived_outputs(mut self, derived: DerivedOutputs) -> Self {
        self.derived = derived;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger_mode(&self) -> TriggerMode {
        self.trigger_mode
    }

    pub fn state(&self) -> ExecutionState {
        self.machine.state
    }

    /// States visited by the last execution, starting and ending at `Idle`.
    pub fn last_transitions(&self) -> &[ExecutionState] {
        &self.machine.trace
    }

    pub fn inputs(&self) -> &EngineInputs {
        &self.inputs
    }

    /// Observer handle for this instance's outputs.
    pub fn outputs(&self) -> OutputHandle {
        self.handle.clone()
    }

    // ------------------------------------------------------------------------
    // Input writes (no processing)
    // ------------------------------------------------------------------------

    pub fn set_input(&mut self, samples: Vec<f64>) {
        self.inputs.samples = samples;
    }

    pub fn set_window_type(&mut self, window: WindowType) {
        self.inputs.window = WindowSelector::Known(window);
    }

    /// Write a raw selector value (name or enum index). Unknown values are
    /// stored as-is and make the next trigger fail closed.
    pub fn write_window_selector(&mut self, raw: &str) -> Result<WindowType, UnsupportedWindowType> {
        match raw.parse::<WindowType>() {
            Ok(window) => {
                self.inputs.window = WindowSelector::Known(window);
                Ok(window)
            }
            Err(e) => {
                warn!(instance = %self.name, selector = %raw, "Unsupported window selector written");
                self.inputs.window = WindowSelector::Unsupported(raw.to_string());
                Err(e)
            }
        }
    }

    /// Set the sample frequency. Non-positive or non-finite values are
    /// ignored and the last valid value kept.
    pub fn set_sample_freq(&mut self, freq: f64) -> bool {
        if freq.is_finite() && freq > 0.0 {
            self.inputs.sample_freq = freq;
            true
        } else {
            warn!(instance = %self.name, freq, "Ignoring invalid sample frequency");
            false
        }
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Run one trigger to completion.
    ///
    /// An empty input faults locally (alarm Invalid/Write, outputs frozen)
    /// and is reported as `Ok(ExecutionOutcome::Faulted)`. An unsupported
    /// window selector rejects the trigger with `Err`, also leaving outputs
    /// untouched.
    pub fn execute(&mut self) -> Result<ExecutionOutcome, EngineError> {
        let mut timer = PhaseTimer::start(&self.name);
        self.machine.begin();

        // Validating: snapshot window type, sample frequency and samples
        self.machine.enter(ExecutionState::Validating);
        let window = match &self.inputs.window {
            WindowSelector::Known(window) => *window,
            WindowSelector::Unsupported(raw) => {
                error!(instance = %self.name, selector = %raw, "Rejecting trigger: unsupported window type");
                self.machine.enter(ExecutionState::Idle);
                return Err(UnsupportedWindowType(raw.clone()).into());
            }
        };
        let sample_freq = self.inputs.sample_freq;
        let samples = &self.inputs.samples;
        let n = samples.len();

        if n == 0 {
            self.machine.enter(ExecutionState::Faulted);
            let alarm = AlarmState::invalid_write();
            self.writer.set_alarm(alarm);
            warn!(instance = %self.name, alarm = %alarm, "Empty input array, outputs left unchanged");
            self.machine.enter(ExecutionState::Idle);
            return Ok(ExecutionOutcome::Faulted(alarm));
        }

        // Processing
        self.machine.enter(ExecutionState::Processing);
        let windowed = self.applicator.apply(samples, window);
        timer.maybe_snap("prepare", PREPARE_THRESHOLD_SECS);

        if self.transform.replan(n) {
            timer.maybe_snap("replan", REPLAN_THRESHOLD_SECS);
        }

        let spectrum = match self.transform.transform(&windowed) {
            Ok(spectrum) => spectrum,
            Err(e) => {
                error!(instance = %self.name, error = %e, "Transform failed");
                self.machine.enter(ExecutionState::Idle);
                return Err(e.into());
            }
        };
        drop(windowed);
        timer.maybe_snap("execute", EXECUTE_THRESHOLD_SECS);

        let magnitude = self.derived.magnitude.then(|| spectrum.magnitude_db());
        let phase = self.derived.phase.then(|| spectrum.phase());
        let bins = spectrum.len();

        let shape = (n, window, sample_freq);
        let (scale_changed, window_changed) = match self.last_shape {
            Some((last_n, last_window, last_freq)) => (
                last_n != n || last_freq != sample_freq,
                last_n != n || last_window != window,
            ),
            None => (true, true),
        };

        // Publishing: pair first, then alarm, then count
        self.machine.enter(ExecutionState::Publishing);
        let execution = self.writer.count() + 1;
        self.writer.publish(Publication {
            spectrum,
            magnitude,
            phase,
            execution,
            published_at: Some(chrono::Utc::now()),
        });
        if self.derived.fscale && scale_changed {
            self.writer.publish_scale(frequency_scale(n, sample_freq));
        }
        if self.derived.window && window_changed {
            let coeffs = match window {
                WindowType::None => generate_window(WindowType::None, n),
                other => self.applicator.coefficients(other, n).to_vec(),
            };
            self.writer.publish_window(coeffs);
        }
        self.last_shape = Some(shape);
        self.writer.clear_alarm();
        timer.maybe_snap("post-process", POST_PROCESS_THRESHOLD_SECS);

        // Exec time lands before the count so subscribers woken for this
        // execution read its own duration
        let elapsed = timer.elapsed().as_secs_f64();
        self.writer.set_exec_time(elapsed);
        let count = self.writer.increment_count();
        self.machine.enter(ExecutionState::Idle);

        debug!(
            instance = %self.name,
            samples = n,
            bins,
            window = %window,
            count,
            elapsed_us = (elapsed * 1e6) as u64,
            "Spectrum published"
        );

        Ok(ExecutionOutcome::Published {
            execution: count,
            bins,
        })
    }

    /// Human-readable setup and status report.
    pub fn report(&self) -> String {
        let mut out = self.setup_report();
        let _ = writeln!(out, "Exec time: {}", self.handle.exec_time());
        let _ = writeln!(out, "Exec count: {}", self.handle.count());
        let _ = write!(out, "Alarm: {}", self.handle.alarm());
        out
    }

    /// Configured setup only, without execution status.
    pub fn setup_report(&self) -> String {
        let mut out = String::new();
        let window = match &self.inputs.window {
            WindowSelector::Known(w) => w.name().to_string(),
            WindowSelector::Unsupported(raw) => format!("<unsupported '{raw}'>"),
        };
        let _ = writeln!(out, "Instance {}", self.name);
        let _ = writeln!(out, "Triggered by: {}", self.trigger_mode);
        let _ = writeln!(out, "Derived outputs: {:?}", self.derived);
        let _ = writeln!(out, "Input size: {}", self.inputs.samples.len());
        let _ = writeln!(out, "Window type: {window}");
        let _ = writeln!(out, "Sample freq: {}", self.inputs.sample_freq);
        out
    }
}

impl std::fmt::Debug for FftEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftEngine")
            .field("name", &self.name)
            .field("trigger_mode", &self.trigger_mode)
            .field("state", &self.machine.state)
            .field("outputs", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::MAGNITUDE_FLOOR_DB;
    use crate::types::{AlarmSeverity, AlarmStatus, SignalType};

    #[test]
    fn test_fresh_instance() {
        let engine = FftEngine::new("T1");
        let out = engine.outputs();
        assert_eq!(engine.state(), ExecutionState::Idle);
        assert_eq!(out.count(), 0);
        assert_eq!(out.alarm(), AlarmState::CLEAR);
        assert!(out.snapshot().spectrum.is_empty());
    }

    #[test]
    fn test_successful_execution_transitions() {
        let mut engine = FftEngine::new("T1");
        engine.set_input(vec![0.0, 1.0, 0.0, 0.0]);

        let outcome = engine.execute().unwrap();
        assert_eq!(outcome, ExecutionOutcome::Published { execution: 1, bins: 3 });
        assert_eq!(
            engine.last_transitions(),
            &[
                ExecutionState::Idle,
                ExecutionState::Validating,
                ExecutionState::Processing,
                ExecutionState::Publishing,
                ExecutionState::Idle,
            ]
        );
        assert_eq!(engine.state(), ExecutionState::Idle);
    }

    #[test]
    fn test_empty_input_faults() {
        let mut engine = FftEngine::new("T1");
        let outcome = engine.execute().unwrap();

        assert_eq!(
            outcome,
            ExecutionOutcome::Faulted(AlarmState::new(AlarmSeverity::Invalid, AlarmStatus::Write))
        );
        assert_eq!(
            engine.last_transitions(),
            &[
                ExecutionState::Idle,
                ExecutionState::Validating,
                ExecutionState::Faulted,
                ExecutionState::Idle,
            ]
        );
        assert_eq!(engine.outputs().count(), 0);
    }

    #[test]
    fn test_alarm_cleared_by_next_success() {
        let mut engine = FftEngine::new("T1");
        engine.execute().unwrap();
        assert!(engine.outputs().alarm().is_alarmed());

        engine.set_input(vec![1.0, 2.0]);
        engine.execute().unwrap();
        assert_eq!(engine.outputs().alarm(), AlarmState::CLEAR);
        assert_eq!(engine.outputs().count(), 1);
    }

    #[test]
    fn test_unsupported_selector_fails_closed() {
        let mut engine = FftEngine::new("T1");
        engine.set_input(vec![1.0, 2.0, 3.0]);
        assert!(engine.write_window_selector("Kaiser").is_err());

        let err = engine.execute().unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedWindowType(_)));
        assert_eq!(engine.outputs().count(), 0);
        assert!(engine.outputs().snapshot().spectrum.is_empty());
        // Not the invalid-input alarm
        assert_eq!(engine.outputs().alarm(), AlarmState::CLEAR);

        engine.write_window_selector("Hamming").unwrap();
        assert!(engine.execute().is_ok());
        assert_eq!(engine.outputs().count(), 1);
    }

    #[test]
    fn test_derived_outputs_published_on_change_only() {
        let mut engine = FftEngine::new("T1").with_derived_outputs(DerivedOutputs::ALL);
        engine.set_sample_freq(8.0);
        engine.set_window_type(WindowType::Hann);
        engine.set_input(vec![1.0; 8]);
        engine.execute().unwrap();

        let out = engine.outputs();
        let scale = out.frequency_scale();
        assert_eq!(scale.len(), 5);
        assert!((scale[4] - 4.0).abs() < 1e-12);
        assert_eq!(out.window().len(), 8);
        let snap = out.snapshot();
        assert_eq!(snap.magnitude.as_ref().map(Vec::len), Some(5));
        assert_eq!(snap.phase.as_ref().map(Vec::len), Some(5));

        // Same shape: the published Arcs are not replaced
        engine.set_input(vec![2.0; 8]);
        engine.execute().unwrap();
        assert!(std::sync::Arc::ptr_eq(&scale, &out.frequency_scale()));

        engine.set_sample_freq(16.0);
        engine.execute().unwrap();
        assert!((out.frequency_scale()[4] - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_magnitude_bins_read_as_floor() {
        let mut engine = FftEngine::new("T1").with_derived_outputs(DerivedOutputs::ALL);
        engine.set_input(vec![1.0, 1.0]);
        engine.execute().unwrap();

        let out = engine.outputs();
        let magnitude = out.snapshot().magnitude.clone().unwrap();
        assert!((magnitude[0] - 20.0 * 2f64.log10()).abs() < 1e-12);
        assert_eq!(magnitude[1], MAGNITUDE_FLOOR_DB);

        let json = out.read_signal(SignalType::OutputMagn).unwrap();
        let values = json.as_array().unwrap();
        assert!(values.iter().all(serde_json::Value::is_f64));
        assert_eq!(values[1].as_f64(), Some(MAGNITUDE_FLOOR_DB));
    }

    #[test]
    fn test_invalid_sample_freq_ignored() {
        let mut engine = FftEngine::new("T1");
        assert!(engine.set_sample_freq(100.0));
        assert!(!engine.set_sample_freq(0.0));
        assert!(!engine.set_sample_freq(f64::NAN));
        assert_eq!(engine.inputs().sample_freq, 100.0);
    }

    #[test]
    fn test_report_mentions_setup() {
        let mut engine = FftEngine::new("A4").with_trigger_mode(TriggerMode::Process);
        engine.set_window_type(WindowType::Blackman);
        let report = engine.report();
        assert!(report.contains("Instance A4"));
        assert!(report.contains("Triggered by: process"));
        assert!(report.contains("Window type: Blackman"));
        assert!(report.contains("Exec count: 0"));
    }

    #[test]
    fn test_setup_report_omits_status() {
        let engine = FftEngine::new("A1");
        let setup = engine.setup_report();
        assert!(setup.contains("Instance A1"));
        assert!(setup.contains("Window type: None"));
        assert!(!setup.contains("Exec count"));
        assert!(!setup.contains("Alarm"));
        assert!(engine.report().starts_with(&setup));
    }

    #[test]
    fn test_exec_time_updated_on_success_and_frozen_on_fault() {
        let mut engine = FftEngine::new("T1");
        let out = engine.outputs();

        engine.set_input((0..1024).map(f64::from).collect());
        engine.execute().unwrap();
        let after_success = out.exec_time();
        assert!(after_success > 0.0);

        engine.set_input(Vec::new());
        engine.execute().unwrap();
        assert_eq!(out.exec_time().to_bits(), after_success.to_bits());
    }

    #[test]
    fn test_exec_time_visible_when_count_advances() {
        let mut engine = FftEngine::new("T1");
        let out = engine.outputs();

        let watcher = std::thread::spawn(move || {
            while out.count() == 0 {
                std::hint::spin_loop();
            }
            out.exec_time()
        });

        engine.set_input(vec![1.0; 4096]);
        engine.execute().unwrap();
        assert!(watcher.join().unwrap() > 0.0);
    }
}
