//! PV binding adapters.
//!
//! A binding receives writes to an instance's input signals and decides
//! which of them fire the controller. The two invocation styles differ only
//! in that decision:
//!
//! - [`ValueChangeTrigger`]: a write to `input-real` fires.
//! - [`ProcessRequestTrigger`]: only an explicit `process` request fires;
//!   input writes are stored for the next request.

use serde::{Deserialize, Serialize};

use crate::engine::{EngineError, ExecutionOutcome, FftEngine, OutputHandle};
use crate::types::{SignalType, TriggerMode};

/// A write or request delivered by the PV layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BindingEvent {
    /// New value on `input-real`
    InputWritten(Vec<f64>),
    /// New value on `windowtype` (name or enum index)
    WindowTypeWritten(String),
    /// New value on `sample-freq`
    SampleFreqWritten(f64),
    /// Explicit processing request (`.PROC`)
    ProcessRequested,
}

impl BindingEvent {
    /// The input signal this event arrives on.
    pub const fn signal(&self) -> SignalType {
        match self {
            Self::InputWritten(_) => SignalType::InputReal,
            Self::WindowTypeWritten(_) => SignalType::SetWindowType,
            Self::SampleFreqWritten(_) => SignalType::SetSampleFreq,
            Self::ProcessRequested => SignalType::Process,
        }
    }
}

/// Decides which events fire the controller.
pub trait TriggerPolicy: Send + 'static {
    fn mode(&self) -> TriggerMode;

    fn fires_on(&self, event: &BindingEvent) -> bool;
}

/// Fires when the input array receives a new value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueChangeTrigger;

impl TriggerPolicy for ValueChangeTrigger {
    fn mode(&self) -> TriggerMode {
        TriggerMode::ValueChange
    }

    fn fires_on(&self, event: &BindingEvent) -> bool {
        matches!(event, BindingEvent::InputWritten(_))
    }
}

/// Fires only on an explicit process request, with whatever inputs are
/// current at that moment (possibly an empty array).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRequestTrigger;

impl TriggerPolicy for ProcessRequestTrigger {
    fn mode(&self) -> TriggerMode {
        TriggerMode::Process
    }

    fn fires_on(&self, event: &BindingEvent) -> bool {
        matches!(event, BindingEvent::ProcessRequested)
    }
}

impl TriggerPolicy for Box<dyn TriggerPolicy> {
    fn mode(&self) -> TriggerMode {
        (**self).mode()
    }

    fn fires_on(&self, event: &BindingEvent) -> bool {
        (**self).fires_on(event)
    }
}

/// Policy object for a configured trigger mode.
pub fn policy_for(mode: TriggerMode) -> Box<dyn TriggerPolicy> {
    match mode {
        TriggerMode::ValueChange => Box::new(ValueChangeTrigger),
        TriggerMode::Process => Box::new(ProcessRequestTrigger),
    }
}

// ============================================================================
// Binding
// ============================================================================

/// An engine instance wired to the PV layer through a trigger policy.
#[derive(Debug)]
pub struct PvBinding<P: TriggerPolicy = Box<dyn TriggerPolicy>> {
    engine: FftEngine,
    policy: P,
}

impl PvBinding<Box<dyn TriggerPolicy>> {
    /// Bind `engine` using the policy for its configured trigger mode.
    pub fn for_engine(engine: FftEngine) -> Self {
        let policy = policy_for(engine.trigger_mode());
        Self { engine, policy }
    }
}

impl<P: TriggerPolicy> PvBinding<P> {
    pub fn new(engine: FftEngine, policy: P) -> Self {
        Self { engine, policy }
    }

    /// Store the event's value, then run the controller if the policy says
    /// this event is a trigger. Returns `Ok(None)` for non-firing writes.
    pub fn dispatch(&mut self, event: BindingEvent) -> Result<Option<ExecutionOutcome>, EngineError> {
        let fires = self.policy.fires_on(&event);

        match event {
            BindingEvent::InputWritten(samples) => self.engine.set_input(samples),
            BindingEvent::WindowTypeWritten(raw) => {
                // Stored even when unsupported: the next trigger fails closed
                let _ = self.engine.write_window_selector(&raw);
            }
            BindingEvent::SampleFreqWritten(freq) => {
                self.engine.set_sample_freq(freq);
            }
            BindingEvent::ProcessRequested => {}
        }

        if fires {
            self.engine.execute().map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn mode(&self) -> TriggerMode {
        self.policy.mode()
    }

    pub fn engine(&self) -> &FftEngine {
        &self.engine
    }

    pub fn outputs(&self) -> OutputHandle {
        self.engine.outputs()
    }
}

impl std::fmt::Debug for dyn TriggerPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TriggerPolicy({})", self.mode())
    }
}
