//! Published engine outputs.
//!
//! The controller holds the only `OutputWriter`; observers clone
//! `OutputHandle`s. The real and imaginary arrays live in one `Publication`
//! behind a single `ArcSwap`, so a reader always sees both halves from the
//! same execution.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::processing::SpectrumHalf;
use crate::types::{AlarmState, SignalType};

/// One execution's spectrum and derived arrays, published together.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Publication {
    pub spectrum: SpectrumHalf,
    /// Magnitude in dB, when enabled
    pub magnitude: Option<Vec<f64>>,
    /// Phase in radians, when enabled
    pub phase: Option<Vec<f64>>,
    /// Execution number that produced this publication (0 = initial value)
    pub execution: u64,
    pub published_at: Option<DateTime<Utc>>,
}

struct Shared {
    publication: ArcSwap<Publication>,
    fscale: ArcSwap<Vec<f64>>,
    window: ArcSwap<Vec<f64>>,
    alarm: ArcSwap<AlarmState>,
    count: AtomicU64,
    exec_time_bits: AtomicU64,
    updates: watch::Sender<u64>,
}

/// Read side of an engine's outputs.
#[derive(Clone)]
pub struct OutputHandle {
    shared: Arc<Shared>,
}

/// Write side, owned by the controller.
pub(crate) struct OutputWriter {
    shared: Arc<Shared>,
}

/// Create an initialized output set: count 0, empty arrays, alarm clear.
pub(crate) fn output_channel() -> (OutputWriter, OutputHandle) {
    let (updates, _) = watch::channel(0);
    let shared = Arc::new(Shared {
        publication: ArcSwap::from_pointee(Publication::default()),
        fscale: ArcSwap::from_pointee(Vec::new()),
        window: ArcSwap::from_pointee(Vec::new()),
        alarm: ArcSwap::from_pointee(AlarmState::CLEAR),
        count: AtomicU64::new(0),
        exec_time_bits: AtomicU64::new(0f64.to_bits()),
        updates,
    });
    (
        OutputWriter {
            shared: Arc::clone(&shared),
        },
        OutputHandle { shared },
    )
}

impl OutputHandle {
    /// Latest real/imaginary pair (plus derived arrays) as one snapshot.
    pub fn snapshot(&self) -> Arc<Publication> {
        self.shared.publication.load_full()
    }

    /// Number of successful executions.
    pub fn count(&self) -> u64 {
        self.shared.count.load(Ordering::Acquire)
    }

    /// Alarm attached to the input binding.
    pub fn alarm(&self) -> AlarmState {
        **self.shared.alarm.load()
    }

    pub fn frequency_scale(&self) -> Arc<Vec<f64>> {
        self.shared.fscale.load_full()
    }

    pub fn window(&self) -> Arc<Vec<f64>> {
        self.shared.window.load_full()
    }

    /// Wall-clock duration of the last successful execution (seconds).
    pub fn exec_time(&self) -> f64 {
        f64::from_bits(self.shared.exec_time_bits.load(Ordering::Acquire))
    }

    /// Receiver notified with the new count after every publication.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.updates.subscribe()
    }

    /// Current value of an output signal as JSON. Input signals have no
    /// published value and return `None`.
    pub fn read_signal(&self, signal: SignalType) -> Option<serde_json::Value> {
        let publication = self.snapshot();
        let value = match signal {
            SignalType::OutputReal => serde_json::json!(publication.spectrum.real),
            SignalType::OutputImag => serde_json::json!(publication.spectrum.imag),
            SignalType::OutputMagn => serde_json::json!(publication.magnitude),
            SignalType::OutputPhas => serde_json::json!(publication.phase),
            SignalType::OutputFscale => serde_json::json!(self.frequency_scale().as_slice()),
            SignalType::OutputWindow => serde_json::json!(self.window().as_slice()),
            SignalType::ExecutionTime => serde_json::json!(self.exec_time()),
            SignalType::ExecutionCount => serde_json::json!(self.count()),
            SignalType::InputReal
            | SignalType::SetWindowType
            | SignalType::SetSampleFreq
            | SignalType::Process => return None,
        };
        Some(value)
    }
}

impl std::fmt::Debug for OutputHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputHandle")
            .field("count", &self.count())
            .field("alarm", &self.alarm())
            .field("bins", &self.snapshot().spectrum.len())
            .finish()
    }
}

impl OutputWriter {
    /// Replace the spectrum pair in one store.
    pub fn publish(&self, publication: Publication) {
        self.shared.publication.store(Arc::new(publication));
    }

    pub fn publish_scale(&self, fscale: Vec<f64>) {
        self.shared.fscale.store(Arc::new(fscale));
    }

    pub fn publish_window(&self, window: Vec<f64>) {
        self.shared.window.store(Arc::new(window));
    }

    pub fn set_alarm(&self, alarm: AlarmState) {
        self.shared.alarm.store(Arc::new(alarm));
    }

    /// Clear the alarm if one is set.
    pub fn clear_alarm(&self) {
        if self.shared.alarm.load().is_alarmed() {
            self.shared.alarm.store(Arc::new(AlarmState::CLEAR));
        }
    }

    pub fn set_exec_time(&self, secs: f64) {
        self.shared
            .exec_time_bits
            .store(secs.to_bits(), Ordering::Release);
    }

    pub fn count(&self) -> u64 {
        self.shared.count.load(Ordering::Acquire)
    }

    /// Bump the execution count and notify subscribers. Returns the new count.
    pub fn increment_count(&self) -> u64 {
        let count = self.shared.count.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.updates.send_replace(count);
        count
    }
}
