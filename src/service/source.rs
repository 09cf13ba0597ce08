//! Event source abstraction for PV writes.
//!
//! Provides a unified trait for reading addressed binding events from
//! different sources: newline-delimited JSON (stdin or any async reader)
//! and in-memory replay.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::ServiceError;
use crate::binding::BindingEvent;
use crate::types::SignalType;

/// A binding event addressed to a named instance.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressedEvent {
    pub instance: String,
    pub event: BindingEvent,
}

/// Events produced by an event source.
#[derive(Debug)]
pub enum SourceEvent {
    Event(AddressedEvent),
    /// Source reached end of data.
    Eof,
}

/// One line of the JSON event format:
/// `{"instance":"A1","signal":"input-real","value":[0,1,0,0]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLine {
    pub instance: String,
    pub signal: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl EventLine {
    pub fn into_event(self) -> Result<AddressedEvent, ServiceError> {
        let signal: SignalType = self.signal.parse()?;
        Ok(AddressedEvent {
            instance: self.instance,
            event: event_from_signal(signal, self.value)?,
        })
    }
}

/// Convert a write on `signal` into a binding event.
pub fn event_from_signal(
    signal: SignalType,
    value: Option<serde_json::Value>,
) -> Result<BindingEvent, ServiceError> {
    let invalid = |reason: &str| ServiceError::InvalidValue {
        signal,
        reason: reason.to_string(),
    };

    match signal {
        SignalType::InputReal => {
            let value = value.ok_or_else(|| invalid("missing array value"))?;
            serde_json::from_value::<Vec<f64>>(value)
                .map(BindingEvent::InputWritten)
                .map_err(|e| invalid(&e.to_string()))
        }
        SignalType::SetWindowType => match value {
            Some(serde_json::Value::String(s)) => Ok(BindingEvent::WindowTypeWritten(s)),
            Some(serde_json::Value::Number(n)) => Ok(BindingEvent::WindowTypeWritten(window_index(&n))),
            _ => Err(invalid("expected a window name or index")),
        },
        SignalType::SetSampleFreq => value
            .as_ref()
            .and_then(serde_json::Value::as_f64)
            .map(BindingEvent::SampleFreqWritten)
            .ok_or_else(|| invalid("expected a number")),
        SignalType::Process => Ok(BindingEvent::ProcessRequested),
        other => Err(ServiceError::ReadOnlySignal { signal: other }),
    }
}

/// Numeric selector as written to the enum record. Integral floats (`1.0`)
/// name the same index as `1`.
fn window_index(n: &serde_json::Number) -> String {
    match (n.as_u64(), n.as_f64()) {
        (Some(index), _) => index.to_string(),
        (None, Some(f)) if f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u16::MAX) => {
            (f as u16).to_string()
        }
        _ => n.to_string(),
    }
}

/// Trait abstracting where binding events come from.
#[async_trait]
pub trait EventSource: Send + 'static {
    /// Read the next event. Returns `SourceEvent::Eof` when no more data is
    /// available.
    async fn next_event(&mut self) -> Result<SourceEvent>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

// ============================================================================
// Line Source (JSON events, one per line)
// ============================================================================

/// Reads JSON event lines from an async reader.
///
/// Malformed lines are logged and skipped.
pub struct LineSource<R> {
    reader: R,
    name: String,
    line_buffer: String,
}

/// JSON events on stdin: `producer | pv-fft run`
pub type StdinSource = LineSource<tokio::io::BufReader<tokio::io::Stdin>>;

impl StdinSource {
    pub fn stdin() -> Self {
        LineSource::new(tokio::io::BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader,
            name: name.into(),
            line_buffer: String::with_capacity(2048),
        }
    }
}

#[async_trait]
impl<R> EventSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn next_event(&mut self) -> Result<SourceEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(SourceEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<EventLine>(line)
                .map_err(anyhow::Error::from)
                .and_then(|l| l.into_event().map_err(anyhow::Error::from));
            match parsed {
                Ok(event) => return Ok(SourceEvent::Event(event)),
                Err(e) => {
                    tracing::warn!(source = %self.name, error = %e, "Skipping malformed event line");
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Replay Source
// ============================================================================

/// Replays pre-built events in order.
pub struct ReplaySource {
    events: std::vec::IntoIter<AddressedEvent>,
}

impl ReplaySource {
    pub fn new(events: Vec<AddressedEvent>) -> Self {
        Self {
            events: events.into_iter(),
        }
    }
}

#[async_trait]
impl EventSource for ReplaySource {
    async fn next_event(&mut self) -> Result<SourceEvent> {
        Ok(self
            .events
            .next()
            .map_or(SourceEvent::Eof, SourceEvent::Event))
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}
