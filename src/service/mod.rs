//! Engine service: one worker task per instance.
//!
//! Each binding is moved into its own tokio task and fed through a bounded
//! channel, so writes to one instance are handled strictly in order and
//! never overlap an execution in progress. Callers hold cloneable
//! [`InstanceHandle`]s and read outputs without going through the worker.

mod registry;
mod source;

pub use registry::EngineRegistry;
pub use source::{
    event_from_signal, AddressedEvent, EventLine, EventSource, LineSource, ReplaySource,
    SourceEvent, StdinSource,
};

use std::collections::BTreeMap;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::binding::{BindingEvent, PvBinding};
use crate::config::EngineConfig;
use crate::engine::{EngineError, ExecutionOutcome, OutputHandle};
use crate::types::{SignalType, TriggerMode, UnknownSignalType};

/// Errors surfaced to callers of the service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("No engine instance named '{0}'")]
    UnknownInstance(String),

    #[error(transparent)]
    UnknownSignal(#[from] UnknownSignalType),

    #[error("Signal '{signal}' is an output and cannot be written")]
    ReadOnlySignal { signal: SignalType },

    #[error("Invalid value for '{signal}': {reason}")]
    InvalidValue { signal: SignalType, reason: String },

    #[error("Worker for instance '{0}' has stopped")]
    WorkerStopped(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

type DispatchReply = oneshot::Sender<Result<Option<ExecutionOutcome>, EngineError>>;

enum Command {
    Dispatch {
        event: BindingEvent,
        reply: Option<DispatchReply>,
    },
    Report(oneshot::Sender<String>),
}

// ============================================================================
// Instance Handle
// ============================================================================

/// Cloneable handle to one running instance.
#[derive(Clone)]
pub struct InstanceHandle {
    name: String,
    mode: TriggerMode,
    sender: mpsc::Sender<Command>,
    outputs: OutputHandle,
}

impl InstanceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> TriggerMode {
        self.mode
    }

    /// Output side of the instance. Reads never wait on the worker.
    pub fn outputs(&self) -> &OutputHandle {
        &self.outputs
    }

    /// Deliver `event` and wait until the worker has handled it. Returns the
    /// execution outcome when the event fired the controller.
    pub async fn dispatch(&self, event: BindingEvent) -> Result<Option<ExecutionOutcome>, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Dispatch {
            event,
            reply: Some(tx),
        })
        .await?;
        let result = rx
            .await
            .map_err(|_| ServiceError::WorkerStopped(self.name.clone()))?;
        Ok(result?)
    }

    /// Deliver `event` without waiting for it to be handled.
    pub async fn post(&self, event: BindingEvent) -> Result<(), ServiceError> {
        self.send(Command::Dispatch { event, reply: None }).await
    }

    /// Write `value` to the named input signal and wait for the result.
    pub async fn write(
        &self,
        signal: SignalType,
        value: Option<serde_json::Value>,
    ) -> Result<Option<ExecutionOutcome>, ServiceError> {
        self.dispatch(event_from_signal(signal, value)?).await
    }

    /// Diagnostic report produced by the worker, so it reflects every event
    /// delivered before this call.
    pub async fn report(&self) -> Result<String, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Report(tx)).await?;
        rx.await
            .map_err(|_| ServiceError::WorkerStopped(self.name.clone()))
    }

    async fn send(&self, command: Command) -> Result<(), ServiceError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| ServiceError::WorkerStopped(self.name.clone()))
    }
}

impl std::fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("outputs", &self.outputs)
            .finish()
    }
}

// ============================================================================
// Service
// ============================================================================

/// Counters returned by [`EngineService::drive`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveStats {
    /// Events read from the source
    pub events: u64,
    /// Executions that published new outputs
    pub executions: u64,
    /// Executions that faulted on invalid input
    pub faults: u64,
    /// Events that could not be delivered or were refused by the engine
    pub rejected: u64,
}

/// Running set of engine workers.
pub struct EngineService {
    handles: BTreeMap<String, InstanceHandle>,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
}

impl EngineService {
    /// Build every configured instance and spawn its worker.
    pub fn start(config: &EngineConfig, cancel: CancellationToken) -> Self {
        let registry = EngineRegistry::from_config(config);
        Self::start_with(registry, cancel, |name| {
            config
                .instance(name)
                .map_or(config.defaults.channel_capacity, |i| {
                    i.channel_capacity_or(&config.defaults)
                })
        })
    }

    /// Spawn a worker for every binding in `registry`. `capacity` gives the
    /// event queue depth per instance name.
    pub fn start_with(
        registry: EngineRegistry,
        cancel: CancellationToken,
        capacity: impl Fn(&str) -> usize,
    ) -> Self {
        let mut handles = BTreeMap::new();
        let mut tasks = JoinSet::new();

        for (name, binding) in registry.into_bindings() {
            let (sender, receiver) = mpsc::channel(capacity(&name).max(1));
            let handle = InstanceHandle {
                name: name.clone(),
                mode: binding.mode(),
                sender,
                outputs: binding.outputs(),
            };
            tasks.spawn(run_worker(binding, receiver, cancel.child_token()));
            handles.insert(name, handle);
        }

        info!(instances = handles.len(), "Engine service started");
        Self {
            handles,
            tasks,
            cancel,
        }
    }

    pub fn find(&self, name: &str) -> Option<&InstanceHandle> {
        self.handles.get(name)
    }

    pub fn instance(&self, name: &str) -> Result<&InstanceHandle, ServiceError> {
        self.find(name)
            .ok_or_else(|| ServiceError::UnknownInstance(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Deliver an addressed event and wait for the result.
    pub async fn dispatch(&self, event: AddressedEvent) -> Result<Option<ExecutionOutcome>, ServiceError> {
        self.instance(&event.instance)?.dispatch(event.event).await
    }

    /// Feed events from `source` until it ends or the service is cancelled.
    pub async fn drive<S: EventSource>(&self, source: &mut S) -> DriveStats {
        let mut stats = DriveStats::default();
        info!(source = source.source_name(), "Reading binding events");

        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                result = source.next_event() => match result {
                    Ok(SourceEvent::Event(event)) => event,
                    Ok(SourceEvent::Eof) => {
                        info!(events = stats.events, "Event source reached end");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Event source error");
                        break;
                    }
                },
            };

            stats.events += 1;
            let instance = event.instance.clone();
            match self.dispatch(event).await {
                Ok(Some(ExecutionOutcome::Published { execution, bins })) => {
                    stats.executions += 1;
                    debug!(instance = %instance, execution, bins, "Spectrum published");
                }
                Ok(Some(ExecutionOutcome::Faulted(alarm))) => {
                    stats.faults += 1;
                    debug!(instance = %instance, alarm = %alarm, "Execution faulted");
                }
                Ok(None) => {}
                Err(e) => {
                    stats.rejected += 1;
                    warn!(instance = %instance, error = %e, "Event rejected");
                }
            }
        }

        stats
    }

    /// Cancel every worker and wait for them to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Engine worker ended abnormally");
            }
        }
        info!("Engine service stopped");
    }
}

impl std::fmt::Debug for EngineService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineService")
            .field("instances", &self.handles.keys().collect::<Vec<_>>())
            .finish()
    }
}

async fn run_worker(
    mut binding: PvBinding,
    mut receiver: mpsc::Receiver<Command>,
    cancel: CancellationToken,
) {
    let name = binding.engine().name().to_string();
    debug!(instance = %name, mode = %binding.mode(), "Engine worker started");

    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,
            command = receiver.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            Command::Dispatch { event, reply } => {
                let result = binding.dispatch(event);
                if let Err(e) = &result {
                    warn!(instance = %name, error = %e, "Engine refused to execute");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Command::Report(reply) => {
                let _ = reply.send(binding.engine().report());
            }
        }
    }

    debug!(instance = %name, "Engine worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AlarmState;

    fn service() -> EngineService {
        EngineService::start(&EngineConfig::default(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_start_default_instances() {
        let service = service();
        assert_eq!(service.names().collect::<Vec<_>>(), vec!["A1", "A2", "A3", "A4"]);
        assert_eq!(service.find("A4").map(InstanceHandle::mode), Some(TriggerMode::Process));
        assert!(matches!(
            service.instance("B1"),
            Err(ServiceError::UnknownInstance(_))
        ));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_dispatch_value_change() {
        let service = service();
        let a1 = service.instance("A1").unwrap().clone();

        let outcome = a1
            .dispatch(BindingEvent::InputWritten(vec![0.0, 1.0, 0.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(outcome, Some(ExecutionOutcome::Published { execution: 1, bins: 3 }));
        assert_eq!(a1.outputs().snapshot().spectrum.real, vec![1.0, 0.0, -1.0]);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_process_instance_faults_on_empty() {
        let service = service();
        let a4 = service.instance("A4").unwrap();

        let outcome = a4.write(SignalType::Process, None).await.unwrap();
        assert_eq!(outcome, Some(ExecutionOutcome::Faulted(AlarmState::invalid_write())));
        assert_eq!(a4.outputs().count(), 0);
        assert!(a4.report().await.unwrap().contains("Instance A4"));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_unsupported_window_is_an_error() {
        let service = service();
        let a1 = service.instance("A1").unwrap();

        a1.write(SignalType::SetWindowType, Some(serde_json::json!("Kaiser")))
            .await
            .unwrap();
        let result = a1
            .write(SignalType::InputReal, Some(serde_json::json!([1.0, 2.0])))
            .await;
        assert!(matches!(result, Err(ServiceError::Engine(EngineError::UnsupportedWindowType(_)))));
        assert_eq!(a1.outputs().count(), 0);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_drive_replay() {
        let service = service();
        let event = |instance: &str, event| AddressedEvent {
            instance: instance.to_string(),
            event,
        };
        let mut source = ReplaySource::new(vec![
            event("A2", BindingEvent::InputWritten(vec![1.0, 1.0])),
            event("A4", BindingEvent::InputWritten(vec![1.0, 1.0])),
            event("A4", BindingEvent::ProcessRequested),
            event("A3", BindingEvent::ProcessRequested),
            event("A3", BindingEvent::InputWritten(vec![])),
            event("Z9", BindingEvent::ProcessRequested),
        ]);

        let stats = service.drive(&mut source).await;
        assert_eq!(
            stats,
            DriveStats {
                events: 6,
                executions: 2,
                faults: 1,
                rejected: 1,
            }
        );
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_handles_fail_after_shutdown() {
        let service = service();
        let a1 = service.instance("A1").unwrap().clone();
        service.shutdown().await;

        let result = a1.post(BindingEvent::ProcessRequested).await;
        assert!(matches!(result, Err(ServiceError::WorkerStopped(_))));
    }
}
