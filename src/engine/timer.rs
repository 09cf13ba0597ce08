use std::time::{Duration, Instant};

/// Per-phase stopwatch for one execution.
///
/// Each `maybe_snap` measures the time since the previous snap and logs it
/// at debug level when it exceeds the phase threshold.
#[derive(Debug)]
pub struct PhaseTimer<'a> {
    instance: &'a str,
    started: Instant,
    last: Instant,
}

impl<'a> PhaseTimer<'a> {
    pub fn start(instance: &'a str) -> Self {
        let now = Instant::now();
        Self {
            instance,
            started: now,
            last: now,
        }
    }

    /// Time since the previous snap, logged if over `threshold_secs`.
    pub fn maybe_snap(&mut self, phase: &str, threshold_secs: f64) -> Duration {
        let now = Instant::now();
        let interval = now - self.last;
        self.last = now;
        if interval.as_secs_f64() > threshold_secs {
            tracing::debug!(
                instance = %self.instance,
                phase,
                elapsed_us = interval.as_micros() as u64,
                threshold_us = (threshold_secs * 1e6) as u64,
                "Execution phase over threshold"
            );
        }
        interval
    }

    /// Total time since `start`.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
