use crate::signal_store::SignalStore;
use log::{debug, info};

use super::FinishReason;

/// Receives lifecycle notifications from a [`Simulator`](super::Simulator).
///
/// Observers only read. They are called on the simulation thread between steps.
pub trait Observer: Send {
    fn started(&mut self, _time: f64) {}

    fn prestep(&mut self, _time: f64) {}

    fn poststep(&mut self, _time: f64, _store: &SignalStore) {}

    fn finished(&mut self, _time: f64, _reason: &FinishReason) {}
}

/// Reports the progress of a run through `log`.
#[derive(Debug, Default)]
pub struct LogTracer {
    steps: usize,
}

impl LogTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed steps seen so far.
    pub fn steps(&self) -> usize {
        self.steps
    }
}

impl Observer for LogTracer {
    fn started(&mut self, time: f64) {
        self.steps = 0;
        info!("Simulation started at t={}", time);
    }

    fn prestep(&mut self, time: f64) {
        debug!("Step {} at t={}", self.steps, time);
    }

    fn poststep(&mut self, time: f64, store: &SignalStore) {
        self.steps += 1;
        debug!("Committed t={} ({} signals)", time, store.len());
    }

    fn finished(&mut self, time: f64, reason: &FinishReason) {
        info!(
            "Simulation finished at t={} after {} steps: {}",
            time, self.steps, reason
        );
    }
}
