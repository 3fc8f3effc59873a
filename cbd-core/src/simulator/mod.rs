//! Driving a model through time.
//!
//! A [`Simulator`] owns the model graph, its schedule and the committed history of every
//! signal. [`Simulator::advance`] executes exactly one logical step:
//!
//! 1. the units that are due at the step index are computed in schedule order, solving
//!    algebraic loops with the configured [`LoopSolver`](crate::loopsolvers::LoopSolver),
//! 2. the persistent state of every executed block is updated,
//! 3. armed state events are checked against the new values and, if one crossed,
//!    the crossing is located and the model is advanced to exactly that time,
//! 4. the values are committed to the [`SignalStore`](crate::signal_store::SignalStore)
//!    and the termination conditions are evaluated.
//!
//! Real-time pacing is layered on top: [`Simulator::run_paced`] waits on a
//! [`Synchronizer`](crate::realtime::Synchronizer) between steps and the other drivers in
//! [`crate::realtime`] call `advance` themselves.

mod builder;
mod execution;
mod observer;
mod runtime;

pub use builder::SimulatorBuilder;
pub use observer::{LogTracer, Observer};
pub use runtime::Simulator;

use crate::errors::CbdError;
use crate::signal_store::SignalStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stops a run once it returns true. Receives the history and the time of the last
/// committed step.
pub type TerminationCondition = Box<dyn Fn(&SignalStore, f64) -> bool + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    /// The clock reached the configured end time.
    EndTime,
    /// The termination condition returned true.
    Condition,
    Cancelled,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::EndTime => write!(f, "end time reached"),
            FinishReason::Condition => write!(f, "termination condition met"),
            FinishReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationState {
    Idle,
    Running,
    Paused,
    Finished(FinishReason),
    Failed(CbdError),
}

impl SimulationState {
    /// Whether the simulator accepts further steps.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SimulationState::Finished(_) | SimulationState::Failed(_))
    }
}

impl fmt::Display for SimulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationState::Idle => write!(f, "idle"),
            SimulationState::Running => write!(f, "running"),
            SimulationState::Paused => write!(f, "paused"),
            SimulationState::Finished(reason) => write!(f, "finished ({})", reason),
            SimulationState::Failed(err) => write!(f, "failed ({})", err),
        }
    }
}

/// What happened during one call to [`Simulator::advance`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Time of the last committed step.
    pub time: f64,
    /// Names of the state events that fired, in firing order.
    pub fired: Vec<String>,
    pub finished: Option<FinishReason>,
}

/// Requests a running simulation to pause or cancel from another thread.
///
/// Requests are honoured at the next step boundary.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pause: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn pause_requested(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub(crate) fn take_pause(&self) -> bool {
        self.pause.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_cancel(&self) -> bool {
        self.cancel.swap(false, Ordering::SeqCst)
    }
}

/// The simulated clock.
///
/// Step times lie on a grid anchored at `origin_time`. Changing the step size re-anchors
/// the grid at the next step so that committed times never move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Clock {
    pub start_time: f64,
    pub delta: f64,
    origin_time: f64,
    origin_step: usize,
    /// Index of the next step to execute.
    pub step: usize,
    /// Time of the last committed step.
    pub time: Option<f64>,
}

impl Clock {
    pub fn new(start_time: f64, delta: f64) -> Self {
        Self {
            start_time,
            delta,
            origin_time: start_time,
            origin_step: 0,
            step: 0,
            time: None,
        }
    }

    pub fn next_time(&self) -> f64 {
        self.origin_time + (self.step - self.origin_step) as f64 * self.delta
    }

    pub fn set_delta(&mut self, delta: f64) {
        self.origin_time = self.next_time();
        self.origin_step = self.step;
        self.delta = delta;
    }

    /// Time elapsed between the last committed step and `time`.
    pub fn elapsed(&self, time: f64) -> f64 {
        match self.time {
            Some(previous) => time - previous,
            None => self.delta,
        }
    }

    /// The time the simulation is at: the last committed step, or the start.
    pub fn current(&self) -> f64 {
        self.time.unwrap_or(self.start_time)
    }
}

#[cfg(test)]
mod tests;
