//! Assembling a [`Simulator`] from a model graph and its run configuration.

use crate::config::{RealtimeConfig, SimulationConfig};
use crate::errors::{CbdError, CbdResult};
use crate::events::{EventLocator, RegulaFalsiLocator, StateEvent};
use crate::graph::ModelGraph;
use crate::loopsolvers::{FixedPointSolver, LoopSolver};
use crate::rate::RateController;
use crate::schedule::compute_schedule;
use crate::signal_store::SignalStore;
use log::debug;
use std::mem;

use super::observer::Observer;
use super::runtime::Simulator;
use super::{Clock, RunControl, SimulationState, TerminationCondition};

/// Build a new simulator for a model graph.
///
/// The graph is scheduled when [`SimulatorBuilder::build`] is called, so every structural
/// error surfaces there before any block is executed.
/// Building consumes the configured graph, events and observers. The builder is left
/// with an empty graph.
pub struct SimulatorBuilder {
    graph: ModelGraph,
    delta: f64,
    start_time: f64,
    end_time: Option<f64>,
    termination: Option<TerminationCondition>,
    solver: Box<dyn LoopSolver>,
    locator: Box<dyn EventLocator>,
    rates: Vec<(String, u32)>,
    events: Vec<StateEvent>,
    observers: Vec<Box<dyn Observer>>,
    realtime: Option<RealtimeConfig>,
}

impl SimulatorBuilder {
    /// Create a builder with a step size of 1, starting at t=0 without an end time.
    ///
    /// Loops are solved with a [`FixedPointSolver`] and events are located with
    /// [`RegulaFalsiLocator`] unless configured otherwise.
    pub fn new(graph: ModelGraph) -> Self {
        Self {
            graph,
            delta: 1.0,
            start_time: 0.0,
            end_time: None,
            termination: None,
            solver: Box::new(FixedPointSolver::default()),
            locator: Box::new(RegulaFalsiLocator::default()),
            rates: vec![],
            events: vec![],
            observers: vec![],
            realtime: None,
        }
    }

    /// Apply a run configuration.
    ///
    /// Replaces the step size, start and end time, solver, locator and wall-clock pacing,
    /// and adds the rates.
    pub fn with_config(&mut self, config: &SimulationConfig) -> &mut Self {
        self.delta = config.delta;
        self.realtime = config.realtime.clone();
        self.start_time = config.start_time;
        self.end_time = config.end_time;
        self.solver = config.solver.build();
        self.locator = config.locator.build();
        self.rates
            .extend(config.rates.iter().map(|(path, rate)| (path.clone(), *rate)));
        self
    }

    pub fn with_delta(&mut self, delta: f64) -> &mut Self {
        self.delta = delta;
        self
    }

    pub fn with_start_time(&mut self, start_time: f64) -> &mut Self {
        self.start_time = start_time;
        self
    }

    /// Finish once the clock reaches `end_time`. The step at `end_time` is executed.
    pub fn with_end_time(&mut self, end_time: f64) -> &mut Self {
        self.end_time = Some(end_time);
        self
    }

    /// Finish after the first step for which `condition` returns true.
    ///
    /// The condition is checked before the end time.
    pub fn with_termination_condition(
        &mut self,
        condition: impl Fn(&SignalStore, f64) -> bool + Send + 'static,
    ) -> &mut Self {
        self.termination = Some(Box::new(condition));
        self
    }

    pub fn with_solver(&mut self, solver: Box<dyn LoopSolver>) -> &mut Self {
        self.solver = solver;
        self
    }

    pub fn with_locator(&mut self, locator: Box<dyn EventLocator>) -> &mut Self {
        self.locator = locator;
        self
    }

    /// Execute the block (or every block of the composite) at `path` every `rate` steps.
    pub fn with_rate(&mut self, path: &str, rate: u32) -> &mut Self {
        self.rates.push((path.to_string(), rate));
        self
    }

    /// Pace [`Simulator::run`] against the wall clock.
    pub fn with_realtime(&mut self, realtime: RealtimeConfig) -> &mut Self {
        self.realtime = Some(realtime);
        self
    }

    pub fn with_event(&mut self, event: StateEvent) -> &mut Self {
        self.events.push(event);
        self
    }

    pub fn with_observer(&mut self, observer: Box<dyn Observer>) -> &mut Self {
        self.observers.push(observer);
        self
    }

    /// Schedule the graph and create the simulator.
    ///
    /// Fails with a structural error when the graph is malformed, a rate is invalid or refers
    /// to an unknown block, or an event monitors an unknown signal.
    pub fn build(&mut self) -> CbdResult<Simulator> {
        if !(self.delta.is_finite() && self.delta > 0.0) {
            return Err(CbdError::Config(format!(
                "delta must be positive, got {}",
                self.delta
            )));
        }
        if let Some(realtime) = &self.realtime {
            if !(realtime.scale.is_finite() && realtime.scale > 0.0) {
                return Err(CbdError::Config(format!(
                    "realtime scale must be positive, got {}",
                    realtime.scale
                )));
            }
        }
        if let Some(end) = self.end_time {
            if end < self.start_time {
                return Err(CbdError::Config(format!(
                    "end time {} is before the start time {}",
                    end, self.start_time
                )));
            }
        }

        let mut rates = RateController::new();
        for (path, rate) in &self.rates {
            rates.set_rate(path, *rate)?;
        }

        let schedule = compute_schedule(&self.graph)?;
        debug!(
            "Scheduled {} blocks: {:?}",
            schedule.model().len(),
            schedule.order_names(1)
        );

        let mut simulator = Simulator {
            graph: mem::take(&mut self.graph),
            schedule,
            store: SignalStore::new(),
            states: vec![],
            rates,
            solver: mem::replace(&mut self.solver, Box::new(FixedPointSolver::default())),
            locator: mem::replace(&mut self.locator, Box::new(RegulaFalsiLocator::default())),
            events: mem::take(&mut self.events),
            event_signals: vec![],
            observers: mem::take(&mut self.observers),
            termination: self.termination.take(),
            end_time: self.end_time,
            clock: Clock::new(self.start_time, self.delta),
            state: SimulationState::Idle,
            control: RunControl::new(),
            realtime: self.realtime.clone(),
        };
        simulator.initialise()?;
        Ok(simulator)
    }
}
