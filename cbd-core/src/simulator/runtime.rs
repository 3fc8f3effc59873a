use crate::block::{BlockState, StepContext};
use crate::errors::{CbdError, CbdResult};
use crate::events::{EventContext, EventLocator, Location, StateEvent};
use crate::graph::{FlatModel, ModelGraph};
use crate::interpolate::Sample;
use crate::loopsolvers::LoopSolver;
use crate::rate::RateController;
use crate::config::RealtimeConfig;
use crate::realtime::{AsFastAsPossible, BlockingPacer, Synchronizer};
use crate::schedule::{compute_schedule, Schedule};
use crate::signal_store::{SignalId, SignalStore};
use log::{debug, info, warn};
use std::fmt;

use super::execution::{Engine, PendingStep};
use super::observer::Observer;
use super::{
    Clock, FinishReason, RunControl, SimulationState, StepReport, TerminationCondition,
};

/// Times closer than this fraction of a step are considered equal.
const TIME_EPSILON: f64 = 1e-9;

/// A crossing located within the step that is being executed.
#[derive(Debug, Clone, Copy)]
struct Crossing {
    event: usize,
    time: f64,
    /// Time of the sample before the crossing.
    previous: f64,
}

fn initial_states(graph: &ModelGraph, model: &FlatModel) -> Vec<BlockState> {
    model
        .blocks()
        .iter()
        .map(|flat| {
            graph
                .block_at(&flat.address)
                .map(|b| b.initial_state())
                .unwrap_or_default()
        })
        .collect()
}

/// Executes a model step by step. Built with a [`SimulatorBuilder`](super::SimulatorBuilder).
///
/// Configuration may be changed between steps. A structural change of the graph is picked
/// up before the next step: the schedule is recomputed and the state of blocks that still
/// exist is carried over.
pub struct Simulator {
    pub(super) graph: ModelGraph,
    pub(super) schedule: Schedule,
    pub(super) store: SignalStore,
    pub(super) states: Vec<BlockState>,
    pub(super) rates: RateController,
    pub(super) solver: Box<dyn LoopSolver>,
    pub(super) locator: Box<dyn EventLocator>,
    pub(super) events: Vec<StateEvent>,
    /// The leaf signal monitored by each event.
    pub(super) event_signals: Vec<SignalId>,
    pub(super) observers: Vec<Box<dyn Observer>>,
    pub(super) termination: Option<TerminationCondition>,
    pub(super) end_time: Option<f64>,
    pub(super) clock: Clock,
    pub(super) state: SimulationState,
    pub(super) control: RunControl,
    /// Pacing used by [`Simulator::run`].
    pub(super) realtime: Option<RealtimeConfig>,
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("graph", &self.graph.name())
            .field("state", &self.state)
            .field("clock", &self.clock)
            .field("solver", &self.solver)
            .field("locator", &self.locator)
            .field("events", &self.events)
            .finish()
    }
}

impl Simulator {
    /// Set up states, signals and event bindings for the current schedule.
    pub(super) fn initialise(&mut self) -> CbdResult<()> {
        self.rates.validate(self.schedule.model())?;
        self.states = initial_states(&self.graph, self.schedule.model());
        for id in self.schedule.model().signals() {
            self.store.register(id);
        }
        self.event_signals = self.resolve_events()?;
        Ok(())
    }

    fn resolve_events(&self) -> CbdResult<Vec<SignalId>> {
        let model = self.schedule.model();
        self.events
            .iter()
            .map(|e| model.resolve_signal(e.block(), e.port()))
            .collect()
    }

    fn refresh_schedule(&mut self) -> CbdResult<()> {
        if self.schedule.structure_version() == self.graph.structure_version() {
            return Ok(());
        }
        let schedule = compute_schedule(&self.graph)?;
        self.rates.validate(schedule.model())?;

        let previous = self.schedule.model();
        let states = schedule
            .model()
            .blocks()
            .iter()
            .map(|flat| match previous.index_of(&flat.path) {
                Some(idx) => self.states[idx].clone(),
                None => self
                    .graph
                    .block_at(&flat.address)
                    .map(|b| b.initial_state())
                    .unwrap_or_default(),
            })
            .collect();
        debug!(
            "Model structure changed. Rescheduled {} blocks",
            schedule.model().len()
        );

        self.schedule = schedule;
        self.states = states;
        for id in self.schedule.model().signals() {
            self.store.register(id);
        }
        self.event_signals = self.resolve_events()?;
        Ok(())
    }

    fn engine(&mut self) -> (Engine<'_>, &mut dyn LoopSolver) {
        (
            Engine {
                graph: &self.graph,
                schedule: &self.schedule,
                store: &self.store,
                states: &self.states,
                rates: &self.rates,
            },
            self.solver.as_mut(),
        )
    }

    /// Execute one step.
    ///
    /// Starts the run when the simulator is idle and resumes it when paused. Any error ends
    /// the run in the [`SimulationState::Failed`] state and is returned.
    pub fn advance(&mut self) -> CbdResult<StepReport> {
        match self.state {
            SimulationState::Idle => self.start(),
            SimulationState::Paused => {
                info!("Resuming at t={}", self.clock.current());
                self.state = SimulationState::Running;
            }
            SimulationState::Running => {}
            SimulationState::Finished(_) | SimulationState::Failed(_) => {
                return Err(CbdError::InvalidState(self.state.to_string()))
            }
        }

        match self.step() {
            Ok(report) => {
                if let Some(reason) = report.finished {
                    self.finish(reason);
                }
                Ok(report)
            }
            Err(err) => {
                warn!("Simulation failed at t={}: {}", self.clock.current(), err);
                self.state = SimulationState::Failed(err.clone());
                Err(err)
            }
        }
    }

    fn start(&mut self) {
        let time = self.clock.next_time();
        info!("Starting {} at t={}", self.graph.name(), time);
        self.state = SimulationState::Running;
        for observer in self.observers.iter_mut() {
            observer.started(time);
        }
    }

    fn finish(&mut self, reason: FinishReason) {
        let time = self.clock.current();
        info!("Finished at t={}: {}", time, reason);
        self.state = SimulationState::Finished(reason);
        for observer in self.observers.iter_mut() {
            observer.finished(time, &reason);
        }
    }

    fn step(&mut self) -> CbdResult<StepReport> {
        self.refresh_schedule()?;

        let time = self.clock.next_time();
        for observer in self.observers.iter_mut() {
            observer.prestep(time);
        }

        let ctx = StepContext {
            time,
            start_time: self.clock.start_time,
            delta: self.clock.elapsed(time),
            iteration: self.clock.step,
        };
        let (engine, solver) = self.engine();
        let pending = engine.execute(ctx, solver)?;

        let crossings = self.detect_crossings(&pending)?;
        let fired = if crossings.is_empty() {
            self.commit(pending)?;
            self.clock.step += 1;
            vec![]
        } else {
            self.fire(&crossings, pending)?
        };

        let time = self.clock.current();
        for observer in self.observers.iter_mut() {
            observer.poststep(time, &self.store);
        }

        Ok(StepReport {
            time,
            fired,
            finished: self.check_termination(),
        })
    }

    fn commit(&mut self, pending: PendingStep) -> CbdResult<()> {
        let time = pending.ctx.time;
        for id in self.schedule.model().signals() {
            if let Some(value) = pending.values.get(id) {
                self.store.append(id, time, *value)?;
            }
        }
        for (leaf, state) in pending.states {
            self.states[leaf] = state;
        }
        self.clock.time = Some(time);
        Ok(())
    }

    /// Locate every armed event that crossed its level between the last committed sample and
    /// `pending`. Sorted by crossing time, then by the order the events were added.
    fn detect_crossings(&mut self, pending: &PendingStep) -> CbdResult<Vec<Crossing>> {
        let mut crossings = vec![];
        for (idx, event) in self.events.iter_mut().enumerate() {
            if !event.is_enabled() {
                continue;
            }
            if event.is_fired() {
                event.set_fired(false);
                continue;
            }
            let id = &self.event_signals[idx];
            let (Some(current), Some(previous)) = (pending.values.get(id), self.store.last(id))
            else {
                continue;
            };
            let lower = (previous.time, previous.value - event.level);
            let upper = (pending.ctx.time, current - event.level);
            if !event.direction.crossed(lower.1, upper.1) {
                continue;
            }

            let engine = Engine {
                graph: &self.graph,
                schedule: &self.schedule,
                store: &self.store,
                states: &self.states,
                rates: &self.rates,
            };
            let solver = self.solver.as_mut();
            let level = event.level;
            let base = pending.ctx;
            let mut evaluate = |time: f64| -> CbdResult<f64> {
                let ctx = StepContext {
                    time,
                    delta: time - lower.0,
                    ..base
                };
                let step = engine.execute(ctx, solver)?;
                step.values
                    .get(id)
                    .map(|v| v - level)
                    .ok_or_else(|| CbdError::NoSample {
                        signal: id.to_string(),
                        time,
                    })
            };

            let time = match self
                .locator
                .locate(lower, upper, event.direction, &mut evaluate)?
            {
                Location::Found(t) => t.clamp(lower.0, upper.0),
                Location::Failed(reason) => {
                    warn!(
                        "Could not locate event {} in [{}, {}] ({}). Reporting it at t={}",
                        event.name(),
                        lower.0,
                        upper.0,
                        reason,
                        upper.0
                    );
                    upper.0
                }
            };
            debug!("Event {} crosses {} at t={}", event.name(), level, time);
            crossings.push(Crossing {
                event: idx,
                time,
                previous: lower.0,
            });
        }
        crossings.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.event.cmp(&b.event)));
        Ok(crossings)
    }

    /// Advance the model to the earliest crossing and run the callbacks of every event that
    /// crossed at that time.
    ///
    /// A crossing at the later sample commits `pending` as is. A crossing strictly inside the
    /// step commits a micro-step at the crossing time and leaves the step index unchanged, so
    /// the next call executes the grid step again from the crossing.
    fn fire(&mut self, crossings: &[Crossing], pending: PendingStep) -> CbdResult<Vec<String>> {
        let first = crossings[0];
        let step_time = pending.ctx.time;
        let eps = TIME_EPSILON * (step_time - first.previous);

        let at = if first.time >= step_time - eps {
            self.commit(pending)?;
            self.clock.step += 1;
            step_time
        } else if first.time <= first.previous + eps {
            first.previous
        } else {
            let ctx = StepContext {
                time: first.time,
                delta: first.time - first.previous,
                ..pending.ctx
            };
            let (engine, solver) = self.engine();
            let micro = engine.execute(ctx, solver)?;
            self.commit(micro)?;
            first.time
        };

        let mut fired = vec![];
        let mut requests = vec![];
        for crossing in crossings.iter().filter(|c| c.time <= first.time + eps) {
            let event = &mut self.events[crossing.event];
            event.set_fired(true);
            let name = event.name().to_string();
            info!("Event {} fired at t={}", name, at);

            let mut ctx = EventContext::new(
                at,
                &name,
                &mut self.graph,
                self.schedule.model(),
                &mut self.states,
                &self.store,
            );
            event.fire(&mut ctx)?;
            requests.extend(ctx.into_requests());
            fired.push(name);
        }

        for (name, armed) in requests {
            let event = self
                .events
                .iter_mut()
                .find(|e| e.name() == name)
                .ok_or_else(|| CbdError::UnknownEvent(name.clone()))?;
            event.set_enabled(armed);
        }
        Ok(fired)
    }

    fn check_termination(&self) -> Option<FinishReason> {
        let time = self.clock.time?;
        if let Some(condition) = &self.termination {
            if condition(&self.store, time) {
                return Some(FinishReason::Condition);
            }
        }
        match self.end_time {
            Some(end) if time >= end - TIME_EPSILON * self.clock.delta => {
                Some(FinishReason::EndTime)
            }
            _ => None,
        }
    }

    /// Apply pending pause or cancel requests.
    ///
    /// Returns true while the simulation may be advanced.
    pub fn poll_control(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if self.control.take_cancel() {
            self.finish(FinishReason::Cancelled);
            return false;
        }
        if self.control.take_pause() {
            info!("Paused at t={}", self.clock.current());
            self.state = SimulationState::Paused;
            return false;
        }
        true
    }

    /// Leave the [`SimulationState::Paused`] state without executing a step.
    pub fn resume(&mut self) {
        if self.state == SimulationState::Paused {
            info!("Resuming at t={}", self.clock.current());
            self.state = SimulationState::Running;
        }
    }

    /// Run until the run finishes, fails or is paused.
    ///
    /// Steps are paced against the wall clock when a [`RealtimeConfig`] was configured and
    /// run as fast as possible otherwise.
    pub fn run(&mut self) -> CbdResult<SimulationState> {
        match self.realtime.clone() {
            Some(realtime) => self.run_paced(&mut BlockingPacer::from_config(&realtime)),
            None => self.run_paced(&mut AsFastAsPossible),
        }
    }

    pub fn realtime(&self) -> Option<&RealtimeConfig> {
        self.realtime.as_ref()
    }

    /// Run until the run finishes, fails or is paused, waiting on `pacer` before every step.
    pub fn run_paced(&mut self, pacer: &mut dyn Synchronizer) -> CbdResult<SimulationState> {
        if self.state.is_terminal() {
            return Err(CbdError::InvalidState(self.state.to_string()));
        }
        if self.end_time.is_none() && self.termination.is_none() {
            warn!(
                "{} has no end time or termination condition and runs until cancelled",
                self.graph.name()
            );
        }
        pacer.start(self.clock.next_time());
        while self.poll_control() {
            pacer.wait_until(self.clock.next_time());
            if self.advance()?.finished.is_some() {
                break;
            }
        }
        Ok(self.state.clone())
    }

    /// Return to [`SimulationState::Idle`], dropping the history and restoring the initial
    /// state of every block. Configuration is kept.
    pub fn reset(&mut self) {
        self.store.clear();
        self.states = initial_states(&self.graph, self.schedule.model());
        self.clock = Clock::new(self.clock.start_time, self.clock.delta);
        for event in self.events.iter_mut() {
            event.set_fired(false);
        }
        self.control.take_pause();
        self.control.take_cancel();
        self.state = SimulationState::Idle;
        debug!("Reset {}", self.graph.name());
    }

    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Time of the last committed step, or the start time before the first step.
    pub fn time(&self) -> f64 {
        self.clock.current()
    }

    /// Time of the step the next call to [`Simulator::advance`] executes.
    pub fn next_time(&self) -> f64 {
        self.clock.next_time()
    }

    /// Index of the step the next call to [`Simulator::advance`] executes.
    pub fn step_index(&self) -> usize {
        self.clock.step
    }

    pub fn delta(&self) -> f64 {
        self.clock.delta
    }

    /// Change the base step size from the next step on.
    pub fn set_delta(&mut self, delta: f64) -> CbdResult<()> {
        if !(delta.is_finite() && delta > 0.0) {
            return Err(CbdError::Config(format!(
                "delta must be positive, got {}",
                delta
            )));
        }
        self.clock.set_delta(delta);
        Ok(())
    }

    pub fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    pub fn set_end_time(&mut self, end_time: Option<f64>) {
        self.end_time = end_time;
    }

    pub fn set_termination_condition(
        &mut self,
        condition: impl Fn(&SignalStore, f64) -> bool + Send + 'static,
    ) {
        self.termination = Some(Box::new(condition));
    }

    pub fn set_rate(&mut self, path: &str, rate: u32) -> CbdResult<()> {
        if !self.schedule.model().contains_path(path) {
            return Err(CbdError::UnknownBlock(path.to_string()));
        }
        self.rates.set_rate(path, rate)
    }

    pub fn rates(&self) -> &RateController {
        &self.rates
    }

    pub fn add_event(&mut self, event: StateEvent) -> CbdResult<()> {
        let id = self
            .schedule
            .model()
            .resolve_signal(event.block(), event.port())?;
        self.events.push(event);
        self.event_signals.push(id);
        Ok(())
    }

    pub fn events(&self) -> &[StateEvent] {
        &self.events
    }

    pub fn event_mut(&mut self, name: &str) -> Option<&mut StateEvent> {
        self.events.iter_mut().find(|e| e.name() == name)
    }

    pub fn set_solver(&mut self, solver: Box<dyn LoopSolver>) {
        self.solver = solver;
    }

    pub fn solver(&self) -> &dyn LoopSolver {
        self.solver.as_ref()
    }

    pub fn set_locator(&mut self, locator: Box<dyn EventLocator>) {
        self.locator = locator;
    }

    pub fn add_observer(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn graph(&self) -> &ModelGraph {
        &self.graph
    }

    /// Mutable access to the model between steps.
    pub fn graph_mut(&mut self) -> &mut ModelGraph {
        &mut self.graph
    }

    pub fn set_parameter(&mut self, path: &str, name: &str, value: f64) -> CbdResult<()> {
        self.graph.set_parameter(path, name, value)
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn store(&self) -> &SignalStore {
        &self.store
    }

    /// The committed samples of `block.port`, oldest first.
    ///
    /// Composite outputs resolve to the inner signal that produces them.
    pub fn history(&self, block: &str, port: &str) -> CbdResult<&[Sample]> {
        let id = self.schedule.model().resolve_signal(block, port)?;
        Ok(self.store.history(&id))
    }

    /// Values of `block.port`, oldest first.
    pub fn values(&self, block: &str, port: &str) -> CbdResult<Vec<f64>> {
        Ok(self.history(block, port)?.iter().map(|s| s.value).collect())
    }

    pub fn block_state(&self, path: &str) -> CbdResult<&BlockState> {
        self.schedule
            .model()
            .index_of(path)
            .map(|idx| &self.states[idx])
            .ok_or_else(|| CbdError::UnknownBlock(path.to_string()))
    }

    pub fn as_dot(&self) -> String {
        self.graph.as_dot()
    }
}
