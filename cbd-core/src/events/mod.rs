//! Level-crossing state events.
//!
//! A [`StateEvent`] watches an output signal for a crossing through a level.
//! After every step the simulator compares the last committed sample with the newly
//! computed one. When a crossing is detected the configured [`EventLocator`] narrows
//! down the crossing time, the model is advanced to exactly that time and the event's
//! callback runs.

mod locators;

pub use locators::{
    BisectionLocator, EventLocator, ItpLocator, LinearLocator, Location, PostCrossingLocator,
    PreCrossingLocator, RegulaFalsiLocator,
};

use crate::block::BlockState;
use crate::errors::{CbdError, CbdResult};
use crate::graph::{FlatModel, ModelGraph};
use crate::interpolate::Sample;
use crate::signal_store::SignalStore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The direction of a level crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Either,
    /// From below the level to at or above it.
    Rising,
    /// From above the level to at or below it.
    Falling,
}

impl Direction {
    /// Whether two consecutive values, relative to the level, cross it.
    pub fn crossed(self, previous: f64, current: f64) -> bool {
        let rising = previous < 0.0 && current >= 0.0;
        let falling = previous > 0.0 && current <= 0.0;
        match self {
            Direction::Either => rising || falling,
            Direction::Rising => rising,
            Direction::Falling => falling,
        }
    }

    /// Whether the interval between two values (relative to the level) still contains
    /// a crossing. Touching the level counts.
    pub fn brackets(self, lower: f64, upper: f64) -> bool {
        let rising = lower <= 0.0 && 0.0 <= upper;
        let falling = lower >= 0.0 && 0.0 >= upper;
        match self {
            Direction::Either => rising || falling,
            Direction::Rising => rising,
            Direction::Falling => falling,
        }
    }
}

pub type EventCallback = Box<dyn FnMut(&mut EventContext<'_>) -> CbdResult<()> + Send>;

/// A crossing of `block.port` through `level`, with the callback to run when it happens.
///
/// Events are never removed during a run, only disabled.
pub struct StateEvent {
    name: String,
    block: String,
    port: String,
    pub level: f64,
    pub direction: Direction,
    callback: EventCallback,
    fired: bool,
    enabled: bool,
}

impl StateEvent {
    pub fn new(
        name: &str,
        block: &str,
        port: &str,
        level: f64,
        direction: Direction,
        callback: impl FnMut(&mut EventContext<'_>) -> CbdResult<()> + Send + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            block: block.to_string(),
            port: port.to_string(),
            level,
            direction,
            callback: Box::new(callback),
            fired: false,
            enabled: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block(&self) -> &str {
        &self.block
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Set during the step after the event fired, so that the sample the crossing was
    /// committed at cannot trigger it again.
    pub fn is_fired(&self) -> bool {
        self.fired
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_fired(&mut self, fired: bool) {
        self.fired = fired;
    }

    pub(crate) fn fire(&mut self, ctx: &mut EventContext<'_>) -> CbdResult<()> {
        (self.callback)(ctx)
    }
}

impl fmt::Debug for StateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEvent")
            .field("name", &self.name)
            .field("block", &self.block)
            .field("port", &self.port)
            .field("level", &self.level)
            .field("direction", &self.direction)
            .field("fired", &self.fired)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// What an event callback may inspect and change.
///
/// Committed history is read-only. Block state and parameters may be changed and events
/// may be armed or disarmed; those requests apply once the callback returns.
pub struct EventContext<'a> {
    time: f64,
    event: String,
    graph: &'a mut ModelGraph,
    model: &'a FlatModel,
    states: &'a mut [BlockState],
    store: &'a SignalStore,
    requests: Vec<(String, bool)>,
}

impl<'a> EventContext<'a> {
    pub(crate) fn new(
        time: f64,
        event: &str,
        graph: &'a mut ModelGraph,
        model: &'a FlatModel,
        states: &'a mut [BlockState],
        store: &'a SignalStore,
    ) -> Self {
        Self {
            time,
            event: event.to_string(),
            graph,
            model,
            states,
            store,
            requests: vec![],
        }
    }

    /// The located crossing time.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn parameter(&self, path: &str, name: &str) -> CbdResult<f64> {
        self.graph.parameter(path, name)
    }

    pub fn set_parameter(&mut self, path: &str, name: &str, value: f64) -> CbdResult<()> {
        self.graph.set_parameter(path, name, value)
    }

    fn leaf(&self, path: &str) -> CbdResult<usize> {
        self.model
            .index_of(path)
            .ok_or_else(|| CbdError::UnknownBlock(path.to_string()))
    }

    pub fn state(&self, path: &str) -> CbdResult<&BlockState> {
        let idx = self.leaf(path)?;
        Ok(&self.states[idx])
    }

    /// Replace the persistent state of the leaf block at `path`.
    pub fn set_state(&mut self, path: &str, state: BlockState) -> CbdResult<()> {
        let idx = self.leaf(path)?;
        self.states[idx] = state;
        Ok(())
    }

    pub fn arm(&mut self, event: &str) {
        self.requests.push((event.to_string(), true));
    }

    pub fn disarm(&mut self, event: &str) {
        self.requests.push((event.to_string(), false));
    }

    pub fn history(&self, block: &str, port: &str) -> CbdResult<&[Sample]> {
        let id = self.model.resolve_signal(block, port)?;
        Ok(self.store.history(&id))
    }

    /// The most recently committed value of `block.port`.
    pub fn value(&self, block: &str, port: &str) -> CbdResult<f64> {
        let id = self.model.resolve_signal(block, port)?;
        self.store
            .last(&id)
            .map(|s| s.value)
            .ok_or(CbdError::NoSample {
                signal: id.to_string(),
                time: self.time,
            })
    }

    pub(crate) fn into_requests(self) -> Vec<(String, bool)> {
        self.requests
    }
}
