//! The capability interface implemented by every block.
//!
//! A block declares its ports and provides a pure computation from the current
//! inputs (and its own explicit state) to its outputs.
//! Persistent state is owned by the simulator and handed to the block on every call,
//! so the same block value can be evaluated repeatedly (for example while an
//! algebraic loop is iterated or an event is located) without side effects.

use crate::errors::{CbdError, CbdResult};
use crate::graph::ModelGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

pub type PortName = String;

/// Information about the step that is being computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepContext {
    /// Simulated time of the step.
    pub time: f64,
    /// Time at which the run started.
    pub start_time: f64,
    /// Time elapsed since the previously committed step.
    pub delta: f64,
    /// Index of the step since the start of the run.
    pub iteration: usize,
}

impl StepContext {
    pub fn new(time: f64, delta: f64, iteration: usize) -> Self {
        Self {
            time,
            start_time: 0.0,
            delta,
            iteration,
        }
    }

    pub fn relative_time(&self) -> f64 {
        self.time - self.start_time
    }
}

/// Explicit persistent state of a block, e.g. the remembered value of a delay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockState(pub Vec<f64>);

impl BlockState {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

/// The values available on a block's input ports for the current iteration.
///
/// A port whose value could not be read (no sample, forbidden extrapolation,
/// unconnected optional input) carries the reason instead of a value.
/// The block decides whether that fails the step ([`InputValues::value`]) or is
/// replaced by a default ([`InputValues::value_or`]).
#[derive(Debug, Clone, Default)]
pub struct InputValues {
    block: String,
    values: HashMap<PortName, CbdResult<f64>>,
}

impl InputValues {
    pub fn new(block: &str) -> Self {
        Self {
            block: block.to_string(),
            values: HashMap::new(),
        }
    }

    /// Build a set of inputs where every value is available.
    pub fn from_values<'a>(values: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        let mut inputs = Self::default();
        for (port, value) in values {
            inputs.insert(port, Ok(value));
        }
        inputs
    }

    /// Path of the block these inputs belong to.
    pub fn block(&self) -> &str {
        &self.block
    }

    /// A [`CbdError::Block`] raised by the block these inputs belong to.
    pub fn error(&self, message: impl Into<String>) -> CbdError {
        CbdError::Block {
            block: self.block.clone(),
            message: message.into(),
        }
    }

    pub fn insert(&mut self, port: &str, value: CbdResult<f64>) {
        self.values.insert(port.to_string(), value);
    }

    pub fn value(&self, port: &str) -> CbdResult<f64> {
        match self.values.get(port) {
            Some(value) => value.clone(),
            None => Err(CbdError::UnknownPort {
                block: self.block.clone(),
                port: port.to_string(),
                direction: "input".to_string(),
            }),
        }
    }

    pub fn value_or(&self, port: &str, default: f64) -> f64 {
        self.value(port).unwrap_or(default)
    }

    /// Values of several ports, in the order given.
    pub fn values(&self, ports: &[PortName]) -> CbdResult<Vec<f64>> {
        ports.iter().map(|p| self.value(p)).collect()
    }
}

/// Values produced on a block's output ports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputValues(BTreeMap<PortName, f64>);

impl OutputValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a block with a single `OUT1` port.
    pub fn single(value: f64) -> Self {
        Self::new().with("OUT1", value)
    }

    pub fn with(mut self, port: &str, value: f64) -> Self {
        self.insert(port, value);
        self
    }

    pub fn insert(&mut self, port: &str, value: f64) {
        self.0.insert(port.to_string(), value);
    }

    pub fn get(&self, port: &str) -> Option<f64> {
        self.0.get(port).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PortName, &f64)> {
        self.0.iter()
    }
}

/// One output expressed as a linear combination of the block's inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearEquation {
    pub output: PortName,
    /// Coefficient per input port.
    pub terms: Vec<(PortName, f64)>,
    pub constant: f64,
}

/// Linear description of a block's outputs, used by the exact loop solver.
///
/// Coefficients must only depend on the block's parameters. The constant terms may
/// depend on the step (time, state).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearForm(pub Vec<LinearEquation>);

impl LinearForm {
    pub fn single(output: &str, terms: Vec<(&str, f64)>, constant: f64) -> Self {
        Self(vec![LinearEquation {
            output: output.to_string(),
            terms: terms
                .into_iter()
                .map(|(port, coefficient)| (port.to_string(), coefficient))
                .collect(),
            constant,
        }])
    }
}

/// Helper to generate numbered port names (`IN1`, `IN2`, ...).
pub fn numbered_ports(prefix: &str, count: usize) -> Vec<PortName> {
    (1..=count).map(|i| format!("{}{}", prefix, i)).collect()
}

/// A computational unit of a block diagram.
///
/// Blocks are dispatched dynamically and serialised through `typetag`,
/// so any block type can be stored in a [`ModelGraph`].
#[typetag::serde]
pub trait Block: Debug + Send + Sync {
    /// Ordered input port names.
    fn input_ports(&self) -> Vec<PortName>;

    /// Ordered output port names.
    fn output_ports(&self) -> Vec<PortName>;

    /// Inputs whose current value is needed to compute the outputs at `iteration`.
    ///
    /// Inputs missing from this list are only consumed by [`Block::update`] and
    /// therefore do not create a scheduling dependency.
    fn direct_inputs(&self, _iteration: usize) -> Vec<PortName> {
        self.input_ports()
    }

    /// Inputs that must be connected for the model to be valid.
    fn required_inputs(&self) -> Vec<PortName> {
        self.input_ports()
    }

    fn initial_state(&self) -> BlockState {
        BlockState::default()
    }

    /// Compute the outputs for the current step.
    fn compute(
        &self,
        ctx: &StepContext,
        inputs: &InputValues,
        state: &BlockState,
    ) -> CbdResult<OutputValues>;

    /// Produce the state for the next step once every output of this step is known.
    fn update(
        &self,
        _ctx: &StepContext,
        _inputs: &InputValues,
        state: &BlockState,
    ) -> CbdResult<BlockState> {
        Ok(state.clone())
    }

    /// Linear description of the outputs, if the block is linear in its inputs.
    fn linear_form(&self, _ctx: &StepContext, _state: &BlockState) -> Option<LinearForm> {
        None
    }

    /// The nested graph of a composite block.
    fn subgraph(&self) -> Option<&ModelGraph> {
        None
    }

    fn subgraph_mut(&mut self) -> Option<&mut ModelGraph> {
        None
    }

    /// Current value of a named parameter.
    fn parameter(&self, _name: &str) -> Option<f64> {
        None
    }

    /// Change a named parameter.
    ///
    /// Blocks do not know their own path, so parameter errors leave `block` empty and
    /// [`ModelGraph::set_parameter`] fills it in.
    fn set_parameter(&mut self, name: &str, _value: f64) -> CbdResult<()> {
        Err(CbdError::ReadOnlyParameter {
            block: String::new(),
            name: name.to_string(),
        })
    }
}
