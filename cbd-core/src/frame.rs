//! Evaluation of blocks within a single step.

use crate::block::{Block, BlockState, InputValues, StepContext};
use crate::errors::{CbdError, CbdResult};
use crate::graph::{FlatModel, ModelGraph};
use crate::interpolate::ReadPolicy;
use crate::signal_store::{SignalId, SignalStore};
use std::collections::HashMap;

/// Values of signals that have been computed but not committed yet.
pub type SignalValues = HashMap<SignalId, f64>;

/// Everything needed to evaluate blocks at one step.
///
/// Inputs are read from the values computed earlier in the same step and fall back to
/// the committed history of the source signal.
pub struct StepFrame<'a> {
    pub ctx: StepContext,
    graph: &'a ModelGraph,
    model: &'a FlatModel,
    store: &'a SignalStore,
    states: &'a [BlockState],
    computed: &'a SignalValues,
}

impl<'a> StepFrame<'a> {
    pub(crate) fn new(
        ctx: StepContext,
        graph: &'a ModelGraph,
        model: &'a FlatModel,
        store: &'a SignalStore,
        states: &'a [BlockState],
        computed: &'a SignalValues,
    ) -> Self {
        Self {
            ctx,
            graph,
            model,
            store,
            states,
            computed,
        }
    }

    pub fn model(&self) -> &'a FlatModel {
        self.model
    }

    pub fn block(&self, leaf: usize) -> CbdResult<&'a dyn Block> {
        let flat = self.model.block(leaf);
        self.graph
            .block_at(&flat.address)
            .ok_or_else(|| CbdError::UnknownBlock(flat.path.clone()))
    }

    pub fn state(&self, leaf: usize) -> Option<&'a BlockState> {
        self.states.get(leaf)
    }

    /// Read `source` at the time of this step.
    ///
    /// `overrides` take precedence over anything else and hold the current iterate
    /// while an algebraic loop is solved.
    pub fn read(
        &self,
        source: &SignalId,
        policy: ReadPolicy,
        overrides: Option<&SignalValues>,
    ) -> CbdResult<f64> {
        if let Some(value) = overrides.and_then(|o| o.get(source)) {
            return Ok(*value);
        }
        if let Some(value) = self.computed.get(source) {
            return Ok(*value);
        }
        self.store.read(source, self.ctx.time, policy)
    }

    pub fn inputs(&self, leaf: usize, overrides: Option<&SignalValues>) -> InputValues {
        let flat = self.model.block(leaf);
        let mut inputs = InputValues::new(&flat.path);
        for input in &flat.inputs {
            let value = match &input.source {
                Some(source) => self.read(source, input.policy, overrides),
                None => Err(CbdError::UnconnectedInput {
                    block: flat.path.clone(),
                    port: input.port.clone(),
                }),
            };
            inputs.insert(&input.port, value);
        }
        inputs
    }

    /// Compute the outputs of a leaf block.
    ///
    /// Fails if the block does not produce a value for every declared output.
    pub fn compute(
        &self,
        leaf: usize,
        overrides: Option<&SignalValues>,
    ) -> CbdResult<Vec<(SignalId, f64)>> {
        let flat = self.model.block(leaf);
        let block = self.block(leaf)?;
        let inputs = self.inputs(leaf, overrides);
        let default = BlockState::default();
        let state = self.state(leaf).unwrap_or(&default);

        let outputs = block.compute(&self.ctx, &inputs, state)?;
        flat.outputs
            .iter()
            .map(|id| match outputs.get(&id.port) {
                Some(value) => Ok((id.clone(), value)),
                None => Err(CbdError::Block {
                    block: flat.path.clone(),
                    message: format!("no value produced for output {}", id.port),
                }),
            })
            .collect()
    }

    /// The state of a leaf block for the next step.
    pub fn update(&self, leaf: usize) -> CbdResult<BlockState> {
        let block = self.block(leaf)?;
        let inputs = self.inputs(leaf, None);
        let default = BlockState::default();
        let state = self.state(leaf).unwrap_or(&default);
        block.update(&self.ctx, &inputs, state)
    }

    /// The last committed value of a signal.
    pub fn last_value(&self, id: &SignalId) -> Option<f64> {
        self.store.last(id).map(|s| s.value)
    }
}
