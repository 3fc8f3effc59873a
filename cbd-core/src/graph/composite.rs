use crate::block::{Block, BlockState, InputValues, OutputValues, PortName, StepContext};
use crate::errors::{CbdError, CbdResult};
use serde::{Deserialize, Serialize};

use super::ModelGraph;

/// A block made of a nested [`ModelGraph`].
///
/// The boundary ports of the nested graph become the ports of the composite.
/// Composites are flattened into their leaf blocks before scheduling and are never
/// computed directly.
#[derive(Debug, Serialize, Deserialize)]
pub struct Composite {
    graph: ModelGraph,
}

impl Composite {
    pub fn new(graph: ModelGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &ModelGraph {
        &self.graph
    }
}

#[typetag::serde]
impl Block for Composite {
    fn input_ports(&self) -> Vec<PortName> {
        self.graph.input_ports().to_vec()
    }

    fn output_ports(&self) -> Vec<PortName> {
        self.graph.output_ports().to_vec()
    }

    fn compute(
        &self,
        _ctx: &StepContext,
        _inputs: &InputValues,
        _state: &BlockState,
    ) -> CbdResult<OutputValues> {
        Err(CbdError::Block {
            block: self.graph.name().to_string(),
            message: "composite blocks are flattened before execution".to_string(),
        })
    }

    fn subgraph(&self) -> Option<&ModelGraph> {
        Some(&self.graph)
    }

    fn subgraph_mut(&mut self) -> Option<&mut ModelGraph> {
        Some(&mut self.graph)
    }
}
