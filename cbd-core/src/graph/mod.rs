//! The static structure of a block diagram.
//!
//! A [`ModelGraph`] holds named blocks as the nodes of a directed graph and the
//! connections between output and input ports as its edges. Node indices follow the
//! order in which blocks were declared, which is used as the tie-break when scheduling.
//!
//! A graph may declare boundary ports so that it can be wrapped in a [`Composite`] and
//! used as a block of another graph. Before a model is scheduled the hierarchy is
//! flattened into a [`FlatModel`] of leaf blocks addressed by dotted paths.

mod composite;
mod flatten;

pub use composite::Composite;
pub use flatten::{FlatBlock, FlatInput, FlatModel};

use crate::block::{Block, PortName};
use crate::errors::{CbdError, CbdResult};
use crate::interpolate::ReadPolicy;
use petgraph::dot::Dot;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::{Direction, Graph};
use serde::{Deserialize, Serialize};

/// A named block within a graph.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockNode {
    pub name: String,
    pub block: Box<dyn Block>,
}

/// A connection from an output port of the source node to an input port of the target node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source_port: PortName,
    pub target_port: PortName,
    /// How the target reads the source when it was not computed in the same step.
    #[serde(default)]
    pub policy: ReadPolicy,
}

/// Binds a boundary port of a graph to a port of one of its blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortBinding {
    pub port: PortName,
    pub block: NodeIndex,
    pub block_port: PortName,
}

pub type BlockGraph = Graph<BlockNode, Link>;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ModelGraph {
    name: String,
    graph: BlockGraph,
    inputs: Vec<PortName>,
    outputs: Vec<PortName>,
    input_bindings: Vec<PortBinding>,
    output_bindings: Vec<PortBinding>,
    #[serde(skip)]
    structure_version: u64,
    #[serde(skip)]
    parameter_version: u64,
}

impl ModelGraph {
    /// Create an empty graph without boundary ports.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Create an empty graph with boundary ports, for use inside a [`Composite`].
    pub fn with_ports(name: &str, inputs: &[&str], outputs: &[&str]) -> CbdResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for port in inputs.iter().chain(outputs.iter()) {
            if !seen.insert(*port) {
                return Err(CbdError::DuplicateName {
                    name: port.to_string(),
                    scope: format!("ports of {}", name),
                });
            }
        }
        Ok(Self {
            name: name.to_string(),
            inputs: inputs.iter().map(|p| p.to_string()).collect(),
            outputs: outputs.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_ports(&self) -> &[PortName] {
        &self.inputs
    }

    pub fn output_ports(&self) -> &[PortName] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Add a block to the graph.
    ///
    /// Block names must be unique within the graph and may not contain a `.`, which
    /// separates the levels of a block path.
    pub fn add_block(&mut self, name: &str, block: impl Block + 'static) -> CbdResult<NodeIndex> {
        self.add_boxed_block(name, Box::new(block))
    }

    pub fn add_boxed_block(&mut self, name: &str, block: Box<dyn Block>) -> CbdResult<NodeIndex> {
        if name.is_empty() || name.contains('.') {
            return Err(CbdError::Error(format!(
                "invalid block name {:?}: names must be non-empty and may not contain '.'",
                name
            )));
        }
        if self.find(name).is_some() {
            return Err(CbdError::DuplicateName {
                name: name.to_string(),
                scope: self.scope_name(),
            });
        }
        let idx = self.graph.add_node(BlockNode {
            name: name.to_string(),
            block,
        });
        self.structure_version += 1;
        Ok(idx)
    }

    /// Connect `from.from_port` to `to.to_port` using sample-and-hold reads.
    pub fn connect(&mut self, from: &str, from_port: &str, to: &str, to_port: &str) -> CbdResult<()> {
        self.connect_with_policy(from, from_port, to, to_port, ReadPolicy::default())
    }

    pub fn connect_with_policy(
        &mut self,
        from: &str,
        from_port: &str,
        to: &str,
        to_port: &str,
        policy: ReadPolicy,
    ) -> CbdResult<()> {
        let source = self.expect_block(from)?;
        let target = self.expect_block(to)?;
        self.check_port(source, from_port, false)?;
        self.check_port(target, to_port, true)?;
        self.check_unfed(target, to_port)?;

        self.graph.add_edge(
            source,
            target,
            Link {
                source_port: from_port.to_string(),
                target_port: to_port.to_string(),
                policy,
            },
        );
        self.structure_version += 1;
        Ok(())
    }

    /// Feed the boundary input `port` into `to.to_port`.
    ///
    /// A boundary input may feed several inner ports.
    pub fn bind_input(&mut self, port: &str, to: &str, to_port: &str) -> CbdResult<()> {
        if !self.inputs.iter().any(|p| p == port) {
            return Err(self.unknown_boundary_port(port, "input"));
        }
        let target = self.expect_block(to)?;
        self.check_port(target, to_port, true)?;
        self.check_unfed(target, to_port)?;

        self.input_bindings.push(PortBinding {
            port: port.to_string(),
            block: target,
            block_port: to_port.to_string(),
        });
        self.structure_version += 1;
        Ok(())
    }

    /// Expose `from.from_port` as the boundary output `port`.
    pub fn bind_output(&mut self, from: &str, from_port: &str, port: &str) -> CbdResult<()> {
        if !self.outputs.iter().any(|p| p == port) {
            return Err(self.unknown_boundary_port(port, "output"));
        }
        if self.output_binding(port).is_some() {
            return Err(CbdError::InputAlreadyConnected {
                block: self.name.clone(),
                port: port.to_string(),
            });
        }
        let source = self.expect_block(from)?;
        self.check_port(source, from_port, false)?;

        self.output_bindings.push(PortBinding {
            port: port.to_string(),
            block: source,
            block_port: from_port.to_string(),
        });
        self.structure_version += 1;
        Ok(())
    }

    /// Remove whatever feeds `to.to_port`.
    pub fn disconnect(&mut self, to: &str, to_port: &str) -> CbdResult<()> {
        let target = self.expect_block(to)?;
        let edge = self
            .graph
            .edges_directed(target, Direction::Incoming)
            .find(|e| e.weight().target_port == to_port)
            .map(|e| e.id());

        if let Some(edge) = edge {
            self.graph.remove_edge(edge);
        } else if let Some(pos) = self
            .input_bindings
            .iter()
            .position(|b| b.block == target && b.block_port == to_port)
        {
            self.input_bindings.remove(pos);
        } else {
            return Err(CbdError::UnconnectedInput {
                block: to.to_string(),
                port: to_port.to_string(),
            });
        }
        self.structure_version += 1;
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&idx| self.graph[idx].name == name)
    }

    /// Node indices in declaration order.
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn node_name(&self, idx: NodeIndex) -> &str {
        &self.graph[idx].name
    }

    pub fn block_names(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].name.as_str())
            .collect()
    }

    pub(crate) fn block_by_index(&self, idx: NodeIndex) -> &dyn Block {
        self.graph[idx].block.as_ref()
    }

    pub fn block(&self, name: &str) -> Option<&dyn Block> {
        self.find(name).map(|idx| self.block_by_index(idx))
    }

    pub fn block_mut(&mut self, name: &str) -> Option<&mut (dyn Block + 'static)> {
        let idx = self.find(name)?;
        Some(self.graph[idx].block.as_mut())
    }

    /// Look up a block by its address of node indices, starting at this graph.
    pub fn block_at(&self, address: &[NodeIndex]) -> Option<&dyn Block> {
        let (first, rest) = address.split_first()?;
        let block = self.graph.node_weight(*first)?.block.as_ref();
        if rest.is_empty() {
            Some(block)
        } else {
            block.subgraph()?.block_at(rest)
        }
    }

    /// Look up a block by its dotted path, e.g. `integrator.delayState`.
    pub fn resolve_path(&self, path: &str) -> Option<&dyn Block> {
        match path.split_once('.') {
            None => self.block(path),
            Some((head, rest)) => self.block(head)?.subgraph()?.resolve_path(rest),
        }
    }

    fn resolve_path_mut(&mut self, path: &str) -> Option<&mut (dyn Block + 'static)> {
        match path.split_once('.') {
            None => self.block_mut(path),
            Some((head, rest)) => self.block_mut(head)?.subgraph_mut()?.resolve_path_mut(rest),
        }
    }

    pub fn parameter(&self, path: &str, name: &str) -> CbdResult<f64> {
        let block = self
            .resolve_path(path)
            .ok_or_else(|| CbdError::UnknownBlock(path.to_string()))?;
        block.parameter(name).ok_or_else(|| CbdError::UnknownParameter {
            block: path.to_string(),
            name: name.to_string(),
        })
    }

    /// Change a parameter of the block at `path`.
    ///
    /// Connections are untouched so the schedule stays valid, but cached closed-form
    /// loop solutions are invalidated through [`ModelGraph::parameter_version`].
    pub fn set_parameter(&mut self, path: &str, name: &str, value: f64) -> CbdResult<()> {
        let block = self
            .resolve_path_mut(path)
            .ok_or_else(|| CbdError::UnknownBlock(path.to_string()))?;
        if block.parameter(name).is_none() {
            return Err(CbdError::UnknownParameter {
                block: path.to_string(),
                name: name.to_string(),
            });
        }
        block
            .set_parameter(name, value)
            .map_err(|err| match err {
                CbdError::ReadOnlyParameter { name, .. } => CbdError::ReadOnlyParameter {
                    block: path.to_string(),
                    name,
                },
                CbdError::UnknownParameter { name, .. } => CbdError::UnknownParameter {
                    block: path.to_string(),
                    name,
                },
                other => other,
            })?;
        self.parameter_version += 1;
        Ok(())
    }

    /// Increases whenever blocks or connections change, including in nested graphs.
    pub fn structure_version(&self) -> u64 {
        self.structure_version
            + self
                .graph
                .node_weights()
                .filter_map(|n| n.block.subgraph())
                .map(|g| g.structure_version())
                .sum::<u64>()
    }

    /// Increases whenever a parameter changes, including in nested graphs.
    pub fn parameter_version(&self) -> u64 {
        self.parameter_version
            + self
                .graph
                .node_weights()
                .filter_map(|n| n.block.subgraph())
                .map(|g| g.parameter_version())
                .sum::<u64>()
    }

    /// The node and link feeding `node.port`, if any.
    pub(crate) fn incoming(&self, node: NodeIndex, port: &str) -> Option<(NodeIndex, &Link)> {
        self.graph
            .edges_directed(node, Direction::Incoming)
            .find(|e| e.weight().target_port == port)
            .map(|e| (e.source(), e.weight()))
    }

    pub(crate) fn input_binding(&self, node: NodeIndex, port: &str) -> Option<&PortBinding> {
        self.input_bindings
            .iter()
            .find(|b| b.block == node && b.block_port == port)
    }

    /// True if the boundary input `port` feeds at least one inner block.
    pub fn is_input_bound(&self, port: &str) -> bool {
        self.input_bindings.iter().any(|b| b.port == port)
    }

    pub fn output_binding(&self, port: &str) -> Option<&PortBinding> {
        self.output_bindings.iter().find(|b| b.port == port)
    }

    /// Render the graph in graphviz dot format.
    pub fn as_dot(&self) -> String {
        let labelled = self.graph.map(
            |_, node| node.name.clone(),
            |_, link| format!("{} -> {}", link.source_port, link.target_port),
        );
        format!("{}", Dot::new(&labelled))
    }

    fn scope_name(&self) -> String {
        if self.name.is_empty() {
            "<root>".to_string()
        } else {
            self.name.clone()
        }
    }

    fn expect_block(&self, name: &str) -> CbdResult<NodeIndex> {
        self.find(name)
            .ok_or_else(|| CbdError::UnknownBlock(name.to_string()))
    }

    fn check_port(&self, node: NodeIndex, port: &str, input: bool) -> CbdResult<()> {
        let block = self.block_by_index(node);
        let ports = if input {
            block.input_ports()
        } else {
            block.output_ports()
        };
        if ports.iter().any(|p| p == port) {
            Ok(())
        } else {
            Err(CbdError::UnknownPort {
                block: self.graph[node].name.clone(),
                port: port.to_string(),
                direction: if input { "input" } else { "output" }.to_string(),
            })
        }
    }

    // Each input port has at most one feed: an edge or a boundary binding.
    fn check_unfed(&self, node: NodeIndex, port: &str) -> CbdResult<()> {
        if self.incoming(node, port).is_some() || self.input_binding(node, port).is_some() {
            return Err(CbdError::InputAlreadyConnected {
                block: self.graph[node].name.clone(),
                port: port.to_string(),
            });
        }
        Ok(())
    }

    fn unknown_boundary_port(&self, port: &str, direction: &str) -> CbdError {
        CbdError::UnknownPort {
            block: self.scope_name(),
            port: port.to_string(),
            direction: direction.to_string(),
        }
    }
}
