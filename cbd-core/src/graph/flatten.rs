//! Flattening a hierarchy of composites into leaf blocks.

use crate::block::PortName;
use crate::errors::{CbdError, CbdResult};
use crate::interpolate::ReadPolicy;
use crate::signal_store::SignalId;
use petgraph::graph::NodeIndex;
use std::collections::{HashMap, HashSet};

use super::ModelGraph;

/// An input port of a leaf block and the leaf signal that feeds it.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatInput {
    pub port: PortName,
    pub source: Option<SignalId>,
    /// Index of the leaf block producing `source`.
    pub source_block: Option<usize>,
    pub policy: ReadPolicy,
}

/// A leaf block of the flattened model.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatBlock {
    /// Dotted path from the root graph, e.g. `integrator.delayState`.
    pub path: String,
    /// Node indices leading from the root graph to the block.
    pub address: Vec<NodeIndex>,
    pub inputs: Vec<FlatInput>,
    pub outputs: Vec<SignalId>,
}

/// The leaf blocks of a model in declaration order, with every input resolved
/// through the composite boundaries to the leaf output that produces it.
#[derive(Debug, Clone, Default)]
pub struct FlatModel {
    blocks: Vec<FlatBlock>,
    by_path: HashMap<String, usize>,
    /// Composite output ports and the leaf signal behind them.
    aliases: HashMap<SignalId, SignalId>,
}

struct Scope<'a> {
    graph: &'a ModelGraph,
    prefix: String,
    parent: Option<(&'a Scope<'a>, NodeIndex)>,
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn resolve_output(
    graph: &ModelGraph,
    prefix: &str,
    node: NodeIndex,
    port: &str,
) -> CbdResult<SignalId> {
    let path = join(prefix, graph.node_name(node));
    match graph.block_by_index(node).subgraph() {
        Some(sub) => {
            let binding =
                sub.output_binding(port)
                    .ok_or_else(|| CbdError::UnboundCompositeOutput {
                        block: path.clone(),
                        port: port.to_string(),
                    })?;
            resolve_output(sub, &path, binding.block, &binding.block_port)
        }
        None => Ok(SignalId::new(&path, port)),
    }
}

fn resolve_input(
    scope: &Scope<'_>,
    node: NodeIndex,
    port: &str,
) -> CbdResult<Option<(SignalId, ReadPolicy)>> {
    if let Some((source, link)) = scope.graph.incoming(node, port) {
        let id = resolve_output(scope.graph, &scope.prefix, source, &link.source_port)?;
        return Ok(Some((id, link.policy)));
    }
    if let (Some(binding), Some((parent, composite))) =
        (scope.graph.input_binding(node, port), scope.parent)
    {
        return resolve_input(parent, composite, &binding.port);
    }
    Ok(None)
}

impl FlatModel {
    /// Flatten `graph`, validating the structure on the way.
    ///
    /// Fails when a name is duplicated within a scope, a required input is not
    /// connected, or a composite port is not bound to an inner block.
    pub fn flatten(graph: &ModelGraph) -> CbdResult<Self> {
        let mut flat = FlatModel::default();
        let root = Scope {
            graph,
            prefix: String::new(),
            parent: None,
        };
        flat.collect(&root, &[])?;

        let by_path = &flat.by_path;
        for block in flat.blocks.iter_mut() {
            for input in block.inputs.iter_mut() {
                if let Some(source) = &input.source {
                    let idx = by_path.get(&source.block).ok_or_else(|| {
                        CbdError::InvalidConnection(format!(
                            "{}.{} is fed by {}, which is not a leaf block",
                            block.path, input.port, source
                        ))
                    })?;
                    input.source_block = Some(*idx);
                }
            }
        }
        Ok(flat)
    }

    fn collect(&mut self, scope: &Scope<'_>, address: &[NodeIndex]) -> CbdResult<()> {
        let mut seen = HashSet::new();
        for node in scope.graph.node_indices() {
            let name = scope.graph.node_name(node);
            if !seen.insert(name) {
                return Err(CbdError::DuplicateName {
                    name: name.to_string(),
                    scope: scope.graph.scope_name(),
                });
            }
            let path = join(&scope.prefix, name);
            let mut node_address = address.to_vec();
            node_address.push(node);

            let block = scope.graph.block_by_index(node);
            if let Some(sub) = block.subgraph() {
                if let Some(port) = sub.input_ports().iter().find(|p| !sub.is_input_bound(p)) {
                    return Err(CbdError::UnboundCompositeInput {
                        block: path,
                        port: port.clone(),
                    });
                }
                for port in sub.output_ports() {
                    let target = resolve_output(scope.graph, &scope.prefix, node, port)?;
                    self.aliases.insert(SignalId::new(&path, port), target);
                }
                let child = Scope {
                    graph: sub,
                    prefix: path,
                    parent: Some((scope, node)),
                };
                self.collect(&child, &node_address)?;
                continue;
            }

            let required: HashSet<PortName> = block.required_inputs().into_iter().collect();
            let mut inputs = vec![];
            for port in block.input_ports() {
                let (source, policy) = match resolve_input(scope, node, &port)? {
                    Some((source, policy)) => (Some(source), policy),
                    None if required.contains(&port) => {
                        return Err(CbdError::UnconnectedInput { block: path, port })
                    }
                    None => (None, ReadPolicy::default()),
                };
                inputs.push(FlatInput {
                    port,
                    source,
                    source_block: None,
                    policy,
                });
            }
            let outputs = block
                .output_ports()
                .iter()
                .map(|p| SignalId::new(&path, p))
                .collect();

            self.by_path.insert(path.clone(), self.blocks.len());
            self.blocks.push(FlatBlock {
                path,
                address: node_address,
                inputs,
                outputs,
            });
        }
        Ok(())
    }

    pub fn blocks(&self) -> &[FlatBlock] {
        &self.blocks
    }

    pub fn block(&self, idx: usize) -> &FlatBlock {
        &self.blocks[idx]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn index_of(&self, path: &str) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    /// True if `path` names a leaf block or a composite containing leaf blocks.
    pub fn contains_path(&self, path: &str) -> bool {
        if self.by_path.contains_key(path) {
            return true;
        }
        let prefix = format!("{}.", path);
        self.by_path.keys().any(|p| p.starts_with(&prefix))
    }

    /// Every output signal of the model, in declaration order.
    pub fn signals(&self) -> impl Iterator<Item = &SignalId> {
        self.blocks.iter().flat_map(|b| b.outputs.iter())
    }

    /// Resolve `block.port` to the leaf signal that carries it.
    ///
    /// `block` may name a composite, in which case the output port is followed to the
    /// inner block that produces it.
    pub fn resolve_signal(&self, block: &str, port: &str) -> CbdResult<SignalId> {
        let id = SignalId::new(block, port);
        if let Some(&idx) = self.by_path.get(block) {
            if self.blocks[idx].outputs.contains(&id) {
                return Ok(id);
            }
        } else if let Some(target) = self.aliases.get(&id) {
            return Ok(target.clone());
        } else if !self.contains_path(block) {
            return Err(CbdError::UnknownBlock(block.to_string()));
        }
        Err(CbdError::UnknownPort {
            block: block.to_string(),
            port: port.to_string(),
            direction: "output".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::example_blocks::{TestConstant, TestDelay, TestGain, TestSum};
    use crate::graph::Composite;

    /// A composite that doubles its input and adds a delayed copy of the result.
    fn doubler() -> Composite {
        let mut inner = ModelGraph::with_ports("doubler", &["IN1", "IC"], &["OUT1", "OLD"]).unwrap();
        inner.add_block("gain", TestGain::new(2.0)).unwrap();
        inner.add_block("delay", TestDelay).unwrap();
        inner.bind_input("IN1", "gain", "IN1").unwrap();
        inner.bind_input("IC", "delay", "IC").unwrap();
        inner.connect("gain", "OUT1", "delay", "IN1").unwrap();
        inner.bind_output("gain", "OUT1", "OUT1").unwrap();
        inner.bind_output("delay", "OUT1", "OLD").unwrap();
        Composite::new(inner)
    }

    fn model() -> ModelGraph {
        let mut graph = ModelGraph::new("root");
        graph.add_block("c", TestConstant::new(1.5)).unwrap();
        graph.add_block("d", doubler()).unwrap();
        graph.add_block("s", TestSum).unwrap();
        graph.connect("c", "OUT1", "d", "IN1").unwrap();
        graph.connect("c", "OUT1", "d", "IC").unwrap();
        graph.connect("d", "OUT1", "s", "IN1").unwrap();
        graph.connect("d", "OLD", "s", "IN2").unwrap();
        graph
    }

    #[test]
    fn leaves_in_declaration_order() {
        let flat = FlatModel::flatten(&model()).unwrap();
        let paths: Vec<&str> = flat.blocks().iter().map(|b| b.path.as_str()).collect();
        assert_eq!(paths, vec!["c", "d.gain", "d.delay", "s"]);
    }

    #[test]
    fn inputs_resolve_through_boundaries() {
        let flat = FlatModel::flatten(&model()).unwrap();

        let gain = flat.block(flat.index_of("d.gain").unwrap());
        assert_eq!(gain.inputs[0].source, Some(SignalId::new("c", "OUT1")));
        assert_eq!(gain.inputs[0].source_block, Some(0));

        let sum = flat.block(flat.index_of("s").unwrap());
        assert_eq!(sum.inputs[0].source, Some(SignalId::new("d.gain", "OUT1")));
        assert_eq!(sum.inputs[1].source, Some(SignalId::new("d.delay", "OUT1")));
    }

    #[test]
    fn composite_aliases() {
        let flat = FlatModel::flatten(&model()).unwrap();
        assert_eq!(
            flat.resolve_signal("d", "OLD").unwrap(),
            SignalId::new("d.delay", "OUT1")
        );
        assert_eq!(
            flat.resolve_signal("s", "OUT1").unwrap(),
            SignalId::new("s", "OUT1")
        );
        assert!(matches!(
            flat.resolve_signal("d", "NOPE"),
            Err(CbdError::UnknownPort { .. })
        ));
        assert!(matches!(
            flat.resolve_signal("x", "OUT1"),
            Err(CbdError::UnknownBlock(_))
        ));
    }

    #[test]
    fn unconnected_inputs() {
        let mut graph = model();
        graph.disconnect("d", "IC").unwrap();
        let err = FlatModel::flatten(&graph).unwrap_err();
        assert_eq!(
            err,
            CbdError::UnconnectedInput {
                block: "d.delay".to_string(),
                port: "IC".to_string()
            }
        );
    }

    #[test]
    fn unbound_composite_output() {
        let mut inner = ModelGraph::with_ports("inner", &[], &["OUT1"]).unwrap();
        inner.add_block("c", TestConstant::new(1.0)).unwrap();
        let mut graph = ModelGraph::new("root");
        graph.add_block("sub", Composite::new(inner)).unwrap();

        let err = FlatModel::flatten(&graph).unwrap_err();
        assert!(err.is_structural());
        assert!(matches!(err, CbdError::UnboundCompositeOutput { .. }));
    }

    #[test]
    fn unbound_composite_input() {
        // IC is declared but feeds nothing, so the parent's connection would be lost
        let mut inner = ModelGraph::with_ports("inner", &["IN1", "IC"], &["OUT1"]).unwrap();
        inner.add_block("gain", TestGain::new(2.0)).unwrap();
        inner.bind_input("IN1", "gain", "IN1").unwrap();
        inner.bind_output("gain", "OUT1", "OUT1").unwrap();

        let mut graph = ModelGraph::new("root");
        graph.add_block("c", TestConstant::new(1.0)).unwrap();
        graph.add_block("sub", Composite::new(inner)).unwrap();
        graph.connect("c", "OUT1", "sub", "IN1").unwrap();
        graph.connect("c", "OUT1", "sub", "IC").unwrap();

        let err = FlatModel::flatten(&graph).unwrap_err();
        assert!(err.is_structural());
        assert_eq!(
            err,
            CbdError::UnboundCompositeInput {
                block: "sub".to_string(),
                port: "IC".to_string()
            }
        );
    }
}
