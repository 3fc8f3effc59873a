//! Execution order of the blocks within a step.
//!
//! The dependency graph between leaf blocks only contains the inputs a block needs to
//! compute its outputs at a given iteration. Strongly connected components of that graph
//! are algebraic loops and become atomic [`LoopUnit`]s. The remaining blocks and the loops
//! are ordered topologically over the condensation graph, using the declaration order to
//! break ties so that the same structure always yields the same schedule.
//!
//! Blocks may depend on different inputs at the first iteration (a delay reads its
//! initial condition), so a schedule holds an initial and a steady phase.

use crate::errors::{CbdError, CbdResult};
use crate::graph::{FlatModel, ModelGraph};
use log::debug;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet};

/// The two phases of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// The first iteration of a run.
    Initial,
    /// Every other iteration.
    Steady,
}

impl Phase {
    pub fn of(iteration: usize) -> Self {
        if iteration == 0 {
            Phase::Initial
        } else {
            Phase::Steady
        }
    }

    /// An iteration that is representative of the phase.
    fn iteration(self) -> usize {
        match self {
            Phase::Initial => 0,
            Phase::Steady => 1,
        }
    }
}

/// A set of blocks that depend on each other within a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopUnit {
    /// Index of the first member, unique within a phase.
    pub id: usize,
    /// Leaf block indices in declaration order.
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecUnit {
    Block(usize),
    Loop(LoopUnit),
}

impl ExecUnit {
    /// Leaf block indices executed by this unit.
    pub fn members(&self) -> &[usize] {
        match self {
            ExecUnit::Block(idx) => std::slice::from_ref(idx),
            ExecUnit::Loop(unit) => &unit.members,
        }
    }
}

/// The execution order of a model, derived from its structure.
#[derive(Debug, Clone)]
pub struct Schedule {
    model: FlatModel,
    initial: Vec<ExecUnit>,
    steady: Vec<ExecUnit>,
    structure_version: u64,
}

impl Schedule {
    pub fn model(&self) -> &FlatModel {
        &self.model
    }

    pub fn units(&self, iteration: usize) -> &[ExecUnit] {
        self.phase_units(Phase::of(iteration))
    }

    pub fn phase_units(&self, phase: Phase) -> &[ExecUnit] {
        match phase {
            Phase::Initial => &self.initial,
            Phase::Steady => &self.steady,
        }
    }

    pub fn loops(&self, iteration: usize) -> impl Iterator<Item = &LoopUnit> {
        self.units(iteration).iter().filter_map(|u| match u {
            ExecUnit::Loop(unit) => Some(unit),
            ExecUnit::Block(_) => None,
        })
    }

    /// The structure version of the graph this schedule was computed from.
    pub fn structure_version(&self) -> u64 {
        self.structure_version
    }

    /// Block paths in execution order. Loop members are grouped in brackets.
    pub fn order_names(&self, iteration: usize) -> Vec<String> {
        let path = |idx: &usize| self.model.block(*idx).path.clone();
        self.units(iteration)
            .iter()
            .map(|unit| match unit {
                ExecUnit::Block(idx) => path(idx),
                ExecUnit::Loop(l) => {
                    format!("[{}]", l.members.iter().map(path).collect::<Vec<_>>().join(", "))
                }
            })
            .collect()
    }
}

/// Compute the schedule of `graph`.
///
/// Fails with a structural error when a required input is unconnected, a name is
/// duplicated within a scope, or a composite output is unbound. No block is executed.
pub fn compute_schedule(graph: &ModelGraph) -> CbdResult<Schedule> {
    let model = FlatModel::flatten(graph)?;
    let initial = order(graph, &model, Phase::Initial)?;
    let steady = order(graph, &model, Phase::Steady)?;
    debug!(
        "Scheduled {} blocks ({} initial units, {} steady units)",
        model.len(),
        initial.len(),
        steady.len()
    );
    Ok(Schedule {
        model,
        initial,
        steady,
        structure_version: graph.structure_version(),
    })
}

fn order(graph: &ModelGraph, model: &FlatModel, phase: Phase) -> CbdResult<Vec<ExecUnit>> {
    let iteration = phase.iteration();
    let mut deps: DiGraph<usize, ()> = DiGraph::with_capacity(model.len(), model.len());
    let nodes: Vec<NodeIndex> = (0..model.len()).map(|i| deps.add_node(i)).collect();

    for (idx, flat) in model.blocks().iter().enumerate() {
        let block = graph
            .block_at(&flat.address)
            .ok_or_else(|| CbdError::UnknownBlock(flat.path.clone()))?;
        let direct: HashSet<String> = block.direct_inputs(iteration).into_iter().collect();
        for input in flat.inputs.iter().filter(|i| direct.contains(&i.port)) {
            if let Some(source) = input.source_block {
                deps.update_edge(nodes[source], nodes[idx], ());
            }
        }
    }

    // Group the strongly connected components into units keyed by their first member
    let mut unit_of = vec![0usize; model.len()];
    let mut units: Vec<ExecUnit> = vec![];
    for mut component in tarjan_scc(&deps) {
        component.sort();
        let members: Vec<usize> = component.iter().map(|n| deps[*n]).collect();
        let is_loop = members.len() > 1 || deps.contains_edge(component[0], component[0]);
        for member in &members {
            unit_of[*member] = units.len();
        }
        units.push(if is_loop {
            ExecUnit::Loop(LoopUnit {
                id: members[0],
                members,
            })
        } else {
            ExecUnit::Block(members[0])
        });
    }

    // Kahn's algorithm over the condensation, always releasing the earliest declared unit
    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); units.len()];
    let mut in_degree = vec![0usize; units.len()];
    for edge in deps.raw_edges() {
        let from = unit_of[deps[edge.source()]];
        let to = unit_of[deps[edge.target()]];
        if from != to && successors[from].insert(to) {
            in_degree[to] += 1;
        }
    }

    let key = |unit: usize| units[unit].members()[0];
    let mut ready: BinaryHeap<Reverse<(usize, usize)>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(unit, _)| Reverse((key(unit), unit)))
        .collect();

    let mut ordered = Vec::with_capacity(units.len());
    while let Some(Reverse((_, unit))) = ready.pop() {
        ordered.push(unit);
        for &next in &successors[unit] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse((key(next), next)));
            }
        }
    }

    let mut slots: Vec<Option<ExecUnit>> = units.into_iter().map(Some).collect();
    Ok(ordered
        .into_iter()
        .filter_map(|unit| slots[unit].take())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::example_blocks::{TestConstant, TestDelay, TestGain, TestSum};
    use crate::graph::Composite;

    fn position(order: &[String], name: &str) -> usize {
        order
            .iter()
            .position(|n| n == name)
            .unwrap_or_else(|| panic!("{} not in {:?}", name, order))
    }

    /// Blocks are declared in reverse of their data flow.
    fn reversed_chain() -> ModelGraph {
        let mut graph = ModelGraph::new("root");
        graph.add_block("sink", TestGain::new(1.0)).unwrap();
        graph.add_block("middle", TestSum).unwrap();
        graph.add_block("b", TestConstant::new(2.0)).unwrap();
        graph.add_block("a", TestConstant::new(1.0)).unwrap();
        graph.connect("middle", "OUT1", "sink", "IN1").unwrap();
        graph.connect("a", "OUT1", "middle", "IN1").unwrap();
        graph.connect("b", "OUT1", "middle", "IN2").unwrap();
        graph
    }

    #[test]
    fn topological_order() {
        let graph = reversed_chain();
        let schedule = compute_schedule(&graph).unwrap();
        let order = schedule.order_names(1);

        // Every connection goes forward in the schedule
        for (from, to) in [("a", "middle"), ("b", "middle"), ("middle", "sink")] {
            assert!(position(&order, from) < position(&order, to), "{:?}", order);
        }
        // Unordered blocks keep their declaration order
        assert_eq!(order, vec!["b", "a", "middle", "sink"]);
        assert_eq!(schedule.loops(1).count(), 0);
    }

    #[test]
    fn schedule_is_deterministic() {
        let graph = reversed_chain();
        let first = compute_schedule(&graph).unwrap();
        let second = compute_schedule(&graph).unwrap();
        assert_eq!(first.order_names(0), second.order_names(0));
        assert_eq!(first.order_names(1), second.order_names(1));
        assert_eq!(first.units(1), second.units(1));
    }

    #[test]
    fn algebraic_loop() {
        let mut graph = ModelGraph::new("root");
        graph.add_block("c", TestConstant::new(1.0)).unwrap();
        graph.add_block("sum", TestSum).unwrap();
        graph.add_block("gain", TestGain::new(0.5)).unwrap();
        graph.add_block("out", TestGain::new(1.0)).unwrap();
        graph.connect("c", "OUT1", "sum", "IN1").unwrap();
        graph.connect("gain", "OUT1", "sum", "IN2").unwrap();
        graph.connect("sum", "OUT1", "gain", "IN1").unwrap();
        graph.connect("sum", "OUT1", "out", "IN1").unwrap();

        let schedule = compute_schedule(&graph).unwrap();
        assert_eq!(schedule.order_names(1), vec!["c", "[sum, gain]", "out"]);
        let loops: Vec<&LoopUnit> = schedule.loops(1).collect();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].members, vec![1, 2]);
        assert_eq!(loops[0].id, 1);
    }

    #[test]
    fn self_loop() {
        let mut graph = ModelGraph::new("root");
        graph.add_block("g", TestGain::new(0.5)).unwrap();
        graph.connect("g", "OUT1", "g", "IN1").unwrap();

        let schedule = compute_schedule(&graph).unwrap();
        assert_eq!(schedule.order_names(0), vec!["[g]"]);
    }

    #[test]
    fn delays_break_cycles_after_the_first_iteration() {
        // counter: delay -> sum -> delay.IN1, with sum = delay + one
        let mut graph = ModelGraph::new("root");
        graph.add_block("delay", TestDelay).unwrap();
        graph.add_block("sum", TestSum).unwrap();
        graph.add_block("one", TestConstant::new(1.0)).unwrap();
        graph.add_block("zero", TestConstant::new(0.0)).unwrap();
        graph.connect("zero", "OUT1", "delay", "IC").unwrap();
        graph.connect("delay", "OUT1", "sum", "IN1").unwrap();
        graph.connect("one", "OUT1", "sum", "IN2").unwrap();
        graph.connect("sum", "OUT1", "delay", "IN1").unwrap();

        let schedule = compute_schedule(&graph).unwrap();
        assert_eq!(schedule.order_names(0), vec!["one", "zero", "delay", "sum"]);
        assert_eq!(schedule.order_names(5), vec!["delay", "one", "sum", "zero"]);
        assert_eq!(schedule.loops(0).count(), 0);
    }

    #[test]
    fn composites_are_scheduled_by_leaf() {
        let mut inner = ModelGraph::with_ports("inner", &["IN1"], &["OUT1"]).unwrap();
        inner.add_block("gain", TestGain::new(2.0)).unwrap();
        inner.bind_input("IN1", "gain", "IN1").unwrap();
        inner.bind_output("gain", "OUT1", "OUT1").unwrap();

        let mut graph = ModelGraph::new("root");
        graph.add_block("sink", TestGain::new(1.0)).unwrap();
        graph.add_block("sub", Composite::new(inner)).unwrap();
        graph.add_block("src", TestConstant::new(1.0)).unwrap();
        graph.connect("src", "OUT1", "sub", "IN1").unwrap();
        graph.connect("sub", "OUT1", "sink", "IN1").unwrap();

        let schedule = compute_schedule(&graph).unwrap();
        assert_eq!(schedule.order_names(1), vec!["src", "sub.gain", "sink"]);
    }

    #[test]
    fn structural_errors() {
        let mut graph = ModelGraph::new("root");
        graph.add_block("g", TestGain::new(1.0)).unwrap();
        let err = compute_schedule(&graph).unwrap_err();
        assert!(err.is_structural());
        assert_eq!(
            err,
            CbdError::UnconnectedInput {
                block: "g".to_string(),
                port: "IN1".to_string()
            }
        );
    }
}
