//! Scenario tests for the simulator.
//!
//! These run small models end to end and check the committed history.

use crate::example_blocks::{TestConstant, TestDelay, TestGain, TestSum, TestTime};
use crate::graph::ModelGraph;
use crate::signal_store::SignalStore;
use crate::simulator::{FinishReason, Observer};
use std::sync::{Arc, Mutex};

#[cfg(test)]
mod termination;

/// `delay -> sum(+1) -> delay.IN1`, starting from zero.
fn counter() -> ModelGraph {
    let mut graph = ModelGraph::new("counter");
    graph.add_block("zero", TestConstant::new(0.0)).unwrap();
    graph.add_block("one", TestConstant::new(1.0)).unwrap();
    graph.add_block("delay", TestDelay).unwrap();
    graph.add_block("sum", TestSum).unwrap();
    graph.connect("zero", "OUT1", "delay", "IC").unwrap();
    graph.connect("delay", "OUT1", "sum", "IN1").unwrap();
    graph.connect("one", "OUT1", "sum", "IN2").unwrap();
    graph.connect("sum", "OUT1", "delay", "IN1").unwrap();
    graph
}

/// `level = 4.5 - t`
fn falling_ramp() -> ModelGraph {
    let mut graph = ModelGraph::new("ramp");
    graph.add_block("time", TestTime).unwrap();
    graph.add_block("neg", TestGain::new(-1.0)).unwrap();
    graph.add_block("offset", TestConstant::new(4.5)).unwrap();
    graph.add_block("level", TestSum).unwrap();
    graph.connect("time", "OUT1", "neg", "IN1").unwrap();
    graph.connect("offset", "OUT1", "level", "IN1").unwrap();
    graph.connect("neg", "OUT1", "level", "IN2").unwrap();
    graph
}

/// `sum = c + k * sum`
fn feedback(k: f64, c: f64) -> ModelGraph {
    let mut graph = ModelGraph::new("feedback");
    graph.add_block("c", TestConstant::new(c)).unwrap();
    graph.add_block("sum", TestSum).unwrap();
    graph.add_block("gain", TestGain::new(k)).unwrap();
    graph.connect("c", "OUT1", "sum", "IN1").unwrap();
    graph.connect("gain", "OUT1", "sum", "IN2").unwrap();
    graph.connect("sum", "OUT1", "gain", "IN1").unwrap();
    graph
}

fn times(store: &SignalStore, block: &str, port: &str) -> Vec<f64> {
    store
        .history(&crate::signal_store::SignalId::new(block, port))
        .iter()
        .map(|s| s.time)
        .collect()
}

/// Records lifecycle notifications as strings.
#[derive(Debug, Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Observer for Recorder {
    fn started(&mut self, time: f64) {
        self.push(format!("started {}", time));
    }

    fn prestep(&mut self, time: f64) {
        self.push(format!("prestep {}", time));
    }

    fn poststep(&mut self, time: f64, _store: &SignalStore) {
        self.push(format!("poststep {}", time));
    }

    fn finished(&mut self, time: f64, reason: &FinishReason) {
        self.push(format!("finished {} {:?}", time, reason));
    }
}
