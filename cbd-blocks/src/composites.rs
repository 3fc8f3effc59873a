//! Composite blocks built from the standard blocks
//!
//! Each builder returns a [`Composite`] whose inner blocks are visible to the simulator
//! under the composite's path, e.g. `integrator.delayState`.

use crate::blocks::{Adder, Constant, Delay, DeltaT, Inverter, Negator, Product};
use cbd_core::errors::CbdResult;
use cbd_core::graph::{Composite, ModelGraph};

/// Smallest step size the derivator divides by.
const DERIVATOR_MIN_DELTA: f64 = 1e-6;

/// `OUT1 = IN1 + 1`
pub fn add_one(name: &str) -> CbdResult<Composite> {
    let mut graph = ModelGraph::with_ports(name, &["IN1"], &["OUT1"])?;
    graph.add_block("OneConstant", Constant::new(1.0))?;
    graph.add_block("PlusOne", Adder::new(2))?;
    graph.bind_input("IN1", "PlusOne", "IN1")?;
    graph.connect("OneConstant", "OUT1", "PlusOne", "IN2")?;
    graph.bind_output("PlusOne", "OUT1", "OUT1")?;
    Ok(Composite::new(graph))
}

/// Discrete integral of `IN1` using the backward Euler rule.
///
/// The output starts at `IC` and then follows
/// $$ y_n = y_{n-1} + \Delta t \cdot x_{n-1} $$
pub fn integrator(name: &str) -> CbdResult<Composite> {
    let mut graph = ModelGraph::with_ports(name, &["IN1", "IC"], &["OUT1"])?;
    graph.add_block("zero", Constant::new(0.0))?;
    graph.add_block("delta_t", DeltaT::default())?;
    graph.add_block("delayIn", Delay)?;
    graph.add_block("multDelta", Product::new(2))?;
    graph.add_block("delayState", Delay)?;
    graph.add_block("sumState", Adder::new(2))?;

    graph.connect("zero", "OUT1", "delayIn", "IC")?;
    graph.bind_input("IN1", "delayIn", "IN1")?;
    graph.connect("delayIn", "OUT1", "multDelta", "IN1")?;
    graph.connect("delta_t", "OUT1", "multDelta", "IN2")?;
    graph.connect("multDelta", "OUT1", "sumState", "IN1")?;
    graph.bind_input("IC", "delayState", "IC")?;
    graph.connect("delayState", "OUT1", "sumState", "IN2")?;
    graph.connect("sumState", "OUT1", "delayState", "IN1")?;
    graph.bind_output("sumState", "OUT1", "OUT1")?;
    Ok(Composite::new(graph))
}

/// Discrete derivative of `IN1` using the backward difference.
///
/// The output is `IC` at the first step and
/// $$ y_n = \frac{x_n - x_{n-1}}{\Delta t} $$
/// afterwards.
pub fn derivator(name: &str) -> CbdResult<Composite> {
    let mut graph = ModelGraph::with_ports(name, &["IN1", "IC"], &["OUT1"])?;
    graph.add_block("delta_t", DeltaT::new(DERIVATOR_MIN_DELTA))?;
    graph.add_block("multIc", Product::new(2))?;
    graph.add_block("neg1", Negator)?;
    graph.add_block("sum1", Adder::new(2))?;
    graph.add_block("delay", Delay)?;
    graph.add_block("neg2", Negator)?;
    graph.add_block("sum2", Adder::new(2))?;
    graph.add_block("mult", Product::new(2))?;
    graph.add_block("inv", Inverter::default())?;

    // At the first step the delay outputs IN1 - IC * dt, so that OUT1 = IC
    graph.bind_input("IC", "multIc", "IN1")?;
    graph.connect("delta_t", "OUT1", "multIc", "IN2")?;
    graph.connect("multIc", "OUT1", "neg1", "IN1")?;
    graph.connect("neg1", "OUT1", "sum1", "IN1")?;
    graph.bind_input("IN1", "sum1", "IN2")?;
    graph.connect("sum1", "OUT1", "delay", "IC")?;
    graph.bind_input("IN1", "delay", "IN1")?;
    graph.connect("delay", "OUT1", "neg2", "IN1")?;
    graph.connect("neg2", "OUT1", "sum2", "IN1")?;
    graph.bind_input("IN1", "sum2", "IN2")?;
    graph.connect("sum2", "OUT1", "mult", "IN1")?;
    graph.connect("delta_t", "OUT1", "inv", "IN1")?;
    graph.connect("inv", "OUT1", "mult", "IN2")?;
    graph.bind_output("mult", "OUT1", "OUT1")?;
    Ok(Composite::new(graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Sequence, Time};
    use cbd_core::simulator::SimulatorBuilder;
    use is_close::is_close;

    fn run(graph: ModelGraph, delta: f64, end_time: f64) -> cbd_core::simulator::Simulator {
        let mut sim = SimulatorBuilder::new(graph)
            .with_delta(delta)
            .with_end_time(end_time)
            .build()
            .unwrap();
        sim.run().unwrap();
        sim
    }

    fn assert_all_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{:?} != {:?}", actual, expected);
        for (a, e) in actual.iter().zip(expected) {
            assert!(is_close!(*a, *e, abs_tol = 1e-9), "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn add_one_ports() {
        let block = add_one("plus").unwrap();
        assert_eq!(block.graph().input_ports(), ["IN1"]);
        assert_eq!(block.graph().output_ports(), ["OUT1"]);
    }

    #[test]
    fn add_one_adds_one() {
        let mut graph = ModelGraph::new("root");
        graph
            .add_block("seq", Sequence::new(vec![1.0, 5.0]).unwrap())
            .unwrap();
        graph.add_block("plus", add_one("plus").unwrap()).unwrap();
        graph.connect("seq", "OUT1", "plus", "IN1").unwrap();

        let sim = run(graph, 1.0, 3.0);
        assert_eq!(sim.values("plus", "OUT1").unwrap(), vec![2.0, 6.0, 2.0, 6.0]);
    }

    #[test]
    fn integrating_a_constant() {
        let mut graph = ModelGraph::new("root");
        graph.add_block("one", Constant::new(1.0)).unwrap();
        graph.add_block("ic", Constant::new(0.0)).unwrap();
        graph.add_block("int", integrator("int").unwrap()).unwrap();
        graph.connect("one", "OUT1", "int", "IN1").unwrap();
        graph.connect("ic", "OUT1", "int", "IC").unwrap();

        let sim = run(graph, 0.1, 1.0);
        let expected: Vec<f64> = (0..=10).map(|n| 0.1 * n as f64).collect();
        assert_all_close(&sim.values("int", "OUT1").unwrap(), &expected);
    }

    #[test]
    fn integrator_starts_at_the_initial_condition() {
        let mut graph = ModelGraph::new("root");
        graph.add_block("t", Time).unwrap();
        graph.add_block("ic", Constant::new(3.0)).unwrap();
        graph.add_block("int", integrator("int").unwrap()).unwrap();
        graph.connect("t", "OUT1", "int", "IN1").unwrap();
        graph.connect("ic", "OUT1", "int", "IC").unwrap();

        // Left Riemann sum of t with dt = 1
        let sim = run(graph, 1.0, 4.0);
        assert_all_close(
            &sim.values("int", "OUT1").unwrap(),
            &[3.0, 3.0, 4.0, 6.0, 9.0],
        );
        assert!(sim.history("int.delayState", "OUT1").is_ok());
    }

    #[test]
    fn derivative_of_a_ramp() {
        let mut graph = ModelGraph::new("root");
        graph.add_block("t", Time).unwrap();
        graph.add_block("ic", Constant::new(7.0)).unwrap();
        graph.add_block("der", derivator("der").unwrap()).unwrap();
        graph.connect("t", "OUT1", "der", "IN1").unwrap();
        graph.connect("ic", "OUT1", "der", "IC").unwrap();

        let sim = run(graph, 0.5, 2.0);
        assert_all_close(
            &sim.values("der", "OUT1").unwrap(),
            &[7.0, 1.0, 1.0, 1.0, 1.0],
        );
    }

    #[test]
    fn derivative_of_an_integral() {
        let mut graph = ModelGraph::new("root");
        graph
            .add_block("seq", Sequence::new(vec![2.0, -1.0, 4.0]).unwrap())
            .unwrap();
        graph.add_block("zero", Constant::new(0.0)).unwrap();
        graph.add_block("int", integrator("int").unwrap()).unwrap();
        graph.add_block("der", derivator("der").unwrap()).unwrap();
        graph.connect("seq", "OUT1", "int", "IN1").unwrap();
        graph.connect("zero", "OUT1", "int", "IC").unwrap();
        graph.connect("int", "OUT1", "der", "IN1").unwrap();
        graph.connect("zero", "OUT1", "der", "IC").unwrap();

        // The derivative recovers the input, one step late
        let sim = run(graph, 0.25, 1.25);
        assert_all_close(
            &sim.values("der", "OUT1").unwrap(),
            &[0.0, 2.0, -1.0, 4.0, 2.0, -1.0],
        );
    }
}
