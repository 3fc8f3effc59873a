use super::{counter, times, Recorder};
use crate::errors::CbdError;
use crate::example_blocks::TestTime;
use crate::graph::ModelGraph;
use crate::signal_store::{SignalId, SignalStore};
use crate::simulator::{
    FinishReason, Observer, RunControl, SimulationState, SimulatorBuilder,
};

fn clock() -> ModelGraph {
    let mut graph = ModelGraph::new("clock");
    graph.add_block("time", TestTime).unwrap();
    graph
}

fn sum_reached(store: &SignalStore, limit: f64) -> bool {
    store
        .last(&SignalId::new("sum", "OUT1"))
        .map_or(false, |s| s.value >= limit)
}

/// Requests a pause or cancellation after a number of steps.
struct Interrupt {
    control: RunControl,
    after: usize,
    cancel: bool,
    seen: usize,
}

impl Observer for Interrupt {
    fn poststep(&mut self, _time: f64, _store: &SignalStore) {
        self.seen += 1;
        if self.seen == self.after {
            if self.cancel {
                self.control.cancel();
            } else {
                self.control.pause();
            }
        }
    }
}

#[test]
fn end_time_on_the_grid() {
    let mut sim = SimulatorBuilder::new(clock())
        .with_delta(0.25)
        .with_end_time(1.0)
        .build()
        .unwrap();
    let state = sim.run().unwrap();

    assert_eq!(state, SimulationState::Finished(FinishReason::EndTime));
    assert_eq!(
        sim.values("time", "OUT1").unwrap(),
        vec![0.0, 0.25, 0.5, 0.75, 1.0]
    );
    assert_eq!(sim.time(), 1.0);
}

#[test]
fn end_time_between_steps_stops_just_past_it() {
    let mut sim = SimulatorBuilder::new(clock())
        .with_delta(0.3)
        .with_end_time(1.0)
        .build()
        .unwrap();
    sim.run().unwrap();

    let history = times(sim.store(), "time", "OUT1");
    assert_eq!(history.len(), 5);
    assert!(sim.time() >= 1.0 && sim.time() < 1.3);
}

#[test]
fn predicate_stops_at_the_first_true_step() {
    let mut sim = SimulatorBuilder::new(counter())
        .with_termination_condition(|store, _| sum_reached(store, 5.0))
        .build()
        .unwrap();
    let state = sim.run().unwrap();

    assert_eq!(state, SimulationState::Finished(FinishReason::Condition));
    assert_eq!(sim.time(), 4.0);
    // History up to and including the final step is queryable
    assert_eq!(
        sim.values("delay", "OUT1").unwrap(),
        vec![0.0, 1.0, 2.0, 3.0, 4.0]
    );
    assert_eq!(sim.values("sum", "OUT1").unwrap().last(), Some(&5.0));
}

#[test]
fn predicate_wins_over_end_time() {
    let mut sim = SimulatorBuilder::new(counter())
        .with_end_time(4.0)
        .with_termination_condition(|store, _| sum_reached(store, 5.0))
        .build()
        .unwrap();
    assert_eq!(
        sim.run().unwrap(),
        SimulationState::Finished(FinishReason::Condition)
    );

    let mut sim = SimulatorBuilder::new(counter())
        .with_end_time(2.0)
        .with_termination_condition(|_, time| time >= 3.0)
        .build()
        .unwrap();
    assert_eq!(
        sim.run().unwrap(),
        SimulationState::Finished(FinishReason::EndTime)
    );
}

#[test]
fn cancel_at_the_next_step_boundary() {
    let mut sim = SimulatorBuilder::new(counter()).build().unwrap();
    let recorder = Recorder::default();
    sim.add_observer(Box::new(Interrupt {
        control: sim.control(),
        after: 5,
        cancel: true,
        seen: 0,
    }));
    sim.add_observer(Box::new(recorder.clone()));

    let state = sim.run().unwrap();

    assert_eq!(state, SimulationState::Finished(FinishReason::Cancelled));
    assert_eq!(sim.history("delay", "OUT1").unwrap().len(), 5);
    assert_eq!(recorder.calls().last().unwrap(), "finished 4 Cancelled");
    assert!(matches!(sim.advance(), Err(CbdError::InvalidState(_))));
}

#[test]
fn pause_and_resume() {
    let mut sim = SimulatorBuilder::new(counter())
        .with_end_time(6.0)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    sim.add_observer(Box::new(Interrupt {
        control: sim.control(),
        after: 3,
        cancel: false,
        seen: 0,
    }));
    sim.add_observer(Box::new(recorder.clone()));

    assert_eq!(sim.run().unwrap(), SimulationState::Paused);
    assert_eq!(sim.history("delay", "OUT1").unwrap().len(), 3);

    assert_eq!(
        sim.run().unwrap(),
        SimulationState::Finished(FinishReason::EndTime)
    );
    assert_eq!(
        sim.values("delay", "OUT1").unwrap(),
        vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
    );
    let started = recorder
        .calls()
        .iter()
        .filter(|c| c.starts_with("started"))
        .count();
    assert_eq!(started, 1);
}

#[test]
fn control_requests_from_another_thread() {
    let mut sim = SimulatorBuilder::new(counter()).build().unwrap();
    let control = sim.control();
    std::thread::spawn(move || control.cancel()).join().unwrap();

    assert!(sim.control().cancel_requested());
    assert_eq!(
        sim.run().unwrap(),
        SimulationState::Finished(FinishReason::Cancelled)
    );
    assert!(sim.history("delay", "OUT1").unwrap().is_empty());
}
