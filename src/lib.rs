//! Discrete-time causal block diagram simulation
//!
//! This crate bundles the simulation kernel ([`cbd_core`]) with the standard block
//! library ([`cbd_blocks`]).
//!
//! ```no_run
//! use cbd::prelude::*;
//!
//! let mut graph = ModelGraph::new("counter");
//! graph.add_block("zero", Constant::new(0.0)).unwrap();
//! graph.add_block("delay", Delay).unwrap();
//! graph.add_block("plus", add_one("plus").unwrap()).unwrap();
//! graph.connect("zero", "OUT1", "delay", "IC").unwrap();
//! graph.connect("delay", "OUT1", "plus", "IN1").unwrap();
//! graph.connect("plus", "OUT1", "delay", "IN1").unwrap();
//!
//! let mut sim = SimulatorBuilder::new(graph).with_end_time(9.0).build().unwrap();
//! sim.run().unwrap();
//! assert_eq!(sim.values("delay", "OUT1").unwrap().len(), 10);
//! ```

pub use cbd_blocks;
pub use cbd_core;

pub mod prelude {
    pub use cbd_blocks::blocks::*;
    pub use cbd_blocks::composites::{add_one, derivator, integrator};
    pub use cbd_blocks::standard_registry;
    pub use cbd_core::block::{Block, BlockState, InputValues, OutputValues, StepContext};
    pub use cbd_core::config::SimulationConfig;
    pub use cbd_core::errors::{CbdError, CbdResult};
    pub use cbd_core::events::{Direction, EventContext, StateEvent};
    pub use cbd_core::graph::{Composite, ModelGraph};
    pub use cbd_core::interpolate::ReadPolicy;
    pub use cbd_core::registry::{BlockRegistry, ModelDescription};
    pub use cbd_core::simulator::{
        FinishReason, LogTracer, Observer, SimulationState, Simulator, SimulatorBuilder,
    };
}
