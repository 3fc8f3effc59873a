pub mod block;
pub mod config;
pub mod errors;
pub mod events;
pub mod frame;
pub mod graph;
pub mod interpolate;
pub mod loopsolvers;
pub mod rate;
pub mod realtime;
pub mod registry;
pub mod schedule;
pub mod signal_store;
pub mod simulator;

#[cfg(test)]
mod example_blocks;
