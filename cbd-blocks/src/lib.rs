//! Standard block library for `cbd-core`
//!
//! Arithmetic, comparison, logic, memory and source blocks, plus the integrator,
//! derivator and add-one composites. [`standard_registry`] makes all of them
//! available to model descriptions.

pub mod blocks;
pub mod composites;
mod registry;

pub use registry::standard_registry;
