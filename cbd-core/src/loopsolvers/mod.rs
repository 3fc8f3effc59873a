//! Solvers for algebraic loops.
//!
//! A loop is handed to the configured [`LoopSolver`] once per step in which it is due.
//! The solver first checks that it can handle the loop, then builds its input from the
//! current step and finally produces consistent values for every output of the loop.
//!
//! Two solvers are provided:
//! - [`FixedPointSolver`] repeatedly evaluates the loop until the outputs stabilise.
//! - [`LinearSolver`] builds the loop's linear equations and solves them exactly,
//!   caching the factorisation until the structure or a parameter changes.

mod fixed_point;
mod linear;

pub use fixed_point::FixedPointSolver;
pub use linear::{LinearSolver, LinearSystem};

use crate::errors::CbdResult;
use crate::frame::{SignalValues, StepFrame};
use crate::schedule::{LoopUnit, Phase};
use crate::signal_store::SignalId;
use std::fmt::Debug;

/// A due algebraic loop within a step.
pub struct LoopFrame<'a> {
    pub unit: &'a LoopUnit,
    pub phase: Phase,
    pub frame: &'a StepFrame<'a>,
    /// Structure and parameter version of the model.
    pub revision: (u64, u64),
}

impl<'a> LoopFrame<'a> {
    /// Paths of the loop members, for messages.
    pub fn describe(&self) -> String {
        self.unit
            .members
            .iter()
            .map(|idx| self.frame.model().block(*idx).path.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Every output signal of the loop members.
    pub fn signals(&self) -> Vec<SignalId> {
        let model = self.frame.model();
        self.unit
            .members
            .iter()
            .flat_map(|idx| model.block(*idx).outputs.iter().cloned())
            .collect()
    }

    /// The last committed value of every loop signal, or zero if there is none yet.
    pub fn last_values(&self) -> SignalValues {
        self.signals()
            .into_iter()
            .map(|id| {
                let value = self.frame.last_value(&id).unwrap_or(0.0);
                (id, value)
            })
            .collect()
    }

    /// Evaluate every member once, in order, starting from `current`.
    ///
    /// Members see the values produced by earlier members of the same sweep.
    pub fn sweep(&self, current: &SignalValues) -> CbdResult<SignalValues> {
        let mut values = current.clone();
        for &member in &self.unit.members {
            for (id, value) in self.frame.compute(member, Some(&values))? {
                values.insert(id, value);
            }
        }
        Ok(values)
    }
}

/// The data a solver works on, produced by [`LoopSolver::construct_input`].
#[derive(Debug, Clone)]
pub enum SolverInput {
    Iterative { initial_guess: SignalValues },
    Linear(LinearSystem),
}

pub trait LoopSolver: Debug + Send {
    fn name(&self) -> &str;

    /// Whether this solver is able to solve the loop.
    fn check_validity(&self, frame: &LoopFrame) -> bool;

    fn construct_input(&self, frame: &LoopFrame) -> CbdResult<SolverInput>;

    /// Produce a value for every output of the loop members.
    fn solve(&mut self, frame: &LoopFrame, input: SolverInput) -> CbdResult<SignalValues>;
}
