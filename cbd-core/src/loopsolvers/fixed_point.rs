use crate::errors::{CbdError, CbdResult};
use crate::frame::SignalValues;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{LoopFrame, LoopSolver, SolverInput};

/// Solves a loop by repeated Gauss-Seidel sweeps over its members.
///
/// The iteration starts from the last committed values of the loop signals and stops
/// once the largest relative change of a sweep is below `tolerance`.
/// Exceeding `max_iterations` is a [`CbdError::Convergence`] carrying the last residual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedPointSolver {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for FixedPointSolver {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: 1000,
        }
    }
}

impl FixedPointSolver {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }
}

fn residual(previous: &SignalValues, next: &SignalValues) -> f64 {
    let mut largest: f64 = 0.0;
    for (id, value) in next {
        let change = match previous.get(id) {
            Some(prev) => (value - prev).abs() / value.abs().max(1.0),
            None => f64::INFINITY,
        };
        if !change.is_finite() {
            return f64::INFINITY;
        }
        largest = largest.max(change);
    }
    largest
}

impl LoopSolver for FixedPointSolver {
    fn name(&self) -> &str {
        "fixed_point"
    }

    fn check_validity(&self, _frame: &LoopFrame) -> bool {
        true
    }

    fn construct_input(&self, frame: &LoopFrame) -> CbdResult<SolverInput> {
        Ok(SolverInput::Iterative {
            initial_guess: frame.last_values(),
        })
    }

    fn solve(&mut self, frame: &LoopFrame, input: SolverInput) -> CbdResult<SignalValues> {
        let mut current = match input {
            SolverInput::Iterative { initial_guess } => initial_guess,
            SolverInput::Linear(_) => {
                return Err(CbdError::UnsolvableLoop {
                    members: frame.describe(),
                    reason: "fixed point iteration requires an initial guess".to_string(),
                })
            }
        };

        let mut last_residual = f64::INFINITY;
        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;
            let next = frame.sweep(&current)?;
            last_residual = residual(&current, &next);
            current = next;

            if last_residual <= self.tolerance {
                debug!(
                    "Loop [{}] converged after {} iterations at t={}",
                    frame.describe(),
                    iterations,
                    frame.frame.ctx.time
                );
                return Ok(current);
            }
            if !last_residual.is_finite() {
                break;
            }
        }

        Err(CbdError::Convergence {
            members: frame.describe(),
            iterations,
            residual: last_residual,
        })
    }
}
