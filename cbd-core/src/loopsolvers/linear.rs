use crate::errors::{CbdError, CbdResult};
use crate::frame::SignalValues;
use crate::schedule::Phase;
use crate::signal_store::SignalId;
use log::debug;
use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};
use std::collections::HashMap;

use super::{LoopFrame, LoopSolver, SolverInput};

/// The equations `matrix * x = rhs` of a linear loop, one unknown per loop signal.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    pub unknowns: Vec<SignalId>,
    pub matrix: DMatrix<f64>,
    pub rhs: DVector<f64>,
}

type CacheKey = (Phase, usize, u64, u64);

/// Solves loops whose members are all linear in their inputs.
///
/// The coefficient matrix only depends on the structure and the block parameters, so its
/// LU factorisation is computed once and reused every step until either changes.
#[derive(Debug, Default)]
pub struct LinearSolver {
    cache: HashMap<CacheKey, LU<f64, Dyn, Dyn>>,
}

impl LinearSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of factorisations currently cached.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl LoopSolver for LinearSolver {
    fn name(&self) -> &str {
        "linear"
    }

    fn check_validity(&self, frame: &LoopFrame) -> bool {
        frame.unit.members.iter().all(|&member| {
            match (frame.frame.block(member), frame.frame.state(member)) {
                (Ok(block), Some(state)) => block.linear_form(&frame.frame.ctx, state).is_some(),
                _ => false,
            }
        })
    }

    fn construct_input(&self, frame: &LoopFrame) -> CbdResult<SolverInput> {
        let unsolvable = |reason: String| CbdError::UnsolvableLoop {
            members: frame.describe(),
            reason,
        };
        let model = frame.frame.model();
        let unknowns = frame.signals();
        let position: HashMap<&SignalId, usize> =
            unknowns.iter().enumerate().map(|(i, id)| (id, i)).collect();

        let n = unknowns.len();
        let mut matrix = DMatrix::<f64>::identity(n, n);
        let mut rhs = DVector::<f64>::zeros(n);
        let mut covered = vec![false; n];

        for &member in &frame.unit.members {
            let flat = model.block(member);
            let block = frame.frame.block(member)?;
            let state = frame
                .frame
                .state(member)
                .ok_or_else(|| unsolvable(format!("{} has no state", flat.path)))?;
            let form = block
                .linear_form(&frame.frame.ctx, state)
                .ok_or_else(|| unsolvable(format!("{} is not linear", flat.path)))?;

            for equation in form.0 {
                let id = SignalId::new(&flat.path, &equation.output);
                let row = *position.get(&id).ok_or_else(|| {
                    unsolvable(format!("{} has no output {}", flat.path, equation.output))
                })?;
                covered[row] = true;
                rhs[row] += equation.constant;

                for (port, coefficient) in equation.terms {
                    let input = flat
                        .inputs
                        .iter()
                        .find(|i| i.port == port)
                        .ok_or_else(|| unsolvable(format!("{} has no input {}", flat.path, port)))?;
                    let source = input.source.as_ref().ok_or_else(|| CbdError::UnconnectedInput {
                        block: flat.path.clone(),
                        port: port.clone(),
                    })?;
                    match position.get(source) {
                        Some(&col) => matrix[(row, col)] -= coefficient,
                        None => rhs[row] += coefficient * frame.frame.read(source, input.policy, None)?,
                    }
                }
            }
        }

        if let Some(missing) = covered.iter().position(|c| !c) {
            return Err(unsolvable(format!(
                "no linear equation for {}",
                unknowns[missing]
            )));
        }

        Ok(SolverInput::Linear(LinearSystem {
            unknowns,
            matrix,
            rhs,
        }))
    }

    fn solve(&mut self, frame: &LoopFrame, input: SolverInput) -> CbdResult<SignalValues> {
        let unsolvable = |reason: &str| CbdError::UnsolvableLoop {
            members: frame.describe(),
            reason: reason.to_string(),
        };
        let system = match input {
            SolverInput::Linear(system) => system,
            SolverInput::Iterative { .. } => return Err(unsolvable("expected a linear system")),
        };

        let key = (frame.phase, frame.unit.id, frame.revision.0, frame.revision.1);
        if !self.cache.contains_key(&key) {
            let lu = system.matrix.clone().lu();
            if !lu.is_invertible() {
                return Err(unsolvable("the loop equations are singular"));
            }
            debug!("Factorised loop [{}] ({:?})", frame.describe(), frame.phase);
            // Factorisations of an older revision are stale
            self.cache
                .retain(|k, _| (k.2, k.3) == (frame.revision.0, frame.revision.1));
            self.cache.insert(key, lu);
        }

        let solution = self
            .cache
            .get(&key)
            .and_then(|lu| lu.solve(&system.rhs))
            .ok_or_else(|| unsolvable("the loop equations are singular"))?;

        Ok(system
            .unknowns
            .into_iter()
            .zip(solution.iter())
            .map(|(id, value)| (id, *value))
            .collect())
    }
}
