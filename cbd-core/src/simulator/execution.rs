use crate::block::{BlockState, StepContext};
use crate::errors::{CbdError, CbdResult};
use crate::frame::{SignalValues, StepFrame};
use crate::graph::ModelGraph;
use crate::loopsolvers::{LoopFrame, LoopSolver};
use crate::rate::RateController;
use crate::schedule::{ExecUnit, LoopUnit, Phase, Schedule};
use crate::signal_store::SignalStore;

/// The outcome of executing a step that has not been committed yet.
#[derive(Debug, Clone)]
pub(crate) struct PendingStep {
    pub ctx: StepContext,
    pub values: SignalValues,
    /// New state of every block that executed.
    pub states: Vec<(usize, BlockState)>,
}

/// Read-only view of the simulator used to execute a step.
pub(crate) struct Engine<'a> {
    pub graph: &'a ModelGraph,
    pub schedule: &'a Schedule,
    pub store: &'a SignalStore,
    pub states: &'a [BlockState],
    pub rates: &'a RateController,
}

impl Engine<'_> {
    /// Compute every unit due at `ctx.iteration`, then the new states of the executed blocks.
    ///
    /// Nothing is committed, so the same step can be evaluated at several times while a
    /// state event is located.
    pub fn execute(
        &self,
        ctx: StepContext,
        solver: &mut dyn LoopSolver,
    ) -> CbdResult<PendingStep> {
        let model = self.schedule.model();
        let step = ctx.iteration;
        let units = self
            .rates
            .due_units(self.schedule.units(step), model, step);

        let mut computed = SignalValues::new();
        for unit in &units {
            let values = {
                let frame =
                    StepFrame::new(ctx, self.graph, model, self.store, self.states, &computed);
                match unit {
                    ExecUnit::Block(idx) => frame.compute(*idx, None)?.into_iter().collect(),
                    ExecUnit::Loop(l) => self.solve_loop(l, &frame, solver)?,
                }
            };
            computed.extend(values);
        }

        let frame = StepFrame::new(ctx, self.graph, model, self.store, self.states, &computed);
        let mut states = vec![];
        for unit in &units {
            for &leaf in unit.members() {
                states.push((leaf, frame.update(leaf)?));
            }
        }

        Ok(PendingStep {
            ctx,
            values: computed,
            states,
        })
    }

    fn solve_loop(
        &self,
        unit: &LoopUnit,
        frame: &StepFrame,
        solver: &mut dyn LoopSolver,
    ) -> CbdResult<SignalValues> {
        let loop_frame = LoopFrame {
            unit,
            phase: Phase::of(frame.ctx.iteration),
            frame,
            revision: (
                self.graph.structure_version(),
                self.graph.parameter_version(),
            ),
        };
        if !solver.check_validity(&loop_frame) {
            return Err(CbdError::UnsolvableLoop {
                members: loop_frame.describe(),
                reason: format!("the {} solver cannot handle this loop", solver.name()),
            });
        }
        let input = solver.construct_input(&loop_frame)?;
        solver.solve(&loop_frame, input)
    }
}
