use super::ports;
use cbd_core::block::{Block, BlockState, InputValues, LinearForm, OutputValues, PortName, StepContext};
use cbd_core::errors::CbdResult;
use serde::{Deserialize, Serialize};

/// Unit delay
///
/// Outputs `IC` at the first step and the value `IN1` had at the previous step
/// afterwards. From the second step on the output does not depend on any current
/// input, which is what allows feedback loops to be scheduled without an algebraic
/// loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delay;

impl Delay {
    fn remembered(ctx: &StepContext, state: &BlockState) -> Option<f64> {
        match state.get(0) {
            Some(previous) if ctx.iteration > 0 => Some(previous),
            _ => None,
        }
    }
}

#[typetag::serde]
impl Block for Delay {
    fn input_ports(&self) -> Vec<PortName> {
        ports(&["IN1", "IC"])
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn direct_inputs(&self, iteration: usize) -> Vec<PortName> {
        if iteration == 0 {
            ports(&["IC"])
        } else {
            vec![]
        }
    }

    fn compute(&self, ctx: &StepContext, inputs: &InputValues, state: &BlockState) -> CbdResult<OutputValues> {
        let value = match Self::remembered(ctx, state) {
            Some(previous) => previous,
            None => inputs.value("IC")?,
        };
        Ok(OutputValues::single(value))
    }

    fn update(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<BlockState> {
        Ok(BlockState::new(vec![inputs.value("IN1")?]))
    }

    fn linear_form(&self, ctx: &StepContext, state: &BlockState) -> Option<LinearForm> {
        Some(match Self::remembered(ctx, state) {
            Some(previous) => LinearForm::single("OUT1", vec![], previous),
            None => LinearForm::single("OUT1", vec![("IC", 1.0)], 0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_condition_then_previous_input() {
        let delay = Delay;
        let first = StepContext::new(0.0, 1.0, 0);
        let inputs = InputValues::from_values([("IN1", 7.0), ("IC", -1.0)]);

        let state = delay.initial_state();
        let out = delay.compute(&first, &inputs, &state).unwrap();
        assert_eq!(out.get("OUT1"), Some(-1.0));

        let state = delay.update(&first, &inputs, &state).unwrap();
        let second = StepContext::new(1.0, 1.0, 1);
        let later = InputValues::from_values([("IN1", 8.0)]);
        let out = delay.compute(&second, &later, &state).unwrap();
        assert_eq!(out.get("OUT1"), Some(7.0));
    }

    #[test]
    fn dependencies_change_after_the_first_step() {
        assert_eq!(Delay.direct_inputs(0), vec!["IC"]);
        assert!(Delay.direct_inputs(1).is_empty());
    }
}
