//! Minimal blocks used by the unit tests of this crate.
//!
//! The full block library lives in `cbd-blocks`.

use crate::block::{
    Block, BlockState, InputValues, LinearForm, OutputValues, PortName, StepContext,
};
use crate::errors::{CbdError, CbdResult};
use serde::{Deserialize, Serialize};

fn ports(names: &[&str]) -> Vec<PortName> {
    names.iter().map(|n| n.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TestConstant {
    pub value: f64,
}

impl TestConstant {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

#[typetag::serde]
impl Block for TestConstant {
    fn input_ports(&self) -> Vec<PortName> {
        vec![]
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, _: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(self.value))
    }

    fn linear_form(&self, _: &StepContext, _: &BlockState) -> Option<LinearForm> {
        Some(LinearForm::single("OUT1", vec![], self.value))
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        (name == "value").then_some(self.value)
    }

    fn set_parameter(&mut self, _name: &str, value: f64) -> CbdResult<()> {
        self.value = value;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TestGain {
    pub gain: f64,
}

impl TestGain {
    pub fn new(gain: f64) -> Self {
        Self { gain }
    }
}

#[typetag::serde]
impl Block for TestGain {
    fn input_ports(&self) -> Vec<PortName> {
        ports(&["IN1"])
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(self.gain * inputs.value("IN1")?))
    }

    fn linear_form(&self, _: &StepContext, _: &BlockState) -> Option<LinearForm> {
        Some(LinearForm::single("OUT1", vec![("IN1", self.gain)], 0.0))
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        (name == "gain").then_some(self.gain)
    }

    fn set_parameter(&mut self, _name: &str, value: f64) -> CbdResult<()> {
        self.gain = value;
        Ok(())
    }
}

/// `IN1 + IN2`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TestSum;

#[typetag::serde]
impl Block for TestSum {
    fn input_ports(&self) -> Vec<PortName> {
        ports(&["IN1", "IN2"])
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(
            inputs.value("IN1")? + inputs.value("IN2")?,
        ))
    }

    fn linear_form(&self, _: &StepContext, _: &BlockState) -> Option<LinearForm> {
        Some(LinearForm::single(
            "OUT1",
            vec![("IN1", 1.0), ("IN2", 1.0)],
            0.0,
        ))
    }
}

/// `IN1 * IN2`, which is not linear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TestProduct;

#[typetag::serde]
impl Block for TestProduct {
    fn input_ports(&self) -> Vec<PortName> {
        ports(&["IN1", "IN2"])
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(
            inputs.value("IN1")? * inputs.value("IN2")?,
        ))
    }
}

/// Outputs `IC` at the first iteration and the previous `IN1` afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TestDelay;

#[typetag::serde]
impl Block for TestDelay {
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
        let value = match state.get(0) {
            Some(previous) if ctx.iteration > 0 => previous,
            _ => inputs.value("IC")?,
        };
        Ok(OutputValues::single(value))
    }

    fn update(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<BlockState> {
        Ok(BlockState::new(vec![inputs.value("IN1")?]))
    }

    fn linear_form(&self, ctx: &StepContext, state: &BlockState) -> Option<LinearForm> {
        match state.get(0) {
            Some(previous) if ctx.iteration > 0 => {
                Some(LinearForm::single("OUT1", vec![], previous))
            }
            _ => Some(LinearForm::single("OUT1", vec![("IC", 1.0)], 0.0)),
        }
    }
}

/// Outputs the simulated time. Its `offset` parameter is fixed at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TestTime;

#[typetag::serde]
impl Block for TestTime {
    fn input_ports(&self) -> Vec<PortName> {
        vec![]
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, ctx: &StepContext, _: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(ctx.time))
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        (name == "offset").then_some(0.0)
    }
}

/// Fails whenever it is computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TestFailing;

#[typetag::serde]
impl Block for TestFailing {
    fn input_ports(&self) -> Vec<PortName> {
        vec![]
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, _: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Err(CbdError::Block {
            block: "failing".to_string(),
            message: "always fails".to_string(),
        })
    }
}
