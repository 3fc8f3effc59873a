//! Comparison and boolean blocks
//!
//! Signals are interpreted as booleans: zero (and NaN) is false, anything else is true.
//! Outputs are always `0.0` or `1.0`.

use super::{boolean, ports, truthy};
use cbd_core::block::{
    numbered_ports, Block, BlockState, InputValues, OutputValues, PortName, StepContext,
};
use cbd_core::errors::CbdResult;
use serde::{Deserialize, Serialize};

fn compare(inputs: &InputValues, op: impl Fn(f64, f64) -> bool) -> CbdResult<OutputValues> {
    let (a, b) = (inputs.value("IN1")?, inputs.value("IN2")?);
    Ok(OutputValues::single(boolean(op(a, b))))
}

/// `IN1 < IN2`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LessThan;

#[typetag::serde]
impl Block for LessThan {
    fn input_ports(&self) -> Vec<PortName> {
        ports(&["IN1", "IN2"])
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        compare(inputs, |a, b| a < b)
    }
}

/// `IN1 <= IN2`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LessThanOrEquals;

#[typetag::serde]
impl Block for LessThanOrEquals {
    fn input_ports(&self) -> Vec<PortName> {
        ports(&["IN1", "IN2"])
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        compare(inputs, |a, b| a <= b)
    }
}

/// `IN1 == IN2`, compared exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Equals;

#[typetag::serde]
impl Block for Equals {
    fn input_ports(&self) -> Vec<PortName> {
        ports(&["IN1", "IN2"])
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        compare(inputs, |a, b| a == b)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Not;

#[typetag::serde]
impl Block for Not {
    fn input_ports(&self) -> Vec<PortName> {
        ports(&["IN1"])
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(boolean(!truthy(inputs.value("IN1")?))))
    }
}

/// True if any of `IN1..INn` is true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Or {
    num_inputs: usize,
}

impl Default for Or {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Or {
    pub fn new(num_inputs: usize) -> Self {
        Self { num_inputs }
    }
}

#[typetag::serde]
impl Block for Or {
    fn input_ports(&self) -> Vec<PortName> {
        numbered_ports("IN", self.num_inputs)
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        let values = inputs.values(&self.input_ports())?;
        Ok(OutputValues::single(boolean(
            values.into_iter().any(truthy),
        )))
    }
}

/// True if all of `IN1..INn` are true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct And {
    num_inputs: usize,
}

impl Default for And {
    fn default() -> Self {
        Self::new(2)
    }
}

impl And {
    pub fn new(num_inputs: usize) -> Self {
        Self { num_inputs }
    }
}

#[typetag::serde]
impl Block for And {
    fn input_ports(&self) -> Vec<PortName> {
        numbered_ports("IN", self.num_inputs)
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        let values = inputs.values(&self.input_ports())?;
        Ok(OutputValues::single(boolean(
            values.into_iter().all(truthy),
        )))
    }
}
