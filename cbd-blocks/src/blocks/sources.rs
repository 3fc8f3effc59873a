//! Blocks without inputs

use super::{ports, unknown_parameter};
use cbd_core::block::{Block, BlockState, InputValues, LinearForm, OutputValues, PortName, StepContext};
use cbd_core::errors::{CbdError, CbdResult};
use serde::{Deserialize, Serialize};

/// Outputs a fixed value.
///
/// The value can be changed between steps (or from an event callback) through the
/// `value` parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constant {
    value: f64,
}

impl Constant {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

#[typetag::serde]
impl Block for Constant {
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

    fn set_parameter(&mut self, name: &str, value: f64) -> CbdResult<()> {
        match name {
            "value" => {
                self.value = value;
                Ok(())
            }
            _ => Err(unknown_parameter(name)),
        }
    }
}

/// The simulated time (`OUT1`) and the time since the start of the run (`relative`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Time;

#[typetag::serde]
impl Block for Time {
    fn input_ports(&self) -> Vec<PortName> {
        vec![]
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1", "relative"])
    }

    fn compute(&self, ctx: &StepContext, _: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::new()
            .with("OUT1", ctx.time)
            .with("relative", ctx.relative_time()))
    }

    fn linear_form(&self, ctx: &StepContext, _: &BlockState) -> Option<LinearForm> {
        let mut form = LinearForm::single("OUT1", vec![], ctx.time);
        form.0
            .extend(LinearForm::single("relative", vec![], ctx.relative_time()).0);
        Some(form)
    }
}

/// Time elapsed since the previous step, bounded below by `min`.
///
/// This is the base step size, except for steps inserted at a located state event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaT {
    #[serde(default)]
    min: f64,
}

impl DeltaT {
    pub fn new(min: f64) -> Self {
        Self { min }
    }
}

#[typetag::serde]
impl Block for DeltaT {
    fn input_ports(&self) -> Vec<PortName> {
        vec![]
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, ctx: &StepContext, _: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(ctx.delta.max(self.min)))
    }

    fn linear_form(&self, ctx: &StepContext, _: &BlockState) -> Option<LinearForm> {
        Some(LinearForm::single("OUT1", vec![], ctx.delta.max(self.min)))
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        (name == "min").then_some(self.min)
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> CbdResult<()> {
        match name {
            "min" => {
                self.min = value;
                Ok(())
            }
            _ => Err(unknown_parameter(name)),
        }
    }
}

/// Cycles through a fixed list of values, one per step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    values: Vec<f64>,
}

impl Sequence {
    pub fn new(values: Vec<f64>) -> CbdResult<Self> {
        if values.is_empty() {
            return Err(CbdError::Config("a sequence needs at least one value".to_string()));
        }
        Ok(Self { values })
    }

    fn at(&self, iteration: usize) -> f64 {
        match self.values.len() {
            0 => f64::NAN,
            n => self.values[iteration % n],
        }
    }
}

#[typetag::serde]
impl Block for Sequence {
    fn input_ports(&self) -> Vec<PortName> {
        vec![]
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, ctx: &StepContext, _: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(self.at(ctx.iteration)))
    }

    fn linear_form(&self, ctx: &StepContext, _: &BlockState) -> Option<LinearForm> {
        Some(LinearForm::single("OUT1", vec![], self.at(ctx.iteration)))
    }
}
