//! Arithmetic blocks
//!
//! Every block in this module is stateless: its outputs only depend on the inputs of
//! the current step and its parameters.

use super::{ports, unknown_parameter};
use cbd_core::block::{
    numbered_ports, Block, BlockState, InputValues, LinearEquation, LinearForm, OutputValues,
    PortName, StepContext,
};
use cbd_core::errors::{CbdError, CbdResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inputs smaller than this are treated as zero by [`Inverter`] and [`Root`].
const DEFAULT_TOLERANCE: f64 = 1e-30;

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn unary_ports() -> Vec<PortName> {
    ports(&["IN1"])
}

/// Multiplies `IN1` by a constant factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gain {
    gain: f64,
}

impl Gain {
    pub fn new(gain: f64) -> Self {
        Self { gain }
    }
}

#[typetag::serde]
impl Block for Gain {
    fn input_ports(&self) -> Vec<PortName> {
        unary_ports()
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(inputs.value("IN1")? * self.gain))
    }

    fn linear_form(&self, _: &StepContext, _: &BlockState) -> Option<LinearForm> {
        Some(LinearForm::single("OUT1", vec![("IN1", self.gain)], 0.0))
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        (name == "gain").then_some(self.gain)
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> CbdResult<()> {
        match name {
            "gain" => {
                self.gain = value;
                Ok(())
            }
            _ => Err(unknown_parameter(name)),
        }
    }
}

/// `-IN1`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Negator;

#[typetag::serde]
impl Block for Negator {
    fn input_ports(&self) -> Vec<PortName> {
        unary_ports()
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(-inputs.value("IN1")?))
    }

    fn linear_form(&self, _: &StepContext, _: &BlockState) -> Option<LinearForm> {
        Some(LinearForm::single("OUT1", vec![("IN1", -1.0)], 0.0))
    }
}

/// `1 / IN1`
///
/// Fails the step when `|IN1|` is below `tolerance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inverter {
    #[serde(default = "default_tolerance")]
    tolerance: f64,
}

impl Default for Inverter {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl Inverter {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

#[typetag::serde]
impl Block for Inverter {
    fn input_ports(&self) -> Vec<PortName> {
        unary_ports()
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        let value = inputs.value("IN1")?;
        if value.abs() < self.tolerance {
            return Err(inputs.error(format!(
                "division by zero: input {} is smaller than {}",
                value, self.tolerance
            )));
        }
        Ok(OutputValues::single(1.0 / value))
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        (name == "tolerance").then_some(self.tolerance)
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> CbdResult<()> {
        match name {
            "tolerance" => {
                self.tolerance = value;
                Ok(())
            }
            _ => Err(unknown_parameter(name)),
        }
    }
}

/// Sum of `IN1..INn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adder {
    num_inputs: usize,
}

impl Default for Adder {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Adder {
    pub fn new(num_inputs: usize) -> Self {
        Self { num_inputs }
    }
}

#[typetag::serde]
impl Block for Adder {
    fn input_ports(&self) -> Vec<PortName> {
        numbered_ports("IN", self.num_inputs)
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        let values = inputs.values(&self.input_ports())?;
        Ok(OutputValues::single(values.iter().sum()))
    }

    fn linear_form(&self, _: &StepContext, _: &BlockState) -> Option<LinearForm> {
        Some(LinearForm(vec![LinearEquation {
            output: "OUT1".to_string(),
            terms: self.input_ports().into_iter().map(|p| (p, 1.0)).collect(),
            constant: 0.0,
        }]))
    }
}

/// Product of `IN1..INn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    num_inputs: usize,
}

impl Default for Product {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Product {
    pub fn new(num_inputs: usize) -> Self {
        Self { num_inputs }
    }
}

#[typetag::serde]
impl Block for Product {
    fn input_ports(&self) -> Vec<PortName> {
        numbered_ports("IN", self.num_inputs)
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        let values = inputs.values(&self.input_ports())?;
        Ok(OutputValues::single(values.iter().product()))
    }
}

/// Remainder of `IN1 / IN2`, with the sign of `IN1`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Modulo;

#[typetag::serde]
impl Block for Modulo {
    fn input_ports(&self) -> Vec<PortName> {
        ports(&["IN1", "IN2"])
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(inputs.value("IN1")? % inputs.value("IN2")?))
    }
}

/// The `IN2`-th root of `IN1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    #[serde(default = "default_tolerance")]
    tolerance: f64,
}

impl Default for Root {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl Root {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

#[typetag::serde]
impl Block for Root {
    fn input_ports(&self) -> Vec<PortName> {
        ports(&["IN1", "IN2"])
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        let index = inputs.value("IN2")?;
        if index.abs() < self.tolerance {
            return Err(inputs.error(format!(
                "division by zero: root index {} is smaller than {}",
                index, self.tolerance
            )));
        }
        Ok(OutputValues::single(inputs.value("IN1")?.powf(1.0 / index)))
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        (name == "tolerance").then_some(self.tolerance)
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> CbdResult<()> {
        match name {
            "tolerance" => {
                self.tolerance = value;
                Ok(())
            }
            _ => Err(unknown_parameter(name)),
        }
    }
}

/// `IN1` raised to the power `IN2`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Power;

#[typetag::serde]
impl Block for Power {
    fn input_ports(&self) -> Vec<PortName> {
        ports(&["IN1", "IN2"])
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(inputs.value("IN1")?.powf(inputs.value("IN2")?)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Abs;

#[typetag::serde]
impl Block for Abs {
    fn input_ports(&self) -> Vec<PortName> {
        unary_ports()
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(inputs.value("IN1")?.abs()))
    }
}

/// Integer part of `IN1`, rounding towards zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Int;

#[typetag::serde]
impl Block for Int {
    fn input_ports(&self) -> Vec<PortName> {
        unary_ports()
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(inputs.value("IN1")?.trunc()))
    }
}

/// Bounds used by [`Clamp`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClampParameters {
    pub min: f64,
    pub max: f64,
    /// Read the bounds from `IN2` (min) and `IN3` (max) instead of the constants above.
    #[serde(default)]
    pub from_inputs: bool,
}

impl Default for ClampParameters {
    fn default() -> Self {
        Self {
            min: -1.0,
            max: 1.0,
            from_inputs: false,
        }
    }
}

/// Limits `IN1` to `[min, max]`.
///
/// Also known as a saturation or limiter block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Clamp {
    parameters: ClampParameters,
}

impl Clamp {
    pub fn from_parameters(parameters: ClampParameters) -> Self {
        Self { parameters }
    }
}

#[typetag::serde]
impl Block for Clamp {
    fn input_ports(&self) -> Vec<PortName> {
        if self.parameters.from_inputs {
            ports(&["IN1", "IN2", "IN3"])
        } else {
            unary_ports()
        }
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        let (min, max) = if self.parameters.from_inputs {
            (inputs.value("IN2")?, inputs.value("IN3")?)
        } else {
            (self.parameters.min, self.parameters.max)
        };
        let x = inputs.value("IN1")?;
        // Written out rather than f64::clamp, which panics when min > max
        Ok(OutputValues::single(x.max(min).min(max)))
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        match name {
            "min" => Some(self.parameters.min),
            "max" => Some(self.parameters.max),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> CbdResult<()> {
        match name {
            "min" => self.parameters.min = value,
            "max" => self.parameters.max = value,
            _ => return Err(unknown_parameter(name)),
        }
        Ok(())
    }
}

/// Single-argument functions available to [`Generic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryFunction {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log2,
    Log10,
    Sqrt,
    Cbrt,
    Floor,
    Ceil,
    Round,
    Trunc,
    Signum,
}

impl UnaryFunction {
    const ALL: [UnaryFunction; 20] = [
        UnaryFunction::Sin,
        UnaryFunction::Cos,
        UnaryFunction::Tan,
        UnaryFunction::Asin,
        UnaryFunction::Acos,
        UnaryFunction::Atan,
        UnaryFunction::Sinh,
        UnaryFunction::Cosh,
        UnaryFunction::Tanh,
        UnaryFunction::Exp,
        UnaryFunction::Ln,
        UnaryFunction::Log2,
        UnaryFunction::Log10,
        UnaryFunction::Sqrt,
        UnaryFunction::Cbrt,
        UnaryFunction::Floor,
        UnaryFunction::Ceil,
        UnaryFunction::Round,
        UnaryFunction::Trunc,
        UnaryFunction::Signum,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            UnaryFunction::Sin => "sin",
            UnaryFunction::Cos => "cos",
            UnaryFunction::Tan => "tan",
            UnaryFunction::Asin => "asin",
            UnaryFunction::Acos => "acos",
            UnaryFunction::Atan => "atan",
            UnaryFunction::Sinh => "sinh",
            UnaryFunction::Cosh => "cosh",
            UnaryFunction::Tanh => "tanh",
            UnaryFunction::Exp => "exp",
            UnaryFunction::Ln => "ln",
            UnaryFunction::Log2 => "log2",
            UnaryFunction::Log10 => "log10",
            UnaryFunction::Sqrt => "sqrt",
            UnaryFunction::Cbrt => "cbrt",
            UnaryFunction::Floor => "floor",
            UnaryFunction::Ceil => "ceil",
            UnaryFunction::Round => "round",
            UnaryFunction::Trunc => "trunc",
            UnaryFunction::Signum => "signum",
        }
    }

    pub fn apply(&self, x: f64) -> f64 {
        match self {
            UnaryFunction::Sin => x.sin(),
            UnaryFunction::Cos => x.cos(),
            UnaryFunction::Tan => x.tan(),
            UnaryFunction::Asin => x.asin(),
            UnaryFunction::Acos => x.acos(),
            UnaryFunction::Atan => x.atan(),
            UnaryFunction::Sinh => x.sinh(),
            UnaryFunction::Cosh => x.cosh(),
            UnaryFunction::Tanh => x.tanh(),
            UnaryFunction::Exp => x.exp(),
            UnaryFunction::Ln => x.ln(),
            UnaryFunction::Log2 => x.log2(),
            UnaryFunction::Log10 => x.log10(),
            UnaryFunction::Sqrt => x.sqrt(),
            UnaryFunction::Cbrt => x.cbrt(),
            UnaryFunction::Floor => x.floor(),
            UnaryFunction::Ceil => x.ceil(),
            UnaryFunction::Round => x.round(),
            UnaryFunction::Trunc => x.trunc(),
            UnaryFunction::Signum => x.signum(),
        }
    }
}

impl fmt::Display for UnaryFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UnaryFunction {
    type Err = CbdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // `log` is accepted as the natural logarithm
        let name = if s == "log" { "ln" } else { s };
        Self::ALL
            .iter()
            .find(|f| f.name() == name)
            .copied()
            .ok_or_else(|| CbdError::Config(format!("unknown function {}", s)))
    }
}

/// Applies a named [`UnaryFunction`] to `IN1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generic {
    function: UnaryFunction,
}

impl Generic {
    pub fn new(function: UnaryFunction) -> Self {
        Self { function }
    }

    pub fn function(&self) -> UnaryFunction {
        self.function
    }
}

#[typetag::serde]
impl Block for Generic {
    fn input_ports(&self) -> Vec<PortName> {
        unary_ports()
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        Ok(OutputValues::single(self.function.apply(inputs.value("IN1")?)))
    }
}

/// Forwards the input selected by `select`.
///
/// With `zero_based` set, `select = 0` picks `IN1`. Otherwise `select = 1` does.
/// Every option is a dependency of the output, whichever one is selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Multiplexer {
    num_inputs: usize,
    zero_based: bool,
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new(2, true)
    }
}

impl Multiplexer {
    pub fn new(num_inputs: usize, zero_based: bool) -> Self {
        Self {
            num_inputs,
            zero_based,
        }
    }
}

#[typetag::serde]
impl Block for Multiplexer {
    fn input_ports(&self) -> Vec<PortName> {
        let mut inputs = ports(&["select"]);
        inputs.extend(numbered_ports("IN", self.num_inputs));
        inputs
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        let select = inputs.value("select")?.trunc();
        let index = if self.zero_based { select + 1.0 } else { select };
        if index < 1.0 || index > self.num_inputs as f64 {
            return Err(inputs.error(format!("select input {} is out of range", select)));
        }
        let value = inputs.value(&format!("IN{}", index as usize))?;
        Ok(OutputValues::single(value))
    }
}

/// Smallest of `IN1..INn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Min {
    num_inputs: usize,
}

impl Min {
    pub fn new(num_inputs: usize) -> Self {
        Self { num_inputs }
    }
}

#[typetag::serde]
impl Block for Min {
    fn input_ports(&self) -> Vec<PortName> {
        numbered_ports("IN", self.num_inputs)
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        let values = inputs.values(&self.input_ports())?;
        Ok(OutputValues::single(
            values.into_iter().fold(f64::INFINITY, f64::min),
        ))
    }
}

/// Largest of `IN1..INn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Max {
    num_inputs: usize,
}

impl Max {
    pub fn new(num_inputs: usize) -> Self {
        Self { num_inputs }
    }
}

#[typetag::serde]
impl Block for Max {
    fn input_ports(&self) -> Vec<PortName> {
        numbered_ports("IN", self.num_inputs)
    }

    fn output_ports(&self) -> Vec<PortName> {
        ports(&["OUT1"])
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        let values = inputs.values(&self.input_ports())?;
        Ok(OutputValues::single(
            values.into_iter().fold(f64::NEG_INFINITY, f64::max),
        ))
    }
}

/// Copies `IN1` to `OUT1..OUTn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Split {
    num_outputs: usize,
}

impl Split {
    pub fn new(num_outputs: usize) -> Self {
        Self { num_outputs }
    }
}

#[typetag::serde]
impl Block for Split {
    fn input_ports(&self) -> Vec<PortName> {
        unary_ports()
    }

    fn output_ports(&self) -> Vec<PortName> {
        numbered_ports("OUT", self.num_outputs)
    }

    fn compute(&self, _: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        let value = inputs.value("IN1")?;
        let mut outputs = OutputValues::new();
        for port in self.output_ports() {
            outputs.insert(&port, value);
        }
        Ok(outputs)
    }

    fn linear_form(&self, _: &StepContext, _: &BlockState) -> Option<LinearForm> {
        Some(LinearForm(
            self.output_ports()
                .into_iter()
                .map(|output| LinearEquation {
                    output,
                    terms: vec![("IN1".to_string(), 1.0)],
                    constant: 0.0,
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn ctx() -> StepContext {
        StepContext::new(0.0, 1.0, 0)
    }

    fn out(block: &dyn Block, inputs: &[(&str, f64)]) -> CbdResult<f64> {
        let outputs = block.compute(
            &ctx(),
            &InputValues::from_values(inputs.iter().copied()),
            &BlockState::default(),
        )?;
        Ok(outputs.get("OUT1").unwrap())
    }

    #[test]
    fn arithmetic() {
        assert_eq!(out(&Gain::new(3.0), &[("IN1", 2.0)]).unwrap(), 6.0);
        assert_eq!(out(&Negator, &[("IN1", 2.0)]).unwrap(), -2.0);
        assert_eq!(out(&Inverter::default(), &[("IN1", 4.0)]).unwrap(), 0.25);
        assert_eq!(
            out(&Adder::new(3), &[("IN1", 1.0), ("IN2", 2.0), ("IN3", 3.0)]).unwrap(),
            6.0
        );
        assert_eq!(
            out(&Product::new(3), &[("IN1", 2.0), ("IN2", 3.0), ("IN3", 4.0)]).unwrap(),
            24.0
        );
        assert_eq!(out(&Power, &[("IN1", 2.0), ("IN2", 10.0)]).unwrap(), 1024.0);
        assert!(is_close!(
            out(&Root::default(), &[("IN1", 27.0), ("IN2", 3.0)]).unwrap(),
            3.0
        ));
        assert_eq!(out(&Abs, &[("IN1", -2.5)]).unwrap(), 2.5);
    }

    #[test]
    fn modulo_keeps_the_sign_of_the_dividend() {
        assert_eq!(out(&Modulo, &[("IN1", 7.0), ("IN2", 3.0)]).unwrap(), 1.0);
        assert_eq!(out(&Modulo, &[("IN1", -7.0), ("IN2", 3.0)]).unwrap(), -1.0);
        assert_eq!(out(&Modulo, &[("IN1", 7.5), ("IN2", 2.0)]).unwrap(), 1.5);
    }

    #[test]
    fn int_truncates() {
        assert_eq!(out(&Int, &[("IN1", 2.7)]).unwrap(), 2.0);
        assert_eq!(out(&Int, &[("IN1", -2.7)]).unwrap(), -2.0);
    }

    #[test]
    fn division_by_zero_fails_the_step() {
        let err = out(&Inverter::default(), &[("IN1", 0.0)]).unwrap_err();
        assert!(
            err.to_string().contains("division by zero"),
            "unexpected error: {}",
            err
        );
        assert!(out(&Root::default(), &[("IN1", 4.0), ("IN2", 0.0)]).is_err());
    }

    #[test]
    fn clamp() {
        let clamp = Clamp::default();
        assert_eq!(out(&clamp, &[("IN1", 5.0)]).unwrap(), 1.0);
        assert_eq!(out(&clamp, &[("IN1", -5.0)]).unwrap(), -1.0);
        assert_eq!(out(&clamp, &[("IN1", 0.5)]).unwrap(), 0.5);

        let dynamic = Clamp::from_parameters(ClampParameters {
            from_inputs: true,
            ..Default::default()
        });
        assert_eq!(dynamic.input_ports(), vec!["IN1", "IN2", "IN3"]);
        assert_eq!(
            out(&dynamic, &[("IN1", 5.0), ("IN2", 0.0), ("IN3", 2.0)]).unwrap(),
            2.0
        );
    }

    #[test]
    fn clamp_parameters() {
        let mut clamp = Clamp::default();
        clamp.set_parameter("max", 10.0).unwrap();
        assert_eq!(clamp.parameter("max"), Some(10.0));
        assert_eq!(out(&clamp, &[("IN1", 5.0)]).unwrap(), 5.0);
        assert!(clamp.parameter("gain").is_none());
    }

    #[test]
    fn generic_functions() {
        let sin: UnaryFunction = "sin".parse().unwrap();
        assert!(is_close!(
            out(&Generic::new(sin), &[("IN1", std::f64::consts::FRAC_PI_2)]).unwrap(),
            1.0
        ));
        let ln: UnaryFunction = "log".parse().unwrap();
        assert_eq!(ln, UnaryFunction::Ln);
        assert!(is_close!(
            out(&Generic::new(ln), &[("IN1", std::f64::consts::E)]).unwrap(),
            1.0
        ));

        let err = "gamma".parse::<UnaryFunction>().unwrap_err();
        assert!(err.to_string().contains("gamma"), "unexpected error: {}", err);
    }

    #[test]
    fn multiplexer() {
        let mux = Multiplexer::new(3, true);
        assert_eq!(mux.input_ports(), vec!["select", "IN1", "IN2", "IN3"]);
        let inputs = [("IN1", 10.0), ("IN2", 20.0), ("IN3", 30.0)];

        let pick = |select: f64| {
            let mut all = inputs.to_vec();
            all.push(("select", select));
            out(&mux, &all)
        };
        assert_eq!(pick(0.0).unwrap(), 10.0);
        assert_eq!(pick(2.0).unwrap(), 30.0);
        assert!(pick(3.0).is_err());
        assert!(pick(-1.0).is_err());

        let one_based = Multiplexer::new(2, false);
        assert_eq!(
            out(&one_based, &[("select", 1.0), ("IN1", 1.5), ("IN2", 2.5)]).unwrap(),
            1.5
        );
    }

    #[test]
    fn min_max() {
        let inputs = [("IN1", 3.0), ("IN2", -1.0), ("IN3", 2.0)];
        assert_eq!(out(&Min::new(3), &inputs).unwrap(), -1.0);
        assert_eq!(out(&Max::new(3), &inputs).unwrap(), 3.0);
    }

    #[test]
    fn split_copies_to_every_output() {
        let split = Split::new(3);
        let outputs = split
            .compute(
                &ctx(),
                &InputValues::from_values([("IN1", 4.0)]),
                &BlockState::default(),
            )
            .unwrap();
        assert_eq!(outputs.iter().count(), 3);
        assert_eq!(outputs.get("OUT3"), Some(4.0));
        assert_eq!(
            split
                .linear_form(&ctx(), &BlockState::default())
                .unwrap()
                .0
                .len(),
            3
        );
    }

    #[test]
    fn adder_linear_form() {
        let form = Adder::new(2)
            .linear_form(&ctx(), &BlockState::default())
            .unwrap();
        assert_eq!(
            form.0[0].terms,
            vec![("IN1".to_string(), 1.0), ("IN2".to_string(), 1.0)]
        );
    }
}
