mod logic;
mod math;
mod memory;
mod sinks;
mod sources;

pub use logic::{And, Equals, LessThan, LessThanOrEquals, Not, Or};
pub use math::{
    Abs, Adder, Clamp, ClampParameters, Gain, Generic, Int, Inverter, Max, Min, Modulo,
    Multiplexer, Negator, Power, Product, Root, Split, UnaryFunction,
};
pub use memory::Delay;
pub use sinks::{LogLevel, Logging};
pub use sources::{Constant, DeltaT, Sequence, Time};

use cbd_core::block::PortName;
use cbd_core::errors::CbdError;

pub(crate) fn ports(names: &[&str]) -> Vec<PortName> {
    names.iter().map(|n| n.to_string()).collect()
}

/// The model graph fills in the block path.
pub(crate) fn unknown_parameter(name: &str) -> CbdError {
    CbdError::UnknownParameter {
        block: String::new(),
        name: name.to_string(),
    }
}

/// Boolean interpretation of a signal value.
pub(crate) fn truthy(value: f64) -> bool {
    value != 0.0 && !value.is_nan()
}

pub(crate) fn boolean(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}
