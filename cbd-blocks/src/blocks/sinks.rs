use super::{ports, truthy};
use cbd_core::block::{Block, BlockState, InputValues, OutputValues, PortName, StepContext};
use cbd_core::errors::CbdResult;
use log::log;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    #[default]
    Warn,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// Logs `message` whenever `IN1` is true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    message: String,
    #[serde(default)]
    level: LogLevel,
}

impl Logging {
    pub fn new(message: &str, level: LogLevel) -> Self {
        Self {
            message: message.to_string(),
            level,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[typetag::serde]
impl Block for Logging {
    fn input_ports(&self) -> Vec<PortName> {
        ports(&["IN1"])
    }

    fn output_ports(&self) -> Vec<PortName> {
        vec![]
    }

    fn compute(&self, ctx: &StepContext, inputs: &InputValues, _: &BlockState) -> CbdResult<OutputValues> {
        if truthy(inputs.value("IN1")?) {
            log!(
                target: "cbd",
                log::Level::from(self.level),
                "[{}] {}: {}",
                ctx.time,
                inputs.block(),
                self.message
            );
        }
        Ok(OutputValues::new())
    }
}
