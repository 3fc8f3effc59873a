use thiserror::Error;

/// Error type for invalid model structure and failed runs.
///
/// Structural errors are detected while the model is assembled or scheduled.
/// Everything else surfaces while stepping and ends the run in the `Failed` state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CbdError {
    #[error("{0}")]
    Error(String),
    #[error("Input port {port} of block {block} is not connected")]
    UnconnectedInput { block: String, port: String },
    #[error("A block named {name} already exists in {scope}")]
    DuplicateName { name: String, scope: String },
    #[error("Invalid rate {rate} for block {block}. Rates must be a positive multiple of the base step")]
    InvalidRate { block: String, rate: u32 },
    #[error("No block named {0}")]
    UnknownBlock(String),
    #[error("Block {block} has no {direction} port named {port}")]
    UnknownPort {
        block: String,
        port: String,
        direction: String,
    },
    #[error("Input port {port} of block {block} already has an incoming connection")]
    InputAlreadyConnected { block: String, port: String },
    #[error("Output port {port} of composite {block} is not bound to an inner block")]
    UnboundCompositeOutput { block: String, port: String },
    #[error("Input port {port} of composite {block} is not bound to an inner block")]
    UnboundCompositeInput { block: String, port: String },
    #[error("Invalid connection: {0}")]
    InvalidConnection(String),
    #[error("Algebraic loop [{members}] did not converge after {iterations} iterations (residual={residual})")]
    Convergence {
        members: String,
        iterations: usize,
        residual: f64,
    },
    #[error("Algebraic loop [{members}] cannot be solved: {reason}")]
    UnsolvableLoop { members: String, reason: String },
    #[error("Signal {signal} has no sample at t={time}")]
    NoSample { signal: String, time: f64 },
    #[error("Extrapolation is not allowed. Target={time}, {signal} range=[{first}, {last}]")]
    ExtrapolationNotAllowed {
        signal: String,
        time: f64,
        first: f64,
        last: f64,
    },
    #[error("Samples of {signal} must be strictly increasing in time. Last={last}, appended={time}")]
    NonMonotonicAppend { signal: String, last: f64, time: f64 },
    #[error("Operation not allowed while the simulation is {0}")]
    InvalidState(String),
    #[error("Block {block} has no parameter named {name}")]
    UnknownParameter { block: String, name: String },
    #[error("Parameter {name} of block {block} is read-only")]
    ReadOnlyParameter { block: String, name: String },
    #[error("No state event named {0}")]
    UnknownEvent(String),
    #[error("Block {block} failed: {message}")]
    Block { block: String, message: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CbdError {
    /// True for errors that describe a malformed model rather than a failed step.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CbdError::UnconnectedInput { .. }
                | CbdError::DuplicateName { .. }
                | CbdError::InvalidRate { .. }
                | CbdError::UnknownBlock(_)
                | CbdError::UnknownPort { .. }
                | CbdError::InputAlreadyConnected { .. }
                | CbdError::UnboundCompositeOutput { .. }
                | CbdError::UnboundCompositeInput { .. }
                | CbdError::InvalidConnection(_)
        )
    }
}

/// Convenience type for `Result<T, CbdError>`.
pub type CbdResult<T> = Result<T, CbdError>;
