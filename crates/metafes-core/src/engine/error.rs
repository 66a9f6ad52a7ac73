use super::config::ConfigError;
use super::state::RunState;
use crate::core::models::variable::CvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Collective variable '{name}' could not be evaluated: {source}")]
    Variable {
        name: String,
        #[source]
        source: CvError,
    },

    #[error("Expected {expected} collective-variable values, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Invalid hill: {0}")]
    InvalidHill(String),

    #[error(
        "Value {value} of collective variable {index} lies outside its bounds [{lower:?}, {upper:?}]"
    )]
    InvalidCvValue {
        index: usize,
        value: f64,
        lower: Option<f64>,
        upper: Option<f64>,
    },

    #[error("Index {requested} is beyond the committed length {committed} of a closed source")]
    StaleQuery { requested: usize, committed: usize },

    #[error("Insufficient sampling: {0}")]
    InsufficientSampling(String),

    #[error("Invalid thermal energy kT = {0}; it must be finite and positive")]
    InvalidTemperature(f64),

    #[error("Collective variable index {index} is out of range ({count} defined)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Cannot {action} a run that is {from}")]
    InvalidTransition {
        from: RunState,
        action: &'static str,
    },

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Internal logic error: {0}")]
    Internal(String),
}
