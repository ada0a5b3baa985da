use crate::world::Cell;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// The current cell has no cost-to-go entry. Ends an episode or rollout early,
    /// callers treat it as an outcome rather than a failure.
    #[error("no feasible path from {cell}")]
    NoFeasiblePath { cell: Cell },

    #[error("invalid override token {token:?} for prompt {prompt:?}")]
    InvalidOverrideToken { prompt: String, token: String },

    #[error("override script exhausted at prompt {prompt:?}")]
    ScriptExhausted { prompt: String },

    #[error("counterfactual branch requested but no branch parameters configured")]
    CounterfactualUnconfigured,

    #[error("invalid map: {0}")]
    InvalidMap(String),

    #[error("probability out of range: {0}")]
    InvalidProbability(f64),

    #[error("override channel i/o failed: {0}")]
    Io(String),
}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        SimError::Io(err.to_string())
    }
}
