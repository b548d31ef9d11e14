use thiserror::Error;

/// Configuration and usage errors raised by the dispatch core.
///
/// Infeasible demand is not an error: it is reported through
/// [`AllocationResult::success`](crate::domain::AllocationResult).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("compressor {name}: qmax equals qmin, power slope is undefined")]
    DegenerateEnvelope { name: String },

    #[error("compressor {name}: {reason}")]
    InvalidCompressor { name: String, reason: String },

    #[error("duplicate compressor name: {0}")]
    DuplicateCompressor(String),

    #[error("fleet contains no compressors")]
    EmptyFleet,

    #[error("invalid counterfactual policy selector: {0}")]
    InvalidPolicy(String),

    #[error("sequence names unknown compressor: {0}")]
    UnknownCompressor(String),

    #[error("sequence names compressor {0} more than once")]
    DuplicateInSequence(String),

    #[error("demand must be finite and non-negative, got {0}")]
    InvalidDemand(f64),

    #[error("model has not been set up; call setup() before solve()")]
    ModelNotBuilt,
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Demand must be a finite, non-negative flow.
pub fn check_demand(demand: f64) -> DispatchResult<()> {
    if !demand.is_finite() || demand < 0.0 {
        return Err(DispatchError::InvalidDemand(demand));
    }
    Ok(())
}
