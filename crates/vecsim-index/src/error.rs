//! Vector index error types.

use thiserror::Error;

use vecsim_types::{ParamError, VecSimError};

use crate::persist::LoadError;

/// Errors that can occur during vector index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Malformed request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Beam narrower than the requested result count
    #[error("Invalid ef: ef ({ef}) must be >= k ({k})")]
    InvalidEf { ef: usize, k: usize },

    /// Index is full; capacity must be grown before inserting
    #[error("Index capacity reached: {0}")]
    CapacityReached(usize),

    /// Operation not valid for the node in its current state
    #[error("Invalid node state for {id}: {reason}")]
    InvalidNodeState { id: u32, reason: String },

    /// Graph structure violates an internal invariant
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// Query parameter error
    #[error("Query parameter error: {0}")]
    Params(#[from] ParamError),

    /// Persistence error
    #[error(transparent)]
    Load(#[from] LoadError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VecSimError> for IndexError {
    fn from(err: VecSimError) -> Self {
        match err {
            VecSimError::DimensionMismatch { expected, actual } => {
                IndexError::DimensionMismatch { expected, actual }
            }
            VecSimError::InvalidInput(msg) | VecSimError::Config(msg) => {
                IndexError::InvalidInput(msg)
            }
        }
    }
}
