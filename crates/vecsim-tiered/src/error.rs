//! Error types for the tiered crate.

use thiserror::Error;

use vecsim_index::IndexError;
use vecsim_types::VecSimError;

/// Errors raised while building or driving a tiered index.
#[derive(Debug, Error)]
pub enum TieredError {
    /// Error from one of the underlying indexes
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Invalid settings
    #[error(transparent)]
    Config(#[from] VecSimError),

    /// A tiered index was requested without a job queue to feed
    #[error("Tiered index requires a job queue")]
    MissingQueue,

    /// Settings name an element type other than the one requested
    #[error("Data type mismatch: settings say {configured}, index stores {stored}")]
    DataTypeMismatch {
        configured: &'static str,
        stored: &'static str,
    },

    /// Worker pool is already shut down
    #[error("Worker pool is not running")]
    NotRunning,

    /// Workers did not stop within the shutdown timeout
    #[error("Worker pool shutdown timed out after {0}s")]
    ShutdownTimeout(u64),
}
