//! # vecsim-types
//!
//! Shared domain types for the vecsim indexes.
//!
//! This crate defines the vocabulary used by every index kind:
//! - Elements: the numeric widths a vector may be stored in (`f32`, `f64`)
//! - Tags: algorithm, data type and metric identifiers (also persisted)
//! - Metrics: distance functions and overflow-safe normalization
//! - Results: query replies and result containers
//! - Params: runtime query-parameter resolution
//! - Log: the leveled log sink contract
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use vecsim_types::{Metric, normalize};
//!
//! let mut v = vec![3.0f32, 4.0];
//! normalize(&mut v);
//! assert!((Metric::L2.distance(&v, &[0.6, 0.8])).abs() < 1e-6);
//! ```

pub mod config;
pub mod element;
pub mod error;
pub mod log;
pub mod metric;
pub mod params;
pub mod results;

pub use config::{HnswSettings, Settings, TieredSettings, WriteMode};
pub use element::{Algorithm, DataType, VectorElement};
pub use error::VecSimError;
pub use log::{init_tracing, LogContext, LogLevel, LogSink, MemorySink};
pub use metric::{normalize, Metric};
pub use params::{resolve_params, ParamError, QueryParams, QueryType, RawParam, SearchMode};
pub use results::{DefaultResults, QueryReply, QueryResult, ResultsContainer, UniqueResults};

/// External, caller-facing vector identifier.
pub type Label = u64;

/// Dense slot index of a stored vector inside one index.
pub type InternalId = u32;

/// Sentinel for "no internal id" in persisted and in-memory structures.
pub const INVALID_ID: InternalId = InternalId::MAX;

/// Default number of vectors per storage block.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;
