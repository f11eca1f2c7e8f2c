//! # vecsim-index
//!
//! Flat and HNSW vector indexes.
//!
//! This crate provides:
//! - `UpdatableMaxHeap`: the re-prioritizable heap behind graph beam search
//! - `FlatIndex`: exact linear scan, also used as a write buffer
//! - `HnswIndex`: approximate multi-layer proximity graph with soft delete,
//!   repair and slot compaction
//! - A versioned binary image for HNSW graphs with classified load errors
//!
//! ## Usage
//!
//! ```rust
//! use vecsim_index::{HnswConfig, HnswIndex, VectorIndex};
//! use vecsim_types::{LogContext, Metric, QueryParams};
//!
//! let config = HnswConfig::new(2, Metric::L2).with_block_size(16);
//! let mut index = HnswIndex::<f32>::new(config, LogContext::new()).unwrap();
//! index.add(1, &[0.0, 0.0]).unwrap();
//! index.add(2, &[1.0, 1.0]).unwrap();
//!
//! let reply = index.top_k(&[0.9, 0.9], 1, &QueryParams::default()).unwrap();
//! assert_eq!(reply.labels(), vec![2]);
//! ```

pub mod error;
pub mod flat;
pub mod hnsw;
pub mod index;
pub mod persist;
pub mod queue;

pub use error::IndexError;
pub use flat::{EntryId, FlatIndex};
pub use hnsw::{HnswConfig, HnswIndex};
pub use index::{HnswInfo, IndexInfo, VectorIndex};
pub use persist::{read_header, Header, LoadError, CURRENT_VERSION, MAX_DIM, MIN_SUPPORTED_VERSION};
pub use queue::UpdatableMaxHeap;
