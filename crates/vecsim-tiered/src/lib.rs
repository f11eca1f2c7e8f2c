//! # vecsim-tiered
//!
//! Tiered vector index and the background jobs that maintain it.
//!
//! This crate provides:
//! - `TieredIndex`: a flat write buffer in front of an HNSW graph
//! - `Job` / `JobQueue`: the boundary through which maintenance work leaves the index
//! - `ManualJobQueue` and `WorkerPool`: two executors for that work
//! - `JobRegistry`: per-kind job counters
//! - `AnyIndex`: build any index kind from `Settings`
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use vecsim_index::HnswConfig;
//! use vecsim_tiered::{ManualJobQueue, TieredConfig, TieredIndex};
//! use vecsim_types::{LogContext, Metric, QueryParams};
//!
//! let queue = Arc::new(ManualJobQueue::new());
//! let config = TieredConfig::new(HnswConfig::new(2, Metric::L2));
//! let index = TieredIndex::<f32>::new(config, queue.clone(), LogContext::new()).unwrap();
//!
//! index.add_vector(1, &[0.0, 0.0]).unwrap();
//! index.add_vector(2, &[1.0, 1.0]).unwrap();
//! queue.run_all();
//!
//! let reply = index.search(&[0.9, 0.9], 1, &QueryParams::default()).unwrap();
//! assert_eq!(reply.labels(), vec![2]);
//! ```

mod config;
mod error;
mod factory;
mod job;
mod pool;
mod queue;
mod registry;
mod tiered;

pub use config::{TieredConfig, WorkerPoolConfig};
pub use error::TieredError;
pub use factory::AnyIndex;
pub use job::{Job, JobKind, JobOutcome, JobTarget, Task};
pub use pool::{ChannelJobQueue, WorkerPool};
pub use queue::{JobQueue, ManualJobQueue};
pub use registry::{JobRegistry, JobStatus};
pub use tiered::{TieredIndex, TieredInfo};
