//! Vector index trait and types.
//!
//! Defines the interface shared by the flat buffer, the graph and the tiered
//! coordinator.

use serde::Serialize;

use vecsim_types::{Algorithm, DataType, Label, Metric, QueryParams, QueryReply, VectorElement};

use crate::error::IndexError;

/// Graph-specific part of [`IndexInfo`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HnswInfo {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_runtime: usize,
    pub epsilon: f64,
    /// Highest layer of the current entry point
    pub max_level: usize,
    pub entry_point: Option<u32>,
    /// Nodes marked deleted but not yet swapped out
    pub marked_deleted: usize,
}

/// Index statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub algorithm: Algorithm,
    pub data_type: DataType,
    pub metric: Metric,
    /// Vector dimension
    pub dim: usize,
    pub multi: bool,
    pub block_size: usize,
    /// Number of live vectors
    pub size: usize,
    /// Number of distinct live labels
    pub label_count: usize,
    /// Allocated slots, in whole blocks
    pub capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hnsw: Option<HnswInfo>,
}

/// Trait for vector indexes.
///
/// Implementations must be thread-safe for concurrent read access.
pub trait VectorIndex<T: VectorElement>: Send + Sync {
    /// Get the vector dimension
    fn dim(&self) -> usize;

    fn metric(&self) -> Metric;

    /// Number of live vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a vector under `label`.
    ///
    /// In single-value indexes an existing label is overwritten.
    fn add(&mut self, label: Label, vector: &[T]) -> Result<(), IndexError>;

    /// Add multiple vectors in batch.
    fn add_batch(&mut self, vectors: &[(Label, Vec<T>)]) -> Result<(), IndexError> {
        for (label, vector) in vectors {
            self.add(*label, vector)?;
        }
        Ok(())
    }

    /// Remove every vector stored under `label`, returning how many were removed.
    fn delete(&mut self, label: Label) -> Result<usize, IndexError>;

    /// The `k` nearest labels, sorted by score ascending.
    fn top_k(&self, query: &[T], k: usize, params: &QueryParams)
        -> Result<QueryReply, IndexError>;

    /// Every label within `radius` of `query`, sorted by score ascending.
    fn range_query(
        &self,
        query: &[T],
        radius: f64,
        params: &QueryParams,
    ) -> Result<QueryReply, IndexError>;

    fn contains(&self, label: Label) -> bool;

    fn info(&self) -> IndexInfo;
}
