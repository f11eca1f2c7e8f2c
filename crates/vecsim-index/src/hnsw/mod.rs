//! Hierarchical navigable small-world graph index.
//!
//! Nodes live in a contiguous arena addressed by internal id; edges are lists
//! of internal ids per layer. Storage grows and shrinks in whole blocks, and
//! only when the owner asks for it (`ensure_capacity` / `shrink_to_fit`).
//!
//! Deletion is split in three steps so a coordinator can defer the expensive
//! parts:
//! - `mark_deleted`: the node leaves result sets but stays a traversal waypoint
//! - `repair`: in-neighbors are reconnected and the node is isolated
//! - `swap_remove`: the last slot is relocated into the isolated one

mod delete;
mod graph;
mod insert;
mod integrity;
mod search;

use std::collections::HashMap;

use tracing::debug;

use vecsim_types::{
    Algorithm, HnswSettings, Label, LogContext, Metric, QueryParams, QueryReply, Settings,
    VectorElement, DEFAULT_BLOCK_SIZE,
};

use crate::error::IndexError;
use crate::index::{HnswInfo, IndexInfo, VectorIndex};

pub(crate) use graph::{Links, Node};

/// HNSW index configuration
#[derive(Debug, Clone, PartialEq)]
pub struct HnswConfig {
    /// Vector dimension
    pub dim: usize,
    pub metric: Metric,
    /// Allow several vectors per label
    pub multi: bool,
    /// Slots added or released per capacity change
    pub block_size: usize,
    /// Max neighbors per node on layers above 0 (layer 0 allows 2*M)
    pub m: usize,
    /// Build-time beam width
    pub ef_construction: usize,
    /// Default query-time beam width
    pub ef_runtime: usize,
    /// Range-query boundary expansion factor
    pub epsilon: f64,
    /// Seed for layer assignment
    pub level_seed: u64,
}

impl HnswConfig {
    pub fn new(dim: usize, metric: Metric) -> Self {
        let defaults = HnswSettings::default();
        Self {
            dim,
            metric,
            multi: false,
            block_size: DEFAULT_BLOCK_SIZE,
            m: defaults.m,
            ef_construction: defaults.ef_construction,
            ef_runtime: defaults.ef_runtime,
            epsilon: defaults.epsilon,
            level_seed: defaults.level_seed,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            dim: settings.dim,
            metric: settings.metric,
            multi: settings.multi,
            block_size: settings.block_size,
            m: settings.hnsw.m,
            ef_construction: settings.hnsw.ef_construction,
            ef_runtime: settings.hnsw.ef_runtime,
            epsilon: settings.hnsw.epsilon,
            level_seed: settings.hnsw.level_seed,
        }
    }

    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn with_ef(mut self, ef_construction: usize, ef_runtime: usize) -> Self {
        self.ef_construction = ef_construction;
        self.ef_runtime = ef_runtime;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.level_seed = seed;
        self
    }

    /// Degree cap for `layer`.
    pub fn max_degree(&self, layer: usize) -> usize {
        if layer == 0 {
            2 * self.m
        } else {
            self.m
        }
    }

    pub(crate) fn level_multiplier(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }

    pub(crate) fn validate(&self) -> Result<(), IndexError> {
        if self.dim == 0 {
            return Err(IndexError::InvalidInput("dim must be > 0".to_string()));
        }
        if self.block_size == 0 {
            return Err(IndexError::InvalidInput("block_size must be > 0".to_string()));
        }
        if self.m < 2 {
            return Err(IndexError::InvalidInput(format!(
                "M must be >= 2, got {}",
                self.m
            )));
        }
        if self.ef_construction == 0 || self.ef_runtime == 0 {
            return Err(IndexError::InvalidInput("ef values must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Approximate nearest-neighbor graph over `T` vectors.
pub struct HnswIndex<T: VectorElement> {
    pub(crate) config: HnswConfig,
    pub(crate) log: LogContext,
    pub(crate) nodes: Vec<Node>,
    pub(crate) vectors: Vec<T>,
    /// Live internal ids per label
    pub(crate) labels: HashMap<Label, Vec<u32>>,
    pub(crate) entry_point: Option<u32>,
    pub(crate) max_level: usize,
    pub(crate) capacity: usize,
    /// Layer draws made so far; persisted so reloaded graphs keep drawing the same sequence
    pub(crate) level_counter: u64,
    pub(crate) next_generation: u64,
    pub(crate) marked_deleted: usize,
}

impl<T: VectorElement> HnswIndex<T> {
    /// Create an empty index with zero capacity.
    pub fn new(config: HnswConfig, log: LogContext) -> Result<Self, IndexError> {
        config.validate()?;
        debug!(dim = config.dim, m = config.m, metric = %config.metric, "Creating HNSW index");
        Ok(Self {
            config,
            log,
            nodes: Vec::new(),
            vectors: Vec::new(),
            labels: HashMap::new(),
            entry_point: None,
            max_level: 0,
            capacity: 0,
            level_counter: 0,
            next_generation: 0,
            marked_deleted: 0,
        })
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    pub fn log_context(&self) -> &LogContext {
        &self.log
    }

    /// Allocated slots, always a multiple of the block size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Occupied slots, including nodes marked deleted.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn marked_deleted_count(&self) -> usize {
        self.marked_deleted
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn entry_point(&self) -> Option<u32> {
        self.entry_point
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Live internal ids stored under `label`.
    pub fn ids_of(&self, label: Label) -> &[u32] {
        self.labels.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn label_of(&self, id: u32) -> Option<Label> {
        self.nodes.get(id as usize).map(|n| n.label)
    }

    pub fn is_marked_deleted(&self, id: u32) -> bool {
        self.nodes.get(id as usize).is_some_and(|n| n.deleted)
    }

    /// Serial number of the node currently occupying `id`.
    ///
    /// Changes whenever the slot is refilled, so a deferred job can tell
    /// whether the node it was created for still lives there.
    pub fn generation_of(&self, id: u32) -> Option<u64> {
        self.nodes.get(id as usize).map(|n| n.generation)
    }

    /// Stored (prepared) vector of `id`.
    pub fn vector(&self, id: u32) -> Option<&[T]> {
        let dim = self.config.dim;
        let start = id as usize * dim;
        self.vectors.get(start..start + dim)
    }

    /// Grow by one block if every slot is taken.
    pub fn ensure_capacity(&mut self) {
        if self.nodes.len() >= self.capacity {
            let target = self.capacity + self.config.block_size;
            self.resize(target);
        }
    }

    /// Release trailing blocks that hold no nodes.
    pub fn shrink_to_fit(&mut self) {
        let block = self.config.block_size;
        let target = self.nodes.len().div_ceil(block) * block;
        if target < self.capacity {
            self.resize(target);
        }
    }

    fn resize(&mut self, target: usize) {
        self.log.verbose(format_args!(
            "Updating HNSW index capacity from {} to {}",
            self.capacity, target
        ));
        if target > self.capacity {
            let extra = target - self.nodes.len();
            self.nodes.reserve(extra);
            self.vectors.reserve(extra * self.config.dim);
        } else {
            self.nodes.shrink_to(target);
            self.vectors.shrink_to(target * self.config.dim);
        }
        self.capacity = target;
    }

    /// Live vector count.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.marked_deleted
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete every vector of `label` and compact right away.
    pub fn remove_label(&mut self, label: Label) -> Result<usize, IndexError> {
        let mut ids = self.ids_of(label).to_vec();
        if ids.is_empty() {
            return Ok(0);
        }
        for &id in &ids {
            self.mark_deleted(id)?;
            self.repair(id)?;
        }
        // Highest first, so no id in the batch is moved before it is removed.
        ids.sort_unstable_by(|a, b| b.cmp(a));
        for &id in &ids {
            self.swap_remove(id)?;
        }
        self.shrink_to_fit();
        Ok(ids.len())
    }

    pub fn info(&self) -> IndexInfo {
        IndexInfo {
            algorithm: Algorithm::Hnsw,
            data_type: T::DATA_TYPE,
            metric: self.config.metric,
            dim: self.config.dim,
            multi: self.config.multi,
            block_size: self.config.block_size,
            size: self.len(),
            label_count: self.labels.len(),
            capacity: self.capacity,
            hnsw: Some(HnswInfo {
                m: self.config.m,
                ef_construction: self.config.ef_construction,
                ef_runtime: self.config.ef_runtime,
                epsilon: self.config.epsilon,
                max_level: self.max_level,
                entry_point: self.entry_point,
                marked_deleted: self.marked_deleted,
            }),
        }
    }
}

impl<T: VectorElement> VectorIndex<T> for HnswIndex<T> {
    fn dim(&self) -> usize {
        self.config.dim
    }

    fn metric(&self) -> Metric {
        self.config.metric
    }

    fn len(&self) -> usize {
        HnswIndex::len(self)
    }

    fn add(&mut self, label: Label, vector: &[T]) -> Result<(), IndexError> {
        vecsim_types::VecSimError::check_dimension(self.config.dim, vector.len())?;
        if !self.config.multi {
            self.remove_label(label)?;
        }
        self.ensure_capacity();
        self.insert(label, vector)?;
        Ok(())
    }

    fn delete(&mut self, label: Label) -> Result<usize, IndexError> {
        self.remove_label(label)
    }

    fn top_k(
        &self,
        query: &[T],
        k: usize,
        params: &QueryParams,
    ) -> Result<QueryReply, IndexError> {
        let ef = params.ef_runtime.unwrap_or(self.config.ef_runtime).max(k);
        self.search(query, k, ef)
    }

    fn range_query(
        &self,
        query: &[T],
        radius: f64,
        params: &QueryParams,
    ) -> Result<QueryReply, IndexError> {
        let epsilon = params.epsilon.unwrap_or(self.config.epsilon);
        self.range_search(query, radius, epsilon)
    }

    fn contains(&self, label: Label) -> bool {
        self.labels.contains_key(&label)
    }

    fn info(&self) -> IndexInfo {
        HnswIndex::info(self)
    }
}
