//! Brute-force index over a contiguous vector array.
//!
//! Serves both as a standalone exact index and as the write buffer of the
//! tiered coordinator. Every stored vector gets an [`EntryId`] that stays
//! valid while other entries are removed and slots are compacted, so a
//! background job can refer to one buffered vector without holding a lock.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use vecsim_types::{
    Algorithm, DefaultResults, Label, Metric, QueryParams, QueryReply, ResultsContainer,
    UniqueResults, VecSimError, VectorElement, DEFAULT_BLOCK_SIZE,
};

use crate::error::IndexError;
use crate::index::{IndexInfo, VectorIndex};

/// Stable handle of one buffered vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntryId(u64);

/// Exact linear-scan index.
#[derive(Debug, Clone)]
pub struct FlatIndex<T: VectorElement> {
    dim: usize,
    metric: Metric,
    multi: bool,
    block_size: usize,
    vectors: Vec<T>,
    slots: Vec<(Label, EntryId)>,
    positions: HashMap<EntryId, usize>,
    labels: HashMap<Label, Vec<EntryId>>,
    next_entry: u64,
}

impl<T: VectorElement> FlatIndex<T> {
    pub fn new(dim: usize, metric: Metric) -> Self {
        Self {
            dim,
            metric,
            multi: false,
            block_size: DEFAULT_BLOCK_SIZE,
            vectors: Vec::new(),
            slots: Vec::new(),
            positions: HashMap::new(),
            labels: HashMap::new(),
            next_entry: 0,
        }
    }

    pub fn with_multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.labels.keys().copied()
    }

    /// Slots allocated so far, rounded up to whole blocks.
    pub fn capacity(&self) -> usize {
        self.slots.len().div_ceil(self.block_size) * self.block_size
    }

    /// Store `vector` under `label` and return its handle.
    ///
    /// A single-value index drops any vector already stored under `label`.
    pub fn add_entry(&mut self, label: Label, vector: &[T]) -> Result<EntryId, IndexError> {
        VecSimError::check_dimension(self.dim, vector.len())?;
        if !self.multi {
            self.delete_label(label);
        }

        let entry = EntryId(self.next_entry);
        self.next_entry += 1;

        let data = self.metric.prepare(vector);
        self.vectors.extend_from_slice(&data);
        self.positions.insert(entry, self.slots.len());
        self.slots.push((label, entry));
        self.labels.entry(label).or_default().push(entry);
        Ok(entry)
    }

    /// The label and stored (prepared) vector of `entry`.
    pub fn get_entry(&self, entry: EntryId) -> Option<(Label, &[T])> {
        let slot = *self.positions.get(&entry)?;
        Some((self.slots[slot].0, self.slot_vector(slot)))
    }

    pub fn contains_entry(&self, entry: EntryId) -> bool {
        self.positions.contains_key(&entry)
    }

    /// Handles stored under `label`, oldest first.
    pub fn entries_of(&self, label: Label) -> &[EntryId] {
        self.labels.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove one entry, returning its label if it was present.
    pub fn remove_entry(&mut self, entry: EntryId) -> Option<Label> {
        let slot = self.positions.remove(&entry)?;
        let (label, _) = self.slots[slot];

        if let Some(entries) = self.labels.get_mut(&label) {
            entries.retain(|e| *e != entry);
            if entries.is_empty() {
                self.labels.remove(&label);
            }
        }

        let last = self.slots.len() - 1;
        if slot != last {
            self.vectors
                .copy_within(last * self.dim..(last + 1) * self.dim, slot * self.dim);
            self.slots.swap(slot, last);
            self.positions.insert(self.slots[slot].1, slot);
        }
        self.slots.pop();
        self.vectors.truncate(last * self.dim);
        Some(label)
    }

    /// Remove every vector stored under `label`.
    pub fn delete_label(&mut self, label: Label) -> usize {
        let Some(entries) = self.labels.get(&label).cloned() else {
            return 0;
        };
        for entry in &entries {
            self.remove_entry(*entry);
        }
        debug!(label = label, removed = entries.len(), "Deleted buffered vectors");
        entries.len()
    }

    /// Exact k nearest labels.
    pub fn search(&self, query: &[T], k: usize) -> Result<QueryReply, IndexError> {
        VecSimError::check_dimension(self.dim, query.len())?;
        if k == 0 || self.slots.is_empty() {
            return Ok(QueryReply::default());
        }
        let query = self.metric.prepare(query);
        let mut reply = self.collect(&query, |_| true);
        reply.sort_by_score();
        reply.truncate(k);
        Ok(reply)
    }

    /// Every label whose best score is within `radius`.
    pub fn range(&self, query: &[T], radius: f64) -> Result<QueryReply, IndexError> {
        VecSimError::check_dimension(self.dim, query.len())?;
        let query = self.metric.prepare(query);
        let mut reply = self.collect(&query, |score| score <= radius);
        reply.sort_by_score();
        Ok(reply)
    }

    fn collect(&self, query: &[T], keep: impl Fn(f64) -> bool) -> QueryReply {
        let scored = self
            .slots
            .iter()
            .enumerate()
            .map(|(slot, (label, _))| (*label, self.metric.distance(query, self.slot_vector(slot))))
            .filter(|(_, score)| keep(*score));

        let results = if self.multi {
            let mut container = UniqueResults::new();
            scored.for_each(|(label, score)| container.emplace(label, score));
            container.into_results()
        } else {
            let mut container = DefaultResults::new();
            scored.for_each(|(label, score)| container.emplace(label, score));
            container.into_results()
        };
        QueryReply::new(results)
    }

    fn slot_vector(&self, slot: usize) -> &[T] {
        &self.vectors[slot * self.dim..(slot + 1) * self.dim]
    }
}

impl<T: VectorElement> VectorIndex<T> for FlatIndex<T> {
    fn dim(&self) -> usize {
        self.dim
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn add(&mut self, label: Label, vector: &[T]) -> Result<(), IndexError> {
        self.add_entry(label, vector).map(|_| ())
    }

    fn delete(&mut self, label: Label) -> Result<usize, IndexError> {
        Ok(self.delete_label(label))
    }

    fn top_k(
        &self,
        query: &[T],
        k: usize,
        _params: &QueryParams,
    ) -> Result<QueryReply, IndexError> {
        self.search(query, k)
    }

    fn range_query(
        &self,
        query: &[T],
        radius: f64,
        _params: &QueryParams,
    ) -> Result<QueryReply, IndexError> {
        self.range(query, radius)
    }

    fn contains(&self, label: Label) -> bool {
        self.labels.contains_key(&label)
    }

    fn info(&self) -> IndexInfo {
        IndexInfo {
            algorithm: Algorithm::BruteForce,
            data_type: T::DATA_TYPE,
            metric: self.metric,
            dim: self.dim,
            multi: self.multi,
            block_size: self.block_size,
            size: self.slots.len(),
            label_count: self.labels.len(),
            capacity: self.capacity(),
            hnsw: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_index(n: u64) -> FlatIndex<f32> {
        let mut index = FlatIndex::new(2, Metric::L2);
        for i in 0..n {
            index.add(i, &[i as f32, 0.0]).unwrap();
        }
        index
    }

    #[test]
    fn test_top_k_is_exact() {
        let index = line_index(10);
        let reply = index.search(&[4.2, 0.0], 3).unwrap();
        assert_eq!(reply.labels(), vec![4, 5, 3]);
        assert!((reply.results[0].score - 0.04).abs() < 1e-5);
    }

    #[test]
    fn test_empty_and_zero_k() {
        let index = FlatIndex::<f32>::new(2, Metric::L2);
        assert!(index.search(&[0.0, 0.0], 5).unwrap().is_empty());
        let index = line_index(3);
        assert!(index.search(&[0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = line_index(1);
        assert!(matches!(
            index.add(9, &[1.0]),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            index.search(&[], 1),
            Err(IndexError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_entries_survive_compaction() {
        let mut index = FlatIndex::<f32>::new(2, Metric::L2);
        let a = index.add_entry(1, &[1.0, 1.0]).unwrap();
        let b = index.add_entry(2, &[2.0, 2.0]).unwrap();
        let c = index.add_entry(3, &[3.0, 3.0]).unwrap();

        assert_eq!(index.remove_entry(a), Some(1));
        assert_eq!(index.remove_entry(a), None);
        assert_eq!(index.len(), 2);

        // The last slot moved into the freed one; handles still resolve.
        assert_eq!(index.get_entry(c), Some((3, &[3.0f32, 3.0][..])));
        assert_eq!(index.get_entry(b), Some((2, &[2.0f32, 2.0][..])));
        assert!(!index.contains(1));
    }

    #[test]
    fn test_single_value_overwrites() {
        let mut index = FlatIndex::<f32>::new(2, Metric::L2);
        index.add(7, &[0.0, 0.0]).unwrap();
        index.add(7, &[5.0, 5.0]).unwrap();
        assert_eq!(index.len(), 1);
        let reply = index.search(&[5.0, 5.0], 1).unwrap();
        assert_eq!(reply.results[0].label, 7);
        assert_eq!(reply.results[0].score, 0.0);
    }

    #[test]
    fn test_multi_value_dedupes_labels() {
        let mut index = FlatIndex::<f64>::new(1, Metric::L2).with_multi(true);
        index.add(1, &[0.0]).unwrap();
        index.add(1, &[1.0]).unwrap();
        index.add(2, &[2.0]).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.label_count(), 2);

        let reply = index.search(&[0.9], 10).unwrap();
        assert_eq!(reply.len(), 2);
        assert_eq!(reply.labels(), vec![1, 2]);
        assert!((reply.results[0].score - 0.01).abs() < 1e-9);

        assert_eq!(index.delete_label(1), 2);
        assert_eq!(index.len(), 1);
        assert!(index.entries_of(1).is_empty());
    }

    #[test]
    fn test_range() {
        let index = line_index(10);
        let reply = index.range(&[0.0, 0.0], 4.0).unwrap();
        assert_eq!(reply.labels(), vec![0, 1, 2]);
    }

    #[test]
    fn test_cosine_stores_normalized() {
        let mut index = FlatIndex::<f32>::new(2, Metric::Cosine);
        let entry = index.add_entry(1, &[3.0, 4.0]).unwrap();
        let (_, stored) = index.get_entry(entry).unwrap();
        assert!((stored[0] - 0.6).abs() < 1e-6);
        assert!((stored[1] - 0.8).abs() < 1e-6);

        let reply = index.search(&[30.0, 40.0], 1).unwrap();
        assert!(reply.results[0].score.abs() < 1e-6);
    }

    #[test]
    fn test_info_counts_blocks() {
        let index = line_index(3).with_block_size(2);
        let info = index.info();
        assert_eq!(info.algorithm, Algorithm::BruteForce);
        assert_eq!(info.size, 3);
        assert_eq!(info.capacity, 4);
        assert!(info.hnsw.is_none());
    }
}
