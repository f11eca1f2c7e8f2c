//! Tiered index: a flat write buffer in front of an HNSW graph.
//!
//! Writes land in the buffer and are visible at once; an Insert job later
//! moves each buffered vector into the graph. Deleting a graph vector only
//! marks it: a Repair job reconnects its neighborhood, and once enough
//! repaired nodes are ready a single GC pass swaps them all out.
//!
//! Locks are always taken in the order buffer, graph, GC state. Jobs are
//! submitted only after every lock is released, so a queue that runs jobs
//! inline cannot deadlock.

use std::collections::HashSet;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, trace};

use vecsim_index::{EntryId, FlatIndex, HnswIndex, IndexError, IndexInfo, VectorIndex};
use vecsim_types::{
    Algorithm, Label, LogContext, Metric, QueryParams, QueryReply, VecSimError, VectorElement,
    WriteMode,
};

use crate::config::TieredConfig;
use crate::job::{Job, JobKind, JobOutcome, JobTarget, Task};
use crate::queue::JobQueue;
use crate::registry::{JobRegistry, JobStatus};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Bookkeeping for deleted graph nodes.
#[derive(Debug, Default)]
struct GcState {
    /// Deleted and isolated nodes waiting for the next GC pass
    ready: Vec<u32>,
    /// Repair jobs submitted but not yet run
    pending_repairs: usize,
    /// A Swap job is queued and has not run yet
    swap_scheduled: bool,
    gc_passes: u64,
}

/// Jobs and GC owed by a write or delete.
#[derive(Debug, Default)]
struct Followup {
    repairs: Vec<Task>,
    insert: Option<Task>,
    run_gc: bool,
}

/// Snapshot of both tiers and of background work.
#[derive(Debug, Clone, Serialize)]
pub struct TieredInfo {
    /// Combined view, as reported through `VectorIndex::info`
    pub index: IndexInfo,
    /// The flat write buffer
    pub frontend: IndexInfo,
    /// The graph
    pub backend: IndexInfo,
    pub pending_insert_jobs: u64,
    pub pending_repair_jobs: usize,
    pub ready_swap_jobs: usize,
    pub gc_passes: u64,
    pub jobs: Vec<JobStatus>,
}

pub struct TieredIndex<T: VectorElement> {
    config: TieredConfig,
    flat: RwLock<FlatIndex<T>>,
    hnsw: RwLock<HnswIndex<T>>,
    state: Mutex<GcState>,
    queue: Arc<dyn JobQueue>,
    registry: JobRegistry,
    log: LogContext,
    me: Weak<TieredIndex<T>>,
}

impl<T: VectorElement> TieredIndex<T> {
    /// Create an empty tiered index feeding jobs to `queue`.
    pub fn new(
        config: TieredConfig,
        queue: Arc<dyn JobQueue>,
        log: LogContext,
    ) -> Result<Arc<Self>, IndexError> {
        let hnsw = HnswIndex::new(config.hnsw.clone(), log.clone())?;
        Ok(Self::with_graph(config, hnsw, queue, log))
    }

    /// Put a buffer in front of an existing graph, for example one just loaded.
    pub fn with_graph(
        mut config: TieredConfig,
        hnsw: HnswIndex<T>,
        queue: Arc<dyn JobQueue>,
        log: LogContext,
    ) -> Arc<Self> {
        config.hnsw = hnsw.config().clone();
        let flat = FlatIndex::new(config.hnsw.dim, config.hnsw.metric)
            .with_multi(config.hnsw.multi)
            .with_block_size(config.hnsw.block_size);
        debug!(
            dim = config.hnsw.dim,
            flat_buffer_limit = config.flat_buffer_limit,
            swap_job_threshold = config.swap_job_threshold,
            "Creating tiered index"
        );
        Arc::new_cyclic(|me| Self {
            config,
            flat: RwLock::new(flat),
            hnsw: RwLock::new(hnsw),
            state: Mutex::new(GcState::default()),
            queue,
            registry: JobRegistry::new(),
            log,
            me: me.clone(),
        })
    }

    pub fn config(&self) -> &TieredConfig {
        &self.config
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    fn state(&self) -> MutexGuard<'_, GcState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, task: Task) {
        let target: Weak<dyn JobTarget> = self.me.clone();
        self.registry.record_submit(task.kind());
        trace!(task = ?task, "Submitting job");
        self.queue.submit(Job::new(task, target));
    }

    /// Vectors currently held by the buffer.
    pub fn buffer_len(&self) -> usize {
        read(&self.flat).len()
    }

    /// Live vectors currently held by the graph.
    pub fn graph_len(&self) -> usize {
        read(&self.hnsw).len()
    }

    /// Deleted graph nodes waiting for a GC pass.
    pub fn ready_swap_jobs(&self) -> usize {
        self.state().ready.len()
    }

    /// Run the graph's structural check.
    pub fn check_integrity(&self) -> Result<(), IndexError> {
        read(&self.hnsw).check_integrity()
    }

    /// Store `vector` under `label`.
    ///
    /// In a single-value index any earlier vector of `label` is deleted
    /// first, under the same locks as the write.
    pub fn add_vector(&self, label: Label, vector: &[T]) -> Result<(), IndexError> {
        VecSimError::check_dimension(self.config.hnsw.dim, vector.len())?;
        let mut followup = Followup::default();
        let written = self.write_locked(label, vector, &mut followup);
        self.finish(followup);
        written
    }

    fn write_locked(
        &self,
        label: Label,
        vector: &[T],
        followup: &mut Followup,
    ) -> Result<(), IndexError> {
        let mut flat = write(&self.flat);
        let mut hnsw = write(&self.hnsw);
        if !self.config.hnsw.multi {
            self.remove_locked(&mut flat, &mut hnsw, label, followup)?;
        }

        let direct = self.config.write_mode == WriteMode::InPlace
            || flat.len() >= self.config.flat_buffer_limit;
        if direct {
            hnsw.ensure_capacity();
            hnsw.insert(label, vector)?;
        } else {
            let entry = flat.add_entry(label, vector)?;
            followup.insert = Some(Task::Insert { entry, label });
        }
        Ok(())
    }

    /// Delete every vector of `label` from both tiers.
    ///
    /// Buffered vectors go at once. Graph vectors are marked deleted and
    /// queued for repair; nodes with no edges are ready for GC right away.
    pub fn delete_vector(&self, label: Label) -> Result<usize, IndexError> {
        let mut followup = Followup::default();
        let removed = {
            let mut flat = write(&self.flat);
            let mut hnsw = write(&self.hnsw);
            self.remove_locked(&mut flat, &mut hnsw, label, &mut followup)
        };
        self.finish(followup);
        removed
    }

    /// Remove `label` while the caller holds both tier locks.
    ///
    /// Every node marked before an error still has its repair recorded in
    /// `followup`.
    fn remove_locked(
        &self,
        flat: &mut FlatIndex<T>,
        hnsw: &mut HnswIndex<T>,
        label: Label,
        followup: &mut Followup,
    ) -> Result<usize, IndexError> {
        let mut removed = flat.delete_label(label);
        let ids = hnsw.ids_of(label).to_vec();
        let mut state = self.state();
        for id in ids {
            hnsw.mark_deleted(id)?;
            removed += 1;
            if hnsw.is_isolated(id) {
                state.ready.push(id);
            } else if let Some(generation) = hnsw.generation_of(id) {
                state.pending_repairs += 1;
                followup.repairs.push(Task::Repair { id, generation });
            }
            followup.run_gc = state.ready.len() >= self.config.gc_threshold();
        }
        Ok(removed)
    }

    /// Submit the jobs a write or delete produced, once no lock is held.
    fn finish(&self, followup: Followup) {
        for task in followup.repairs.into_iter().chain(followup.insert) {
            self.submit(task);
        }
        if followup.run_gc {
            self.run_gc();
        }
    }

    /// The `k` nearest labels across both tiers.
    pub fn search(&self, query: &[T], k: usize, params: &QueryParams) -> Result<QueryReply, IndexError> {
        VecSimError::check_dimension(self.config.hnsw.dim, query.len())?;
        let ef = params
            .ef_runtime
            .unwrap_or(self.config.hnsw.ef_runtime)
            .max(k);
        // The buffer stays read-locked so no vector can move between tiers mid-query.
        let flat = read(&self.flat);
        let hnsw = read(&self.hnsw);
        let buffered = flat.search(query, k)?;
        let graph = hnsw.search(query, k, ef)?;
        Ok(merge(buffered, graph, Some(k)))
    }

    /// Every label within `radius` across both tiers, sorted by score.
    pub fn range(&self, query: &[T], radius: f64, params: &QueryParams) -> Result<QueryReply, IndexError> {
        let epsilon = params.epsilon.unwrap_or(self.config.hnsw.epsilon);
        let flat = read(&self.flat);
        let hnsw = read(&self.hnsw);
        let buffered = flat.range(query, radius)?;
        let graph = hnsw.range_search(query, radius, epsilon)?;
        Ok(merge(buffered, graph, None))
    }

    /// Move one buffered vector into the graph.
    fn absorb(&self, entry: EntryId, label: Label) -> JobOutcome {
        let mut flat = write(&self.flat);
        let vector = match flat.get_entry(entry) {
            Some((_, vector)) => vector.to_vec(),
            None => return JobOutcome::Skipped(format!("entry for label {} already removed", label)),
        };

        let mut hnsw = write(&self.hnsw);
        hnsw.ensure_capacity();
        match hnsw.insert(label, &vector) {
            Ok(id) => {
                flat.remove_entry(entry);
                trace!(label = label, id = id, "Absorbed buffered vector");
                JobOutcome::Completed
            }
            Err(e) => JobOutcome::Failed(e.to_string()),
        }
    }

    /// Reconnect around one deleted node and queue a GC pass if enough are ready.
    fn repair_node(&self, id: u32, generation: u64) -> JobOutcome {
        let schedule_swap = {
            let mut hnsw = write(&self.hnsw);
            let mut state = self.state();
            state.pending_repairs = state.pending_repairs.saturating_sub(1);

            if hnsw.generation_of(id) != Some(generation) || !hnsw.is_marked_deleted(id) {
                return JobOutcome::Skipped(format!("node {} no longer pending repair", id));
            }
            if let Err(e) = hnsw.repair(id) {
                return JobOutcome::Failed(e.to_string());
            }
            state.ready.push(id);

            let due = state.ready.len() >= self.config.gc_threshold() && !state.swap_scheduled;
            if due {
                state.swap_scheduled = true;
            }
            due
        };

        if schedule_swap {
            self.submit(Task::Swap);
        }
        JobOutcome::Completed
    }

    /// Swap out every ready node in one pass. Returns how many were removed.
    ///
    /// A ready node is kept for a later pass when the last slot still holds
    /// a node waiting for repair.
    pub fn run_gc(&self) -> usize {
        let mut hnsw = write(&self.hnsw);
        let mut state = self.state();
        state.swap_scheduled = false;
        if state.ready.is_empty() {
            return 0;
        }

        let count = state.ready.len();
        self.log.verbose(format_args!(
            "Tiered HNSW index GC: there are {} ready swap jobs. Start executing {} swap jobs",
            count, count
        ));

        let mut ready = std::mem::take(&mut state.ready);
        // Highest first, so no ready id is relocated before it is removed.
        ready.sort_unstable_by(|a, b| b.cmp(a));
        let mut executed = 0;
        for id in ready {
            match hnsw.swap_remove(id) {
                Ok(()) => executed += 1,
                Err(e) => {
                    debug!(id = id, error = %e, "Deferring swap");
                    state.ready.push(id);
                }
            }
        }
        hnsw.shrink_to_fit();
        state.gc_passes += 1;

        self.log.verbose(format_args!(
            "Tiered HNSW index GC: done executing {} swap jobs",
            executed
        ));
        executed
    }

    fn combined_info(&self, flat: &FlatIndex<T>, hnsw: &HnswIndex<T>) -> IndexInfo {
        let graph = hnsw.info();
        let buffered_only = flat
            .labels()
            .filter(|&label| hnsw.ids_of(label).is_empty())
            .count();
        IndexInfo {
            algorithm: Algorithm::Tiered,
            size: flat.len() + hnsw.len(),
            label_count: graph.label_count + buffered_only,
            capacity: flat.capacity() + hnsw.capacity(),
            ..graph
        }
    }

    /// Both tiers plus job counters.
    pub fn tiered_info(&self) -> TieredInfo {
        let flat = read(&self.flat);
        let hnsw = read(&self.hnsw);
        let state = self.state();
        TieredInfo {
            index: self.combined_info(&flat, &hnsw),
            frontend: flat.info(),
            backend: hnsw.info(),
            pending_insert_jobs: self.registry.pending(JobKind::Insert),
            pending_repair_jobs: state.pending_repairs,
            ready_swap_jobs: state.ready.len(),
            gc_passes: state.gc_passes,
            jobs: self.registry.get_all_status(),
        }
    }
}

/// Merge buffer and graph replies, counting each label once.
///
/// A label present in both keeps its buffer score: the buffer holds the most
/// recent write.
fn merge(buffered: QueryReply, graph: QueryReply, k: Option<usize>) -> QueryReply {
    let seen: HashSet<Label> = buffered.iter().map(|r| r.label).collect();
    let mut merged = buffered;
    for result in graph {
        if !seen.contains(&result.label) {
            merged.push(result);
        }
    }
    merged.sort_by_score();
    if let Some(k) = k {
        merged.truncate(k);
    }
    merged
}

impl<T: VectorElement> JobTarget for TieredIndex<T> {
    fn execute(&self, task: Task) -> JobOutcome {
        let kind = task.kind();
        self.registry.record_start(kind);
        let start = Instant::now();

        let outcome = match task {
            Task::Insert { entry, label } => self.absorb(entry, label),
            Task::Repair { id, generation } => self.repair_node(id, generation),
            Task::Swap => match self.run_gc() {
                0 => JobOutcome::Skipped("no ready swap jobs".to_string()),
                _ => JobOutcome::Completed,
            },
        };

        let duration_us = start.elapsed().as_micros() as u64;
        self.registry.record_complete(kind, &outcome, duration_us);
        debug!(kind = %kind, outcome = ?outcome, duration_us = duration_us, "Job executed");
        outcome
    }
}

impl<T: VectorElement> VectorIndex<T> for TieredIndex<T> {
    fn dim(&self) -> usize {
        self.config.hnsw.dim
    }

    fn metric(&self) -> Metric {
        self.config.hnsw.metric
    }

    fn len(&self) -> usize {
        let flat = read(&self.flat);
        let hnsw = read(&self.hnsw);
        flat.len() + hnsw.len()
    }

    fn add(&mut self, label: Label, vector: &[T]) -> Result<(), IndexError> {
        self.add_vector(label, vector)
    }

    fn delete(&mut self, label: Label) -> Result<usize, IndexError> {
        self.delete_vector(label)
    }

    fn top_k(&self, query: &[T], k: usize, params: &QueryParams) -> Result<QueryReply, IndexError> {
        self.search(query, k, params)
    }

    fn range_query(
        &self,
        query: &[T],
        radius: f64,
        params: &QueryParams,
    ) -> Result<QueryReply, IndexError> {
        self.range(query, radius, params)
    }

    fn contains(&self, label: Label) -> bool {
        let flat = read(&self.flat);
        let hnsw = read(&self.hnsw);
        flat.contains(label) || hnsw.contains(label)
    }

    fn info(&self) -> IndexInfo {
        let flat = read(&self.flat);
        let hnsw = read(&self.hnsw);
        self.combined_info(&flat, &hnsw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ManualJobQueue;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use vecsim_index::HnswConfig;
    use vecsim_types::{MemorySink, QueryResult};

    fn setup(config: TieredConfig) -> (Arc<TieredIndex<f32>>, Arc<ManualJobQueue>) {
        let queue = Arc::new(ManualJobQueue::new());
        let index = TieredIndex::new(config, queue.clone(), LogContext::new()).unwrap();
        (index, queue)
    }

    fn small_config(dim: usize) -> TieredConfig {
        TieredConfig::new(
            HnswConfig::new(dim, Metric::L2)
                .with_m(8)
                .with_ef(64, 32)
                .with_block_size(16),
        )
    }

    fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect())
            .collect()
    }

    #[test]
    fn test_gc_log_lines() {
        let sink = Arc::new(MemorySink::new("tiered: "));
        let queue = Arc::new(ManualJobQueue::new());
        let config = TieredConfig::new(HnswConfig::new(4, Metric::L2)).with_swap_job_threshold(1);
        let index =
            TieredIndex::<f32>::new(config, queue.clone(), LogContext::with_sink(sink.clone()))
                .unwrap();

        index.add_vector(1, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(queue.run_all(), 1);
        assert_eq!(index.delete_vector(1).unwrap(), 1);

        assert_eq!(
            sink.lines(),
            vec![
                "verbose: tiered: Updating HNSW index capacity from 0 to 1024",
                "verbose: tiered: Tiered HNSW index GC: there are 1 ready swap jobs. Start executing 1 swap jobs",
                "verbose: tiered: Updating HNSW index capacity from 1024 to 0",
                "verbose: tiered: Tiered HNSW index GC: done executing 1 swap jobs",
            ]
        );
        assert!(VectorIndex::is_empty(&*index));
    }

    #[test]
    fn test_write_visible_before_and_after_absorb() {
        let (index, queue) = setup(small_config(2));
        index.add_vector(7, &[1.0, 1.0]).unwrap();
        assert_eq!(index.buffer_len(), 1);
        assert_eq!(index.graph_len(), 0);
        assert_eq!(queue.kinds(), vec![JobKind::Insert]);

        let params = QueryParams::default();
        let before = index.search(&[1.0, 1.0], 1, &params).unwrap();
        queue.run_all();
        let after = index.search(&[1.0, 1.0], 1, &params).unwrap();

        assert_eq!(before, after);
        assert_eq!(after.results, vec![QueryResult::new(7, 0.0)]);
        assert_eq!(index.buffer_len(), 0);
        assert_eq!(index.graph_len(), 1);
        assert_eq!(VectorIndex::len(&*index), 1);
    }

    #[test]
    fn test_buffer_only_delete_needs_no_job() {
        let (index, queue) = setup(small_config(2));
        index.add_vector(1, &[0.0, 0.0]).unwrap();
        assert_eq!(index.delete_vector(1).unwrap(), 1);
        assert_eq!(index.buffer_len(), 0);

        // Only the original insert job is queued, and it finds nothing to move.
        assert_eq!(queue.kinds(), vec![JobKind::Insert]);
        assert!(matches!(queue.run_next(), Some(JobOutcome::Skipped(_))));
        assert_eq!(index.graph_len(), 0);
        assert_eq!(index.registry().get_status(JobKind::Insert).skipped, 1);
    }

    #[test]
    fn test_repairs_then_single_gc_pass() {
        let (index, queue) = setup(small_config(4).with_swap_job_threshold(5));
        let vectors = random_vectors(40, 4, 3);
        for (label, v) in vectors.iter().enumerate() {
            index.add_vector(label as Label, v).unwrap();
        }
        queue.run_all();
        assert_eq!(index.graph_len(), 40);

        for label in 0..5 {
            assert_eq!(index.delete_vector(label).unwrap(), 1);
        }
        assert_eq!(queue.kinds(), vec![JobKind::Repair; 5]);
        assert_eq!(index.graph_len(), 35);

        // Five repairs, then the one swap job the fifth repair scheduled.
        assert_eq!(queue.run_all(), 6);
        let info = index.tiered_info();
        assert_eq!(info.ready_swap_jobs, 0);
        assert_eq!(info.pending_repair_jobs, 0);
        assert_eq!(info.gc_passes, 1);
        assert_eq!(info.backend.hnsw.as_ref().unwrap().marked_deleted, 0);
        index.check_integrity().unwrap();

        let params = QueryParams::default().with_ef_runtime(64);
        for label in 5..40u64 {
            let reply = index.search(&vectors[label as usize], 1, &params).unwrap();
            assert_eq!(reply.labels(), vec![label]);
        }
    }

    #[test]
    fn test_below_threshold_keeps_nodes_ready() {
        let (index, queue) = setup(small_config(3).with_swap_job_threshold(10));
        for (label, v) in random_vectors(20, 3, 8).iter().enumerate() {
            index.add_vector(label as Label, v).unwrap();
        }
        queue.run_all();
        index.delete_vector(4).unwrap();
        index.delete_vector(9).unwrap();
        queue.run_all();

        assert_eq!(index.ready_swap_jobs(), 2);
        assert_eq!(index.tiered_info().gc_passes, 0);
        assert_eq!(index.run_gc(), 2);
        assert_eq!(index.ready_swap_jobs(), 0);
        index.check_integrity().unwrap();
    }

    #[test]
    fn test_label_in_both_tiers_counted_once() {
        let config = small_config(2);
        let config = TieredConfig {
            hnsw: config.hnsw.with_multi(true),
            ..config
        };
        let (index, queue) = setup(config);
        index.add_vector(1, &[5.0, 5.0]).unwrap();
        index.add_vector(2, &[3.0, 3.0]).unwrap();
        queue.run_all();
        index.add_vector(1, &[0.0, 1.0]).unwrap();

        let reply = index.search(&[0.0, 0.0], 3, &QueryParams::default()).unwrap();
        assert_eq!(reply.labels(), vec![1, 2]);
        assert_eq!(reply.results[0].score, 1.0);
        assert_eq!(VectorIndex::len(&*index), 3);
        assert_eq!(index.info().label_count, 2);
    }

    #[test]
    fn test_single_value_overwrite() {
        let (index, queue) = setup(small_config(2));
        index.add_vector(1, &[0.0, 0.0]).unwrap();
        index.add_vector(2, &[9.0, 9.0]).unwrap();
        queue.run_all();
        index.add_vector(1, &[5.0, 5.0]).unwrap();

        assert_eq!(VectorIndex::len(&*index), 2);
        let reply = index.search(&[5.0, 5.0], 1, &QueryParams::default()).unwrap();
        assert_eq!(reply.results, vec![QueryResult::new(1, 0.0)]);
        queue.run_all();
        assert_eq!(index.graph_len(), 2);
        index.check_integrity().unwrap();
    }

    #[test]
    fn test_full_buffer_writes_to_graph() {
        let (index, queue) = setup(small_config(2).with_flat_buffer_limit(2));
        for label in 0..3u64 {
            index.add_vector(label, &[label as f32, 0.0]).unwrap();
        }
        assert_eq!(index.buffer_len(), 2);
        assert_eq!(index.graph_len(), 1);
        assert_eq!(queue.len(), 2);
        let reply = index.search(&[2.0, 0.0], 3, &QueryParams::default()).unwrap();
        assert_eq!(reply.labels(), vec![2, 1, 0]);
    }

    #[test]
    fn test_in_place_mode_submits_no_inserts() {
        let (index, queue) = setup(small_config(2).with_write_mode(WriteMode::InPlace));
        index.add_vector(1, &[1.0, 0.0]).unwrap();
        index.add_vector(2, &[0.0, 1.0]).unwrap();
        assert!(queue.is_empty());
        assert_eq!(index.graph_len(), 2);
    }

    #[test]
    fn test_dropped_index_cancels_pending_jobs() {
        let (index, queue) = setup(small_config(2));
        index.add_vector(1, &[1.0, 0.0]).unwrap();
        drop(index);
        assert_eq!(queue.run_next(), Some(JobOutcome::Cancelled));
    }

    #[test]
    fn test_range_merges_tiers() {
        let (index, queue) = setup(small_config(2));
        index.add_vector(1, &[0.0, 0.0]).unwrap();
        index.add_vector(2, &[0.5, 0.0]).unwrap();
        queue.run_all();
        index.add_vector(3, &[0.0, 0.5]).unwrap();
        index.add_vector(4, &[4.0, 4.0]).unwrap();

        let mut reply = index.range(&[0.0, 0.0], 1.0, &QueryParams::default()).unwrap();
        reply.sort_by_label();
        assert_eq!(reply.labels(), vec![1, 2, 3]);
    }

    #[test]
    fn test_dimension_checked_up_front() {
        let (index, queue) = setup(small_config(3));
        assert!(matches!(
            index.add_vector(1, &[1.0]),
            Err(IndexError::DimensionMismatch { expected: 3, actual: 1 })
        ));
        assert!(index.search(&[1.0, 2.0], 1, &QueryParams::default()).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_info_tracks_jobs() {
        let (index, queue) = setup(small_config(2));
        index.add_vector(1, &[1.0, 0.0]).unwrap();
        index.add_vector(2, &[0.0, 1.0]).unwrap();

        let info = index.tiered_info();
        assert_eq!(info.pending_insert_jobs, 2);
        assert_eq!(info.index.algorithm, Algorithm::Tiered);
        assert_eq!(info.index.size, 2);
        assert_eq!(info.frontend.size, 2);
        assert_eq!(info.backend.size, 0);

        queue.run_all();
        let info = index.tiered_info();
        assert_eq!(info.pending_insert_jobs, 0);
        assert_eq!(info.jobs[0].completed, 2);
        assert_eq!(info.backend.size, 2);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["index"]["size"], 2);
    }

    fn absorbed(n: usize, dim: usize, threshold: usize) -> (Arc<TieredIndex<f32>>, Arc<ManualJobQueue>) {
        let (index, queue) = setup(small_config(dim).with_swap_job_threshold(threshold));
        for (label, v) in random_vectors(n, dim, 21).iter().enumerate() {
            index.add_vector(label as Label, v).unwrap();
        }
        queue.run_all();
        (index, queue)
    }

    #[test]
    fn test_gc_defers_while_last_slot_awaits_repair() {
        let (index, queue) = absorbed(10, 3, 10);
        assert_eq!(read(&index.hnsw).ids_of(9), &[9]);

        index.delete_vector(3).unwrap();
        index.delete_vector(9).unwrap();
        assert_eq!(queue.kinds(), vec![JobKind::Repair; 2]);

        // Only node 3 is repaired; node 9 still holds the last slot.
        assert_eq!(queue.run_next(), Some(JobOutcome::Completed));
        assert_eq!(index.run_gc(), 0);
        assert_eq!(index.ready_swap_jobs(), 1);
        assert!(read(&index.hnsw).is_marked_deleted(3));

        assert_eq!(queue.run_next(), Some(JobOutcome::Completed));
        assert_eq!(index.ready_swap_jobs(), 2);
        assert_eq!(index.run_gc(), 2);
        assert_eq!(index.ready_swap_jobs(), 0);
        assert_eq!(index.graph_len(), 8);
        assert_eq!(index.tiered_info().gc_passes, 2);
        index.check_integrity().unwrap();
    }

    #[test]
    fn test_stale_repair_is_skipped() {
        let (index, queue) = absorbed(10, 3, 1);
        let generation = read(&index.hnsw).generation_of(5).unwrap();

        index.delete_vector(5).unwrap();
        // The repair, then the swap it scheduled, which refills slot 5.
        assert_eq!(queue.run_all(), 2);
        assert_ne!(read(&index.hnsw).generation_of(5), Some(generation));

        let outcome = index.execute(Task::Repair { id: 5, generation });
        assert!(matches!(outcome, JobOutcome::Skipped(_)));

        // A live node is never repaired either.
        let live = read(&index.hnsw).generation_of(0).unwrap();
        let outcome = index.execute(Task::Repair { id: 0, generation: live });
        assert!(matches!(outcome, JobOutcome::Skipped(_)));

        assert_eq!(index.registry().get_status(JobKind::Repair).skipped, 2);
        assert_eq!(index.tiered_info().pending_repair_jobs, 0);
        assert_eq!(index.graph_len(), 9);
        index.check_integrity().unwrap();
    }

    #[test]
    fn test_pending_repairs_match_submitted_jobs() {
        let config = small_config(3).with_swap_job_threshold(100);
        let config = TieredConfig {
            hnsw: config.hnsw.with_multi(true),
            ..config
        };
        let (index, queue) = setup(config);
        for (i, v) in random_vectors(12, 3, 4).iter().enumerate() {
            index.add_vector((i % 4) as Label, v).unwrap();
        }
        queue.run_all();

        assert_eq!(index.delete_vector(2).unwrap(), 3);
        let queued = queue.kinds().iter().filter(|k| **k == JobKind::Repair).count();
        let info = index.tiered_info();
        assert_eq!(info.pending_repair_jobs, queued);
        assert_eq!(queued + info.ready_swap_jobs, 3);
    }

    #[test]
    fn test_concurrent_overwrites_keep_one_vector() {
        let (index, _queue) = setup(small_config(2).with_write_mode(WriteMode::InPlace));
        std::thread::scope(|scope| {
            for t in 0..2 {
                let index = &index;
                scope.spawn(move || {
                    for i in 0..200 {
                        index.add_vector(1, &[t as f32, i as f32]).unwrap();
                    }
                });
            }
        });
        assert_eq!(index.graph_len(), 1);
        assert_eq!(read(&index.hnsw).ids_of(1).len(), 1);
        assert_eq!(index.search(&[0.0, 0.0], 5, &QueryParams::default()).unwrap().len(), 1);
    }
}
