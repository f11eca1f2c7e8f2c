//! End-to-end test infrastructure for the vecsim crates.
//!
//! Provides a shared TestHarness plus helpers for generating reproducible
//! vectors and measuring recall against an exact scan.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vecsim_index::{FlatIndex, VectorIndex};
use vecsim_types::{Label, LogContext, MemorySink, Metric, QueryParams};

/// Shared test harness for E2E tests.
///
/// Owns a temp directory for saved graphs and a memory log sink that every
/// index built by the test can write to.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub sink: Arc<MemorySink>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        Self {
            _temp_dir: temp_dir,
            sink: Arc::new(MemorySink::new("e2e: ")),
        }
    }

    pub fn dir(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Path for a file inside the temp directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self._temp_dir.path().join(name)
    }

    /// Log context that forwards into `self.sink`.
    pub fn log(&self) -> LogContext {
        LogContext::with_sink(self.sink.clone())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// `n` vectors with components uniform in [-1, 1), reproducible per seed.
pub fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect())
        .collect()
}

/// Exact scan over `(label, vector)` pairs, used as ground truth.
pub fn exact_index(dim: usize, metric: Metric, items: &[(Label, Vec<f32>)]) -> FlatIndex<f32> {
    let mut flat = FlatIndex::new(dim, metric);
    for (label, vector) in items {
        flat.add(*label, vector).expect("Failed to add ground truth vector");
    }
    flat
}

/// Fraction of the exact top-k labels that `index` also returns.
pub fn recall_at_k<I: VectorIndex<f32> + ?Sized>(
    index: &I,
    truth: &FlatIndex<f32>,
    queries: &[Vec<f32>],
    k: usize,
) -> f64 {
    let params = QueryParams::default();
    let mut hits = 0;
    let mut total = 0;
    for query in queries {
        let expected: HashSet<Label> = truth
            .top_k(query, k, &params)
            .expect("Ground truth query failed")
            .labels()
            .into_iter()
            .collect();
        let found = index.top_k(query, k, &params).expect("Query failed");
        hits += found.iter().filter(|r| expected.contains(&r.label)).count();
        total += expected.len();
    }
    if total == 0 {
        return 1.0;
    }
    hits as f64 / total as f64
}
