//! Concurrent tiered workload driven by the tokio worker pool.
//!
//! Writers, deleters and readers run on blocking threads while the pool
//! absorbs buffered vectors and repairs deleted nodes in the background.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use e2e_tests::{exact_index, random_vectors, recall_at_k, TestHarness};
use vecsim_index::HnswConfig;
use vecsim_tiered::{JobKind, JobQueue, TieredConfig, TieredIndex, WorkerPool, WorkerPoolConfig};
use vecsim_types::{Label, Metric, QueryParams};

const DIM: usize = 16;

fn config() -> TieredConfig {
    TieredConfig::new(
        HnswConfig::new(DIM, Metric::L2)
            .with_m(16)
            .with_ef(200, 128)
            .with_block_size(128),
    )
    .with_flat_buffer_limit(512)
    .with_swap_job_threshold(16)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_deletes_and_queries() {
    let harness = TestHarness::new();
    let (queue, mut pool) = WorkerPool::start(WorkerPoolConfig::default().with_workers(4));
    let jobs: Arc<dyn JobQueue> = Arc::new(queue.clone());
    let index = TieredIndex::<f32>::new(config(), jobs, harness.log()).unwrap();

    let vectors = Arc::new(random_vectors(2000, DIM, 11));

    // Four writers, each owning a quarter of the labels.
    let mut writers = Vec::new();
    for w in 0..4usize {
        let index = index.clone();
        let vectors = vectors.clone();
        writers.push(tokio::task::spawn_blocking(move || {
            for label in (w..2000).step_by(4) {
                index.add_vector(label as Label, &vectors[label]).unwrap();
            }
        }));
    }
    // A reader querying while the tiers shift underneath it.
    let reader = {
        let index = index.clone();
        let vectors = vectors.clone();
        tokio::task::spawn_blocking(move || {
            for query in vectors.iter().take(200) {
                let reply = index.search(query, 5, &QueryParams::default()).unwrap();
                let labels = reply.labels();
                let mut unique = labels.clone();
                unique.sort_unstable();
                unique.dedup();
                assert_eq!(unique.len(), labels.len(), "duplicate label in {labels:?}");
            }
        })
    };
    for writer in writers {
        writer.await.unwrap();
    }
    reader.await.unwrap();

    // Delete every tenth label.
    let deleter = {
        let index = index.clone();
        tokio::task::spawn_blocking(move || {
            for label in (0..2000u64).step_by(10) {
                assert_eq!(index.delete_vector(label).unwrap(), 1);
            }
        })
    };
    deleter.await.unwrap();

    queue.wait_idle().await;
    index.run_gc();

    let info = index.tiered_info();
    assert_eq!(info.index.size, 1800);
    assert_eq!(info.frontend.size, 0);
    assert_eq!(info.pending_repair_jobs, 0);
    assert_eq!(info.ready_swap_jobs, 0);
    assert_eq!(info.backend.hnsw.as_ref().unwrap().marked_deleted, 0);
    index.check_integrity().unwrap();

    let inserts = index.registry().get_status(JobKind::Insert);
    assert_eq!(inserts.submitted, inserts.completed + inserts.skipped);
    assert_eq!(inserts.failed, 0);

    let survivors: Vec<(Label, Vec<f32>)> = (0..2000usize)
        .filter(|label| label % 10 != 0)
        .map(|label| (label as Label, vectors[label].clone()))
        .collect();
    let truth = exact_index(DIM, Metric::L2, &survivors);
    let queries = random_vectors(50, DIM, 99);
    let recall = recall_at_k(index.as_ref(), &truth, &queries, 10);
    assert!(recall >= 0.9, "recall {recall}");

    pool.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropping_index_cancels_queued_work() {
    let harness = TestHarness::new();
    let (queue, mut pool) = WorkerPool::start(WorkerPoolConfig::default().with_workers(1));
    let jobs: Arc<dyn JobQueue> = Arc::new(queue.clone());
    let index = TieredIndex::<f32>::new(config(), jobs, harness.log()).unwrap();

    let vectors = random_vectors(300, DIM, 5);
    for (label, vector) in vectors.iter().enumerate() {
        index.add_vector(label as Label, vector).unwrap();
    }
    drop(index);

    // Whatever had not started yet finds no index and returns at once.
    queue.wait_idle().await;
    assert_eq!(queue.in_flight(), 0);
    pool.shutdown().await.unwrap();
}
