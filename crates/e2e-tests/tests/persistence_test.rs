//! Save/load round trips through the factory and the tiered index.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use e2e_tests::{random_vectors, TestHarness};
use vecsim_index::{HnswIndex, VectorIndex};
use vecsim_tiered::{AnyIndex, ManualJobQueue, TieredConfig, TieredIndex};
use vecsim_types::{Algorithm, Label, Metric, QueryParams, Settings};

const DIM: usize = 8;

fn settings() -> Settings {
    let mut settings = Settings::new(Algorithm::Hnsw, DIM, Metric::Cosine);
    settings.block_size = 64;
    settings.hnsw.m = 8;
    settings.hnsw.ef_construction = 100;
    settings.hnsw.ef_runtime = 50;
    settings.hnsw.level_seed = 1234;
    settings
}

fn built_index(harness: &TestHarness) -> AnyIndex<f32> {
    let mut index = AnyIndex::from_settings(&settings(), harness.log(), None).unwrap();
    for (label, vector) in random_vectors(500, DIM, 21).iter().enumerate() {
        index.add(label as Label, vector).unwrap();
    }
    for label in (0..500u64).step_by(7) {
        index.delete(label).unwrap();
    }
    index
}

#[test]
fn test_round_trip_preserves_answers() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    let path = harness.path("graph.bin");
    let original = built_index(&harness);
    original.as_hnsw().unwrap().save(&path)?;

    let loaded = AnyIndex::<f32>::load_hnsw(&path, harness.log())?;
    assert_eq!(loaded.algorithm(), Algorithm::Hnsw);
    assert_eq!(loaded.info(), original.info());
    loaded.as_hnsw().unwrap().check_integrity()?;

    let params = QueryParams::default();
    for query in random_vectors(20, DIM, 77) {
        assert_eq!(
            loaded.top_k(&query, 10, &params)?,
            original.top_k(&query, 10, &params)?
        );
    }
    Ok(())
}

#[test]
fn test_loaded_graph_keeps_growing_identically() {
    let harness = TestHarness::new();
    let path = harness.path("graph.bin");
    let mut original = built_index(&harness);
    original.as_hnsw().unwrap().save(&path).unwrap();
    let mut loaded = AnyIndex::<f32>::load_hnsw(&path, harness.log()).unwrap();

    for (i, vector) in random_vectors(50, DIM, 33).iter().enumerate() {
        let label = 1000 + i as Label;
        original.add(label, vector).unwrap();
        loaded.add(label, vector).unwrap();
    }

    let params = QueryParams::default();
    for query in random_vectors(20, DIM, 78) {
        assert_eq!(
            loaded.top_k(&query, 5, &params).unwrap(),
            original.top_k(&query, 5, &params).unwrap()
        );
    }
}

#[test]
fn test_tiered_index_over_loaded_graph() {
    let harness = TestHarness::new();
    let path = harness.path("graph.bin");
    built_index(&harness).as_hnsw().unwrap().save(&path).unwrap();

    let graph = HnswIndex::<f32>::load(&path, harness.log()).unwrap();
    let live = graph.len();
    let config = TieredConfig::new(graph.config().clone());
    let queue = Arc::new(ManualJobQueue::new());
    let index = TieredIndex::with_graph(config, graph, queue.clone(), harness.log());

    let fresh = random_vectors(10, DIM, 90);
    for (i, vector) in fresh.iter().enumerate() {
        index.add_vector(5000 + i as Label, vector).unwrap();
    }
    assert_eq!(index.buffer_len(), 10);
    assert_eq!(queue.run_all(), 10);
    assert_eq!(index.graph_len(), live + 10);

    let reply = index.search(&fresh[3], 1, &QueryParams::default()).unwrap();
    assert_eq!(reply.labels(), vec![5003]);
    index.check_integrity().unwrap();
}

#[test]
fn test_header_errors_are_classified() -> anyhow::Result<()> {
    let harness = TestHarness::new();
    let path = harness.path("graph.bin");
    built_index(&harness).as_hnsw().unwrap().save(&path)?;
    let bytes = std::fs::read(&path)?;

    let mut future = bytes.clone();
    future[0..4].copy_from_slice(&42u32.to_le_bytes());
    let bad = harness.path("future.bin");
    std::fs::write(&bad, &future)?;
    let err = AnyIndex::<f32>::load_hnsw(&bad, harness.log()).err().unwrap();
    assert_eq!(err.to_string(), "Cannot load index: bad encoding version: 42");

    let err = AnyIndex::<f64>::load_hnsw(&path, harness.log()).err().unwrap();
    assert_eq!(
        err.to_string(),
        "Cannot load index: bad index data type: FLOAT32 (corrupted file?)"
    );

    let truncated = harness.path("truncated.bin");
    std::fs::write(&truncated, &bytes[..bytes.len() / 2])?;
    let err = AnyIndex::<f32>::load_hnsw(&truncated, harness.log()).err().unwrap();
    assert_eq!(err.to_string(), "Cannot load index: unexpected end of file");

    let err = AnyIndex::<f32>::load_hnsw(harness.path("missing.bin"), harness.log())
        .err()
        .unwrap();
    assert!(err.to_string().starts_with("Cannot open file"));
    Ok(())
}
