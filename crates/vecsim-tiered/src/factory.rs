//! Build any index kind from `Settings`.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use vecsim_index::{FlatIndex, HnswConfig, HnswIndex, IndexError, IndexInfo, VectorIndex};
use vecsim_types::{
    Algorithm, Label, LogContext, Metric, QueryParams, QueryReply, Settings, VectorElement,
};

use crate::config::TieredConfig;
use crate::error::TieredError;
use crate::queue::JobQueue;
use crate::tiered::TieredIndex;

/// One of the three index kinds behind a single `VectorIndex` face.
pub enum AnyIndex<T: VectorElement> {
    Flat(FlatIndex<T>),
    Hnsw(HnswIndex<T>),
    Tiered(Arc<TieredIndex<T>>),
}

impl<T: VectorElement> AnyIndex<T> {
    /// Build the index `settings` describe.
    ///
    /// A tiered index needs `queue`; the other kinds ignore it.
    pub fn from_settings(
        settings: &Settings,
        log: LogContext,
        queue: Option<Arc<dyn JobQueue>>,
    ) -> Result<Self, TieredError> {
        settings.validate()?;
        if settings.data_type != T::DATA_TYPE {
            return Err(TieredError::DataTypeMismatch {
                configured: settings.data_type.as_str(),
                stored: T::DATA_TYPE.as_str(),
            });
        }

        let index = match settings.algorithm {
            Algorithm::BruteForce => AnyIndex::Flat(
                FlatIndex::new(settings.dim, settings.metric)
                    .with_multi(settings.multi)
                    .with_block_size(settings.block_size),
            ),
            Algorithm::Hnsw => {
                AnyIndex::Hnsw(HnswIndex::new(HnswConfig::from_settings(settings), log)?)
            }
            Algorithm::Tiered => {
                let queue = queue.ok_or(TieredError::MissingQueue)?;
                AnyIndex::Tiered(TieredIndex::new(
                    TieredConfig::from_settings(settings),
                    queue,
                    log,
                )?)
            }
        };
        info!(
            algorithm = settings.algorithm.as_str(),
            dim = settings.dim,
            metric = %settings.metric,
            "Created index"
        );
        Ok(index)
    }

    /// Load a saved HNSW graph.
    pub fn load_hnsw(path: impl AsRef<Path>, log: LogContext) -> Result<Self, TieredError> {
        Ok(AnyIndex::Hnsw(HnswIndex::load(path, log)?))
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            AnyIndex::Flat(_) => Algorithm::BruteForce,
            AnyIndex::Hnsw(_) => Algorithm::Hnsw,
            AnyIndex::Tiered(_) => Algorithm::Tiered,
        }
    }

    pub fn as_tiered(&self) -> Option<&Arc<TieredIndex<T>>> {
        match self {
            AnyIndex::Tiered(index) => Some(index),
            _ => None,
        }
    }

    pub fn as_hnsw(&self) -> Option<&HnswIndex<T>> {
        match self {
            AnyIndex::Hnsw(index) => Some(index),
            _ => None,
        }
    }
}

impl<T: VectorElement> VectorIndex<T> for AnyIndex<T> {
    fn dim(&self) -> usize {
        match self {
            AnyIndex::Flat(index) => index.dim(),
            AnyIndex::Hnsw(index) => VectorIndex::dim(index),
            AnyIndex::Tiered(index) => index.dim(),
        }
    }

    fn metric(&self) -> Metric {
        match self {
            AnyIndex::Flat(index) => index.metric(),
            AnyIndex::Hnsw(index) => VectorIndex::metric(index),
            AnyIndex::Tiered(index) => index.metric(),
        }
    }

    fn len(&self) -> usize {
        match self {
            AnyIndex::Flat(index) => VectorIndex::len(index),
            AnyIndex::Hnsw(index) => VectorIndex::len(index),
            AnyIndex::Tiered(index) => VectorIndex::len(index.as_ref()),
        }
    }

    fn add(&mut self, label: Label, vector: &[T]) -> Result<(), IndexError> {
        match self {
            AnyIndex::Flat(index) => index.add(label, vector),
            AnyIndex::Hnsw(index) => index.add(label, vector),
            AnyIndex::Tiered(index) => index.add_vector(label, vector),
        }
    }

    fn delete(&mut self, label: Label) -> Result<usize, IndexError> {
        match self {
            AnyIndex::Flat(index) => index.delete(label),
            AnyIndex::Hnsw(index) => index.delete(label),
            AnyIndex::Tiered(index) => index.delete_vector(label),
        }
    }

    fn top_k(&self, query: &[T], k: usize, params: &QueryParams) -> Result<QueryReply, IndexError> {
        match self {
            AnyIndex::Flat(index) => index.top_k(query, k, params),
            AnyIndex::Hnsw(index) => index.top_k(query, k, params),
            AnyIndex::Tiered(index) => index.search(query, k, params),
        }
    }

    fn range_query(
        &self,
        query: &[T],
        radius: f64,
        params: &QueryParams,
    ) -> Result<QueryReply, IndexError> {
        match self {
            AnyIndex::Flat(index) => index.range_query(query, radius, params),
            AnyIndex::Hnsw(index) => index.range_query(query, radius, params),
            AnyIndex::Tiered(index) => index.range(query, radius, params),
        }
    }

    fn contains(&self, label: Label) -> bool {
        match self {
            AnyIndex::Flat(index) => index.contains(label),
            AnyIndex::Hnsw(index) => index.contains(label),
            AnyIndex::Tiered(index) => index.contains(label),
        }
    }

    fn info(&self) -> IndexInfo {
        match self {
            AnyIndex::Flat(index) => index.info(),
            AnyIndex::Hnsw(index) => index.info(),
            AnyIndex::Tiered(index) => VectorIndex::info(index.as_ref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ManualJobQueue;
    use vecsim_types::DataType;

    fn settings(algorithm: Algorithm) -> Settings {
        let mut settings = Settings::new(algorithm, 3, Metric::L2);
        settings.block_size = 8;
        settings
    }

    #[test]
    fn test_builds_each_kind() {
        for algorithm in [Algorithm::BruteForce, Algorithm::Hnsw, Algorithm::Tiered] {
            let queue: Arc<dyn JobQueue> = Arc::new(ManualJobQueue::new());
            let mut index =
                AnyIndex::<f32>::from_settings(&settings(algorithm), LogContext::new(), Some(queue))
                    .unwrap();
            assert_eq!(index.algorithm(), algorithm);
            assert_eq!(index.info().algorithm, algorithm);

            index.add(1, &[0.0, 0.0, 0.0]).unwrap();
            index.add(2, &[1.0, 1.0, 1.0]).unwrap();
            assert_eq!(index.len(), 2);
            let reply = index.top_k(&[0.9, 0.9, 0.9], 1, &QueryParams::default()).unwrap();
            assert_eq!(reply.labels(), vec![2]);
            assert_eq!(index.delete(1).unwrap(), 1);
            assert!(!index.contains(1));
        }
    }

    #[test]
    fn test_tiered_requires_queue() {
        let result =
            AnyIndex::<f32>::from_settings(&settings(Algorithm::Tiered), LogContext::new(), None);
        assert!(matches!(result, Err(TieredError::MissingQueue)));
    }

    #[test]
    fn test_rejects_wrong_element_type() {
        let mut settings = settings(Algorithm::Hnsw);
        settings.data_type = DataType::Float64;
        let result = AnyIndex::<f32>::from_settings(&settings, LogContext::new(), None);
        assert!(matches!(result, Err(TieredError::DataTypeMismatch { .. })));
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let mut settings = settings(Algorithm::BruteForce);
        settings.dim = 0;
        let result = AnyIndex::<f32>::from_settings(&settings, LogContext::new(), None);
        assert!(matches!(result, Err(TieredError::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = AnyIndex::<f32>::load_hnsw("/nonexistent/graph.bin", LogContext::new());
        match result {
            Err(TieredError::Index(IndexError::Load(e))) => {
                assert!(e.to_string().starts_with("Cannot open file"))
            }
            _ => panic!("expected load error"),
        }
    }
}
