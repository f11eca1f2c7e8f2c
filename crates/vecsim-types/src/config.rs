//! Configuration loading for vecsim indexes.
//!
//! Layered config: built-in defaults -> optional config file -> env vars.
//! Environment variables use the `VECSIM` prefix and `__` between nesting
//! levels, e.g. `VECSIM_DIM=128` or `VECSIM_HNSW__M=32`.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::element::{Algorithm, DataType};
use crate::error::VecSimError;
use crate::metric::Metric;
use crate::DEFAULT_BLOCK_SIZE;

/// Graph construction and search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswSettings {
    /// Max neighbors per node on layers above 0 (layer 0 allows 2*M)
    #[serde(default = "default_m")]
    pub m: usize,

    /// Beam width while inserting
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    /// Default beam width while querying
    #[serde(default = "default_ef_runtime")]
    pub ef_runtime: usize,

    /// Range-query boundary expansion factor
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// Seed for the layer-assignment draw
    #[serde(default = "default_level_seed")]
    pub level_seed: u64,
}

fn default_m() -> usize {
    16
}

fn default_ef_construction() -> usize {
    200
}

fn default_ef_runtime() -> usize {
    10
}

fn default_epsilon() -> f64 {
    0.01
}

fn default_level_seed() -> u64 {
    100
}

impl Default for HnswSettings {
    fn default() -> Self {
        Self {
            m: default_m(),
            ef_construction: default_ef_construction(),
            ef_runtime: default_ef_runtime(),
            epsilon: default_epsilon(),
            level_seed: default_level_seed(),
        }
    }
}

/// Where tiered writes land.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Buffer first, absorb into the graph from a background job
    #[default]
    Async,
    /// Insert straight into the graph on the caller's thread
    InPlace,
}

/// Tiered coordinator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieredSettings {
    /// Buffered vectors above which writes go straight to the graph
    #[serde(default = "default_flat_buffer_limit")]
    pub flat_buffer_limit: usize,

    /// Ready swap jobs that trigger a GC pass
    #[serde(default = "default_swap_job_threshold")]
    pub swap_job_threshold: usize,

    #[serde(default)]
    pub write_mode: WriteMode,
}

fn default_flat_buffer_limit() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_swap_job_threshold() -> usize {
    DEFAULT_BLOCK_SIZE
}

impl Default for TieredSettings {
    fn default() -> Self {
        Self {
            flat_buffer_limit: default_flat_buffer_limit(),
            swap_job_threshold: default_swap_job_threshold(),
            write_mode: WriteMode::default(),
        }
    }
}

/// Main index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Which index kind to build
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Element width of stored vectors
    #[serde(default)]
    pub data_type: DataType,

    /// Vector dimension
    #[serde(default)]
    pub dim: usize,

    #[serde(default)]
    pub metric: Metric,

    /// Allow several vectors per label
    #[serde(default)]
    pub multi: bool,

    /// Vectors per storage block
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    #[serde(default)]
    pub hnsw: HnswSettings,

    #[serde(default)]
    pub tiered: TieredSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            data_type: DataType::default(),
            dim: 0,
            metric: Metric::default(),
            multi: false,
            block_size: default_block_size(),
            hnsw: HnswSettings::default(),
            tiered: TieredSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Settings for a `dim`-dimensional index with every other field defaulted.
    pub fn new(algorithm: Algorithm, dim: usize, metric: Metric) -> Self {
        Self {
            algorithm,
            dim,
            metric,
            ..Default::default()
        }
    }

    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (optional)
    /// 3. Environment variables (VECSIM_*)
    pub fn load(config_path: Option<&str>) -> Result<Self, VecSimError> {
        let mut builder = Config::builder()
            .set_default("block_size", default_block_size() as i64)
            .map_err(|e| VecSimError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| VecSimError::Config(e.to_string()))?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("VECSIM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| VecSimError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| VecSimError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), VecSimError> {
        let fail = |msg: String| Err(VecSimError::Config(msg));
        if self.dim == 0 {
            return fail("dim must be > 0".to_string());
        }
        if self.block_size == 0 {
            return fail("block_size must be > 0".to_string());
        }
        if self.hnsw.m < 2 {
            return fail(format!("hnsw.m must be >= 2, got {}", self.hnsw.m));
        }
        if self.hnsw.ef_construction == 0 || self.hnsw.ef_runtime == 0 {
            return fail("hnsw ef values must be > 0".to_string());
        }
        if self.hnsw.epsilon.is_nan() || self.hnsw.epsilon < 0.0 {
            return fail(format!(
                "hnsw.epsilon must be >= 0, got {}",
                self.hnsw.epsilon
            ));
        }
        if self.tiered.swap_job_threshold == 0 {
            return fail("tiered.swap_job_threshold must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.algorithm, Algorithm::Hnsw);
        assert_eq!(settings.block_size, 1024);
        assert_eq!(settings.hnsw.m, 16);
        assert_eq!(settings.hnsw.ef_construction, 200);
        assert_eq!(settings.tiered.write_mode, WriteMode::Async);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_validate() {
        assert!(Settings::default().validate().is_err());

        let settings = Settings::new(Algorithm::Tiered, 4, Metric::L2);
        assert!(settings.validate().is_ok());

        let mut bad = settings.clone();
        bad.hnsw.m = 1;
        assert!(bad.validate().is_err());

        let mut bad = settings;
        bad.tiered.swap_job_threshold = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"algorithm": "tiered", "dim": 32, "metric": "cosine", "hnsw": {{"m": 8}}}}"#
        )
        .unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.algorithm, Algorithm::Tiered);
        assert_eq!(settings.dim, 32);
        assert_eq!(settings.metric, Metric::Cosine);
        assert_eq!(settings.hnsw.m, 8);
        assert_eq!(settings.hnsw.ef_construction, 200);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Settings::load(Some("/nonexistent/vecsim-config")).is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let settings = Settings::new(Algorithm::BruteForce, 16, Metric::InnerProduct);
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.algorithm, Algorithm::BruteForce);
        assert_eq!(parsed.metric, Metric::InnerProduct);
        assert_eq!(parsed.dim, 16);
    }
}
