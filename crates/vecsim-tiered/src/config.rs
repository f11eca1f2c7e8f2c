//! Tiered index and worker pool configuration.

use serde::{Deserialize, Serialize};

use vecsim_index::HnswConfig;
use vecsim_types::{Settings, TieredSettings, WriteMode};

/// Parameters of a tiered index: the graph it feeds plus buffering policy.
#[derive(Debug, Clone, PartialEq)]
pub struct TieredConfig {
    pub hnsw: HnswConfig,
    /// Buffered vectors above which writes go straight to the graph
    pub flat_buffer_limit: usize,
    /// Ready swap jobs that trigger a GC pass
    pub swap_job_threshold: usize,
    pub write_mode: WriteMode,
}

impl TieredConfig {
    pub fn new(hnsw: HnswConfig) -> Self {
        let defaults = TieredSettings::default();
        Self {
            hnsw,
            flat_buffer_limit: defaults.flat_buffer_limit,
            swap_job_threshold: defaults.swap_job_threshold,
            write_mode: defaults.write_mode,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            hnsw: HnswConfig::from_settings(settings),
            flat_buffer_limit: settings.tiered.flat_buffer_limit,
            swap_job_threshold: settings.tiered.swap_job_threshold,
            write_mode: settings.tiered.write_mode,
        }
    }

    pub fn with_flat_buffer_limit(mut self, limit: usize) -> Self {
        self.flat_buffer_limit = limit;
        self
    }

    /// Zero is treated as one: every ready node triggers a pass.
    pub fn with_swap_job_threshold(mut self, threshold: usize) -> Self {
        self.swap_job_threshold = threshold;
        self
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    pub(crate) fn gc_threshold(&self) -> usize {
        self.swap_job_threshold.max(1)
    }
}

/// Configuration for the tokio worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers pulling jobs.
    /// Defaults to 4.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Timeout in seconds for graceful shutdown.
    /// Running jobs get this long to finish before shutdown gives up on them.
    /// Defaults to 30 seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}
