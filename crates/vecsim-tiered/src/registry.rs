//! Per-kind job accounting.
//!
//! The `JobRegistry` counts what a tiered index handed to its queue and what
//! came back, so hosts can see how far background maintenance lags behind.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobKind, JobOutcome};

/// Counters for one job kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatus {
    pub kind: JobKind,
    /// Jobs handed to the queue
    pub submitted: u64,
    /// Jobs that ran and applied their change
    pub completed: u64,
    /// Jobs that found nothing left to do
    pub skipped: u64,
    /// Jobs that ran and could not apply
    pub failed: u64,
    /// Jobs currently executing
    pub running: u64,
    /// When a job of this kind last finished
    pub last_completed: Option<DateTime<Utc>>,
    /// Duration of the last run in microseconds
    pub last_duration_us: Option<u64>,
    pub last_outcome: Option<JobOutcome>,
}

impl JobStatus {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            submitted: 0,
            completed: 0,
            skipped: 0,
            failed: 0,
            running: 0,
            last_completed: None,
            last_duration_us: None,
            last_outcome: None,
        }
    }

    /// Submitted jobs that have not finished yet.
    pub fn pending(&self) -> u64 {
        self.submitted
            .saturating_sub(self.completed + self.skipped + self.failed)
    }
}

/// Thread-safe per-kind job counters.
///
/// ```
/// use vecsim_tiered::{JobKind, JobOutcome, JobRegistry};
///
/// let registry = JobRegistry::new();
/// registry.record_submit(JobKind::Insert);
/// registry.record_start(JobKind::Insert);
/// assert!(registry.is_running(JobKind::Insert));
///
/// registry.record_complete(JobKind::Insert, &JobOutcome::Completed, 120);
/// assert_eq!(registry.pending(JobKind::Insert), 0);
/// ```
pub struct JobRegistry {
    jobs: RwLock<BTreeMap<JobKind, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        let jobs = JobKind::ALL
            .iter()
            .map(|&kind| (kind, JobStatus::new(kind)))
            .collect();
        Self {
            jobs: RwLock::new(jobs),
        }
    }

    fn update(&self, kind: JobKind, f: impl FnOnce(&mut JobStatus)) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        f(jobs.entry(kind).or_insert_with(|| JobStatus::new(kind)));
    }

    pub fn record_submit(&self, kind: JobKind) {
        self.update(kind, |s| s.submitted += 1);
    }

    pub fn record_start(&self, kind: JobKind) {
        self.update(kind, |s| s.running += 1);
    }

    /// Record a finished run. Cancelled jobs never reach the registry.
    pub fn record_complete(&self, kind: JobKind, outcome: &JobOutcome, duration_us: u64) {
        self.update(kind, |s| {
            s.running = s.running.saturating_sub(1);
            match outcome {
                JobOutcome::Completed => s.completed += 1,
                JobOutcome::Skipped(_) => s.skipped += 1,
                JobOutcome::Failed(_) => s.failed += 1,
                JobOutcome::Cancelled => {}
            }
            s.last_completed = Some(Utc::now());
            s.last_duration_us = Some(duration_us);
            s.last_outcome = Some(outcome.clone());
        });
    }

    pub fn get_status(&self, kind: JobKind) -> JobStatus {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| JobStatus::new(kind))
    }

    /// Status of every kind, in `JobKind` order.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn is_running(&self, kind: JobKind) -> bool {
        self.get_status(kind).running > 0
    }

    pub fn pending(&self, kind: JobKind) -> u64 {
        self.get_status(kind).pending()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
