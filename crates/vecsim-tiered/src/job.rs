//! Units of background work produced by a tiered index.
//!
//! A `Job` carries a `Task` plus a non-owning reference to the index that
//! produced it. Running a job whose index has been dropped is a no-op, which
//! is how pending work gets cancelled: the owner drops the index and every
//! job still in a queue turns into `JobOutcome::Cancelled`.

use std::fmt;
use std::sync::Weak;

use serde::{Deserialize, Serialize};

use vecsim_index::EntryId;
use vecsim_types::Label;

/// Kind of maintenance a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Move one buffered vector into the graph
    Insert,
    /// Reconnect the neighborhood of one deleted graph node
    Repair,
    /// Compact every repaired node in one GC pass
    Swap,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Insert, JobKind::Repair, JobKind::Swap];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Insert => "insert",
            JobKind::Repair => "repair",
            JobKind::Swap => "swap",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job does once it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Insert { entry: EntryId, label: Label },
    /// `generation` pins the node incarnation the job was created for.
    Repair { id: u32, generation: u64 },
    Swap,
}

impl Task {
    pub fn kind(&self) -> JobKind {
        match self {
            Task::Insert { .. } => JobKind::Insert,
            Task::Repair { .. } => JobKind::Repair,
            Task::Swap => JobKind::Swap,
        }
    }
}

/// Result of running a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Completed,
    /// The job's target state was gone by the time it ran
    Skipped(String),
    /// The job ran but could not apply; shared state was left untouched
    Failed(String),
    /// The producing index no longer exists
    Cancelled,
}

/// Something that can execute tasks it produced earlier.
pub trait JobTarget: Send + Sync {
    fn execute(&self, task: Task) -> JobOutcome;
}

/// A task bound to a weak reference to its producer.
pub struct Job {
    task: Task,
    target: Weak<dyn JobTarget>,
}

impl Job {
    pub fn new(task: Task, target: Weak<dyn JobTarget>) -> Self {
        Self { task, target }
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn kind(&self) -> JobKind {
        self.task.kind()
    }

    /// Run the job once. The strong reference taken here keeps the target
    /// alive until the job finishes.
    pub fn run(self) -> JobOutcome {
        match self.target.upgrade() {
            Some(target) => target.execute(self.task),
            None => JobOutcome::Cancelled,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("task", &self.task)
            .field("live", &(self.target.strong_count() > 0))
            .finish()
    }
}
