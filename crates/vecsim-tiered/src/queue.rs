//! Job executor boundary.
//!
//! A tiered index never runs its own jobs. It hands them to a `JobQueue`,
//! which must run each job at most once, in any order, on any thread.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::job::{Job, JobKind, JobOutcome};

/// Sink for jobs produced by a tiered index.
pub trait JobQueue: Send + Sync {
    fn submit(&self, job: Job);
}

/// FIFO queue that only runs jobs when the caller asks.
///
/// Useful for hosts that drive maintenance from their own loop and for tests
/// that need a deterministic interleaving of writes and jobs.
#[derive(Debug, Default)]
pub struct ManualJobQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl ManualJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kinds of the queued jobs, front first.
    pub fn kinds(&self) -> Vec<JobKind> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Job::kind)
            .collect()
    }

    /// Run the oldest job. Jobs it submits are queued behind the rest.
    pub fn run_next(&self) -> Option<JobOutcome> {
        let job = self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()?;
        Some(job.run())
    }

    /// Run jobs until the queue is empty, including jobs submitted meanwhile.
    /// Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next().is_some() {
            ran += 1;
        }
        ran
    }

    /// Drop every queued job without running it.
    pub fn clear(&self) -> usize {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = jobs.len();
        jobs.clear();
        dropped
    }
}

impl JobQueue for ManualJobQueue {
    fn submit(&self, job: Job) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobTarget, Task};
    use std::sync::{Arc, Weak};

    /// Records task order and resubmits one follow-up for every repair.
    struct Recorder {
        seen: Mutex<Vec<Task>>,
        queue: Arc<ManualJobQueue>,
        me: Weak<Recorder>,
    }

    impl JobTarget for Recorder {
        fn execute(&self, task: Task) -> JobOutcome {
            self.seen.lock().unwrap().push(task);
            if let Task::Repair { .. } = task {
                let me: Weak<dyn JobTarget> = self.me.clone();
                self.queue.submit(Job::new(Task::Swap, me));
            }
            JobOutcome::Completed
        }
    }

    fn recorder(queue: &Arc<ManualJobQueue>) -> Arc<Recorder> {
        Arc::new_cyclic(|me| Recorder {
            seen: Mutex::new(Vec::new()),
            queue: queue.clone(),
            me: me.clone(),
        })
    }

    #[test]
    fn test_runs_in_fifo_order() {
        let queue = Arc::new(ManualJobQueue::new());
        let target = recorder(&queue);
        let weak = Arc::downgrade(&target);
        let weak: Weak<dyn JobTarget> = weak;
        queue.submit(Job::new(Task::Repair { id: 1, generation: 0 }, weak.clone()));
        queue.submit(Job::new(Task::Repair { id: 2, generation: 0 }, weak));
        assert_eq!(queue.kinds(), vec![JobKind::Repair, JobKind::Repair]);

        assert_eq!(queue.run_all(), 4);
        assert!(queue.is_empty());
        let seen = target.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                Task::Repair { id: 1, generation: 0 },
                Task::Repair { id: 2, generation: 0 },
                Task::Swap,
                Task::Swap,
            ]
        );
    }

    #[test]
    fn test_run_next_on_empty() {
        let queue = ManualJobQueue::new();
        assert!(queue.run_next().is_none());
        assert_eq!(queue.run_all(), 0);
    }

    #[test]
    fn test_cleared_jobs_never_run() {
        let queue = Arc::new(ManualJobQueue::new());
        let target = recorder(&queue);
        let weak = Arc::downgrade(&target);
        let weak: Weak<dyn JobTarget> = weak;
        queue.submit(Job::new(Task::Swap, weak));
        assert_eq!(queue.clear(), 1);
        assert_eq!(queue.run_all(), 0);
        assert!(target.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dropped_target_cancels() {
        let queue = Arc::new(ManualJobQueue::new());
        let target = recorder(&queue);
        let weak = Arc::downgrade(&target);
        let weak: Weak<dyn JobTarget> = weak;
        queue.submit(Job::new(Task::Swap, weak));
        drop(target);
        assert_eq!(queue.run_next(), Some(JobOutcome::Cancelled));
    }
}
