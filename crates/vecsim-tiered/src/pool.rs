//! Tokio worker pool executing jobs from an mpsc channel.
//!
//! Jobs take std locks and can run for a while, so each one is moved onto the
//! blocking thread pool. Shutdown is signalled through a `CancellationToken`:
//! workers finish the job they hold and exit. Jobs still in the channel are
//! dropped without running and no longer count as in flight.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WorkerPoolConfig;
use crate::error::TieredError;
use crate::job::{Job, JobOutcome};
use crate::queue::JobQueue;

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Sending half of a worker pool.
#[derive(Clone)]
pub struct ChannelJobQueue {
    sender: UnboundedSender<Job>,
    in_flight: Arc<InFlight>,
}

impl ChannelJobQueue {
    /// Jobs submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait until every submitted job has finished, including jobs those
    /// jobs submitted.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.in_flight.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            idle.await;
        }
    }
}

impl JobQueue for ChannelJobQueue {
    fn submit(&self, job: Job) {
        self.in_flight.count.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.sender.send(job) {
            warn!(kind = %e.0.kind(), "Worker pool closed, dropping job");
            self.in_flight.finish();
        }
    }
}

/// Fixed set of tokio tasks draining a `ChannelJobQueue`.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    handles: Vec<JoinHandle<()>>,
    shutdown_token: CancellationToken,
}

impl WorkerPool {
    /// Spawn the workers on the current runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: WorkerPoolConfig) -> (ChannelJobQueue, WorkerPool) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let in_flight = Arc::new(InFlight::default());
        let shutdown_token = CancellationToken::new();

        let workers = config.workers.max(1);
        let handles = (0..workers)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    receiver.clone(),
                    in_flight.clone(),
                    shutdown_token.clone(),
                ))
            })
            .collect();
        info!(workers = workers, "Worker pool started");

        let queue = ChannelJobQueue { sender, in_flight };
        let pool = WorkerPool {
            config,
            handles,
            shutdown_token,
        };
        (queue, pool)
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown_token.is_cancelled()
    }

    /// Token cancelled when the pool shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Stop the workers and wait for them to exit.
    ///
    /// # Errors
    ///
    /// Returns `TieredError::NotRunning` if already shut down, and
    /// `TieredError::ShutdownTimeout` if a running job outlives the timeout.
    pub async fn shutdown(&mut self) -> Result<(), TieredError> {
        if self.shutdown_token.is_cancelled() {
            return Err(TieredError::NotRunning);
        }

        info!("Initiating worker pool shutdown");
        self.shutdown_token.cancel();

        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        let handles = std::mem::take(&mut self.handles);
        let joined = tokio::time::timeout(timeout, async move {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("Worker exited abnormally: {}", e);
                }
            }
        })
        .await;
        if joined.is_err() {
            return Err(TieredError::ShutdownTimeout(self.config.shutdown_timeout_secs));
        }

        info!("Worker pool shutdown complete");
        Ok(())
    }
}

async fn worker_loop(
    worker: usize,
    receiver: Arc<Mutex<UnboundedReceiver<Job>>>,
    in_flight: Arc<InFlight>,
    shutdown_token: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown_token.cancelled() => break,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = next else { break };

        let kind = job.kind();
        let start = Instant::now();
        match tokio::task::spawn_blocking(move || job.run()).await {
            Ok(JobOutcome::Failed(reason)) => {
                warn!(worker = worker, kind = %kind, reason = %reason, "Job failed");
            }
            Ok(outcome) => {
                debug!(
                    worker = worker,
                    kind = %kind,
                    outcome = ?outcome,
                    duration_us = start.elapsed().as_micros() as u64,
                    "Job finished"
                );
            }
            Err(e) => warn!(worker = worker, kind = %kind, "Job panicked: {}", e),
        }
        in_flight.finish();
    }

    let mut receiver = receiver.lock().await;
    receiver.close();
    let mut dropped = 0usize;
    while let Ok(job) = receiver.try_recv() {
        drop(job);
        in_flight.finish();
        dropped += 1;
    }
    debug!(worker = worker, dropped = dropped, "Worker stopped");
}
