use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::scheduler::job::JobStatus;
use crate::scheduler::queue::{PendingQueue, QueueRef};
use crate::scheduler::store::JobStore;
use crate::worker::{Assignment, WorkerOutcome, WorkerPool, WorkerReport};

const RESTART_WINDOW: Duration = Duration::from_secs(60);
const MAX_RESTARTS_PER_WINDOW: usize = 5;
const INITIAL_RESTART_BACKOFF: Duration = Duration::from_millis(500);
const MAX_RESTART_BACKOFF: Duration = Duration::from_secs(10);

/// Cancellation tokens for jobs currently in flight. `cancel` fires a token
/// to reach the worker holding the job; the dispatcher registers on dispatch
/// and removes on outcome.
#[derive(Default)]
pub struct CancellationRegistry {
    tokens: RwLock<HashMap<String, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, job_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens
            .write()
            .await
            .insert(job_id.to_string(), token.clone());
        token
    }

    pub async fn fire(&self, job_id: &str) -> bool {
        match self.tokens.read().await.get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, job_id: &str) {
        self.tokens.write().await.remove(job_id);
    }

    pub async fn fire_all(&self) {
        let mut tokens = self.tokens.write().await;
        for token in tokens.values() {
            token.cancel();
        }
        tokens.clear();
    }
}

/// The single loop that pairs pending jobs with workers and drives state
/// transitions on the store. `run` wraps the loop in a supervisor that
/// restarts it with bounded backoff if it ever panics.
pub struct Dispatcher {
    store: Arc<JobStore>,
    queue: Arc<PendingQueue>,
    pool: Arc<WorkerPool>,
    cancellations: Arc<CancellationRegistry>,
    reports: mpsc::Receiver<WorkerReport>,
    poll_interval: Duration,
    capacity_backoff: Duration,
    min_workers: usize,
    shutdown: CancellationToken,
    /// Dispatch attempts are held off until this instant after the pool
    /// reported exhaustion. Outcomes keep draining while held.
    hold_until: Option<Instant>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<JobStore>,
        queue: Arc<PendingQueue>,
        pool: Arc<WorkerPool>,
        cancellations: Arc<CancellationRegistry>,
        reports: mpsc::Receiver<WorkerReport>,
        config: &ServiceConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            queue,
            pool,
            cancellations,
            reports,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            capacity_backoff: Duration::from_millis(config.capacity_backoff_ms),
            min_workers: config.min_workers,
            shutdown,
            hold_until: None,
        }
    }

    /// Supervisor: run the dispatch loop until shutdown, restarting after a
    /// panic with exponential backoff. Too many restarts within the window
    /// surface as a fatal condition instead of a hot loop.
    pub async fn run(mut self) {
        let mut restarts: Vec<Instant> = Vec::new();
        let mut backoff = INITIAL_RESTART_BACKOFF;
        loop {
            let result = AssertUnwindSafe(self.run_loop()).catch_unwind().await;
            match result {
                Ok(()) => {
                    tracing::info!("dispatcher stopped");
                    return;
                }
                Err(_) => {
                    let now = Instant::now();
                    restarts.retain(|t| now.duration_since(*t) < RESTART_WINDOW);
                    restarts.push(now);
                    if restarts.len() > MAX_RESTARTS_PER_WINDOW {
                        tracing::error!(
                            restarts = restarts.len(),
                            "dispatcher restart budget exhausted, giving up"
                        );
                        return;
                    }
                    tracing::error!(
                        backoff_ms = backoff.as_millis() as u64,
                        "dispatcher crashed, restarting"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_RESTART_BACKOFF);
                }
            }
        }
    }

    async fn run_loop(&mut self) {
        let mut tick = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.pool.shutdown().await;
                    return;
                }
                Some(report) = self.reports.recv() => {
                    self.handle_report(report).await;
                }
                _ = self.queue.notified() => {
                    self.dispatch_ready().await;
                }
                _ = tick.tick() => {
                    self.dispatch_ready().await;
                    if self.queue.is_empty().await {
                        self.pool.cleanup_idle(self.min_workers).await;
                    }
                }
            }
        }
    }

    /// Drain the queue front-to-back until it is empty, capacity runs out, or
    /// the exhaustion hold is active.
    async fn dispatch_ready(&mut self) {
        loop {
            if let Some(until) = self.hold_until {
                if Instant::now() < until {
                    return;
                }
                self.hold_until = None;
            }

            let Some(job_ref) = self.queue.pop_front().await else {
                return;
            };

            let slot = match self.pool.acquire().await {
                Ok(slot) => slot,
                Err(err) => {
                    // Pushing the reference back preserves its position: its
                    // created_at predates any concurrently enqueued peer.
                    self.queue.push(job_ref).await;
                    self.hold_until = Some(Instant::now() + self.capacity_backoff);
                    if !matches!(err, crate::error::JobqError::PoolExhausted) {
                        tracing::error!(error = %err, "worker acquisition failed");
                    }
                    return;
                }
            };

            // Claim under the per-id lock: pending -> running. A job cancelled
            // between enqueue and dispatch is observed here and dropped.
            let claimed = self
                .store
                .update(&job_ref.id, |job| {
                    if job.status == JobStatus::Pending {
                        job.status = JobStatus::Running;
                        job.started_at = Some(Utc::now());
                    }
                })
                .await;

            let job = match claimed {
                Ok(job) if job.status == JobStatus::Running => job,
                Ok(job) => {
                    tracing::debug!(job_id = %job_ref.id, status = %job.status, "dropping stale queue entry");
                    self.pool.release(slot.id).await;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(job_id = %job_ref.id, error = %err, "queued job missing from store");
                    self.pool.release(slot.id).await;
                    continue;
                }
            };

            let token = self.cancellations.register(&job.id).await;
            tracing::info!(
                job_id = %job.id,
                priority = %job.priority,
                worker_id = slot.id,
                attempt = job.retry_count + 1,
                "dispatching job"
            );
            let assignment = Assignment {
                job: job.clone(),
                cancel: token,
            };
            if let Err(err) = slot.assign(assignment).await {
                // The worker died between acquisition and hand-off. Revert the
                // claim; this is a harness fault, not a job failure.
                tracing::warn!(job_id = %job.id, error = %err, "worker rejected assignment, requeueing");
                self.cancellations.remove(&job.id).await;
                self.pool.release(slot.id).await;
                let reverted = self
                    .store
                    .update(&job.id, |j| {
                        if j.status == JobStatus::Running {
                            j.status = JobStatus::Pending;
                            j.started_at = None;
                        }
                    })
                    .await;
                if let Ok(j) = reverted {
                    if j.status == JobStatus::Pending {
                        self.queue.push(QueueRef::from(&j)).await;
                    }
                }
            }
        }
    }

    async fn handle_report(&mut self, report: WorkerReport) {
        self.pool.release(report.worker_id).await;
        self.cancellations.remove(&report.job_id).await;
        // A freed worker means capacity; drop any exhaustion hold.
        self.hold_until = None;

        let now = Utc::now();
        let updated = match report.outcome {
            WorkerOutcome::Success(output) => {
                self.store
                    .update(&report.job_id, move |job| {
                        if job.status != JobStatus::Running {
                            return;
                        }
                        job.status = JobStatus::Completed;
                        job.result = Some(output);
                        job.completed_at = Some(now);
                    })
                    .await
            }
            WorkerOutcome::Failure(reason) => {
                let logged_reason = reason.clone();
                let updated = self
                    .store
                    .update(&report.job_id, move |job| {
                        if job.status != JobStatus::Running {
                            return;
                        }
                        // The retry decision happens here, under the per-id
                        // lock: a retryable failure goes straight back to
                        // pending without ever surfacing as failed.
                        job.retry_count += 1;
                        if job.retry_count <= job.max_retries {
                            job.status = JobStatus::Pending;
                        } else {
                            job.status = JobStatus::Failed;
                            job.error = Some(reason);
                            job.completed_at = Some(now);
                        }
                    })
                    .await;
                if let Ok(job) = &updated {
                    if job.status == JobStatus::Pending {
                        tracing::info!(
                            job_id = %job.id,
                            retry_count = job.retry_count,
                            reason = %logged_reason,
                            "execution failed, retrying"
                        );
                    }
                }
                updated
            }
            WorkerOutcome::Cancelled => {
                tracing::debug!(job_id = %report.job_id, "worker observed cancellation");
                return;
            }
        };

        match updated {
            Ok(job) => match job.status {
                JobStatus::Completed => {
                    tracing::info!(job_id = %job.id, "job completed");
                }
                JobStatus::Pending => {
                    self.queue.push(QueueRef::from(&job)).await;
                }
                JobStatus::Failed => {
                    tracing::warn!(
                        job_id = %job.id,
                        retry_count = job.retry_count,
                        error = job.error.as_deref().unwrap_or(""),
                        "job failed"
                    );
                }
                // Cancel wrote the terminal state while the job was in
                // flight; the outcome is dropped.
                JobStatus::Cancelled => {}
                JobStatus::Running => {
                    tracing::warn!(job_id = %job.id, "outcome left job running");
                }
            },
            Err(err) => {
                // Store faults never crash the loop.
                tracing::warn!(job_id = %report.job_id, error = %err, "failed to record job outcome");
            }
        }
    }
}
