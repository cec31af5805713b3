//! Boundary API consumed by the HTTP layer.
//!
//! All input validation is centralised here; the HTTP handlers only shuttle
//! raw client values in and map errors to responses.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::error::{JobqError, Result};
use crate::scheduler::{
    CancellationRegistry, Dispatcher, Job, JobStatus, JobStore, PendingQueue, Priority, QueueRef,
};
use crate::worker::{Executor, WorkerPool, WorkerReport};

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

const REPORT_BUFFER: usize = 64;

/// Raw enqueue parameters as received from a client. Unset fields fall back
/// to the configured defaults during validation.
#[derive(Debug, Default)]
pub struct EnqueueRequest {
    pub command: String,
    pub priority: Option<String>,
    pub timeout_ms: Option<i64>,
    pub max_retries: Option<i64>,
}

#[derive(Debug, Default)]
pub struct ListRequest {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug)]
pub struct JobPage {
    pub items: Vec<Job>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

pub struct JobService {
    store: Arc<JobStore>,
    queue: Arc<PendingQueue>,
    cancellations: Arc<CancellationRegistry>,
    default_timeout_ms: u64,
    default_max_retries: u32,
    queue_warning_depth: usize,
}

impl JobService {
    /// Wire up the store, queue, pool and dispatcher. The caller spawns
    /// `Dispatcher::run` and keeps the service handle for the HTTP layer.
    pub fn build(
        config: &ServiceConfig,
        executor: Arc<dyn Executor>,
        shutdown: CancellationToken,
    ) -> (Arc<JobService>, Dispatcher) {
        let store = Arc::new(JobStore::new());
        let queue = Arc::new(PendingQueue::new());
        let cancellations = Arc::new(CancellationRegistry::new());
        let (report_tx, report_rx) = mpsc::channel::<WorkerReport>(REPORT_BUFFER);
        let pool = Arc::new(WorkerPool::new(
            executor,
            report_tx,
            config.max_workers,
            config.min_workers,
        ));

        let service = Arc::new(JobService {
            store: Arc::clone(&store),
            queue: Arc::clone(&queue),
            cancellations: Arc::clone(&cancellations),
            default_timeout_ms: config.default_timeout_ms,
            default_max_retries: config.default_max_retries,
            queue_warning_depth: config.queue_warning_depth,
        });
        let dispatcher = Dispatcher::new(
            store,
            queue,
            pool,
            cancellations,
            report_rx,
            config,
            shutdown,
        );
        (service, dispatcher)
    }

    /// Validate, insert a pending record and make it visible to the queue.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<Job> {
        if request.command.trim().is_empty() {
            return Err(JobqError::invalid_argument(
                "command",
                "must be a non-empty string",
            ));
        }
        let priority = match request.priority.as_deref() {
            None => Priority::Normal,
            Some(s) => Priority::parse(s).ok_or_else(|| {
                JobqError::invalid_argument(
                    "priority",
                    format!("unknown priority '{s}', expected one of high, normal, low"),
                )
            })?,
        };
        let timeout_ms = match request.timeout_ms {
            None => self.default_timeout_ms,
            Some(t) if t <= 0 => {
                return Err(JobqError::invalid_argument(
                    "timeout",
                    "must be a positive number of milliseconds",
                ))
            }
            Some(t) => t as u64,
        };
        let max_retries = match request.max_retries {
            None => self.default_max_retries,
            Some(r) if r < 0 => {
                return Err(JobqError::invalid_argument(
                    "max_retries",
                    "must not be negative",
                ))
            }
            Some(r) => r as u32,
        };

        let job = Job::new(request.command, priority, timeout_ms, max_retries);
        self.store.insert(job.clone()).await?;
        self.queue.push(QueueRef::from(&job)).await;

        let depth = self.queue.len().await;
        if depth > self.queue_warning_depth {
            tracing::warn!(depth, threshold = self.queue_warning_depth, "pending queue above soft capacity");
        }
        tracing::info!(job_id = %job.id, priority = %job.priority, "job enqueued");
        Ok(job)
    }

    pub async fn get(&self, id: &str) -> Result<Job> {
        self.store.get(id).await
    }

    pub async fn list(&self, request: ListRequest) -> Result<JobPage> {
        let filter = match request.status.as_deref() {
            None => None,
            Some(s) => Some(JobStatus::parse(s).ok_or_else(|| {
                JobqError::invalid_argument(
                    "status",
                    format!(
                        "unknown status '{s}', expected one of pending, running, completed, failed, cancelled"
                    ),
                )
            })?),
        };
        let limit = match request.limit {
            None => DEFAULT_LIST_LIMIT,
            Some(l) if l < 1 => {
                return Err(JobqError::invalid_argument("limit", "must be at least 1"))
            }
            Some(l) => (l as usize).min(MAX_LIST_LIMIT),
        };
        let offset = match request.offset {
            None => 0,
            Some(o) if o < 0 => {
                return Err(JobqError::invalid_argument("offset", "must not be negative"))
            }
            Some(o) => o as usize,
        };

        let (items, total) = self.store.list(filter, limit, offset).await;
        Ok(JobPage {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Cancel a job. Pending jobs leave the queue immediately; running jobs
    /// have their worker signalled. Terminal jobs are returned unchanged.
    pub async fn cancel(&self, id: &str) -> Result<Job> {
        let mut previous: Option<JobStatus> = None;
        let updated = self
            .store
            .update(id, |job| {
                previous = Some(job.status);
                if matches!(job.status, JobStatus::Pending | JobStatus::Running) {
                    job.status = JobStatus::Cancelled;
                    job.completed_at = Some(Utc::now());
                }
            })
            .await?;

        match previous {
            Some(JobStatus::Pending) => {
                self.queue.remove(id).await;
                tracing::info!(job_id = id, "cancelled pending job");
            }
            Some(JobStatus::Running) => {
                self.cancellations.fire(id).await;
                tracing::info!(job_id = id, "cancelled running job, worker signalled");
            }
            _ => {}
        }
        Ok(updated)
    }

    /// Drop all state: queued references, in-flight cancellation tokens and
    /// the store itself. Test-only.
    pub async fn clear(&self) -> usize {
        self.queue.clear().await;
        self.cancellations.fire_all().await;
        let removed = self.store.clear().await;
        tracing::info!(removed, "cleared all jobs");
        removed
    }
}
