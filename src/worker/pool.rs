use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{JobqError, Result};
use crate::worker::{worker_task, Assignment, Executor, WorkerReport};

/// Each worker processes one assignment at a time.
const ASSIGNMENT_BUFFER: usize = 1;

/// Respawn budget for workers whose task died outside the normal lifecycle.
const RESTART_WINDOW: Duration = Duration::from_secs(60);
const MAX_RESTARTS_PER_WINDOW: usize = 5;

struct WorkerEntry {
    sender: mpsc::Sender<Assignment>,
    task: JoinHandle<()>,
    busy: bool,
    idle_since: Instant,
}

struct PoolInner {
    workers: HashMap<u64, WorkerEntry>,
    next_id: u64,
    restarts: Vec<Instant>,
}

/// Handle to an acquired worker. Valid until released back to the pool.
#[derive(Debug)]
pub struct WorkerSlot {
    pub id: u64,
    sender: mpsc::Sender<Assignment>,
}

impl WorkerSlot {
    pub async fn assign(&self, assignment: Assignment) -> Result<()> {
        self.sender
            .send(assignment)
            .await
            .map_err(|_| JobqError::Internal("worker channel closed".to_string()))
    }
}

/// Dynamic set of workers bounded by `max_workers`. Workers are spawned on
/// demand, parked idle after release, and reclaimed by `cleanup_idle` down to
/// `min_workers` when the queue is drained.
pub struct WorkerPool {
    executor: Arc<dyn Executor>,
    reports: mpsc::Sender<WorkerReport>,
    max_workers: usize,
    min_workers: usize,
    inner: Mutex<PoolInner>,
}

impl WorkerPool {
    pub fn new(
        executor: Arc<dyn Executor>,
        reports: mpsc::Sender<WorkerReport>,
        max_workers: usize,
        min_workers: usize,
    ) -> Self {
        Self {
            executor,
            reports,
            max_workers,
            min_workers,
            inner: Mutex::new(PoolInner {
                workers: HashMap::new(),
                next_id: 1,
                restarts: Vec::new(),
            }),
        }
    }

    pub fn min_workers(&self) -> usize {
        self.min_workers
    }

    /// Hand out an idle worker, or spawn one below `max_workers`. Returns
    /// `PoolExhausted` at capacity.
    pub async fn acquire(&self) -> Result<WorkerSlot> {
        let mut inner = self.inner.lock().await;
        self.reap_dead(&mut inner)?;

        let idle = inner
            .workers
            .iter()
            .filter(|(_, w)| !w.busy)
            .map(|(id, _)| *id)
            .next();
        if let Some(id) = idle {
            let entry = inner
                .workers
                .get_mut(&id)
                .ok_or_else(|| JobqError::Internal("idle worker vanished".to_string()))?;
            entry.busy = true;
            return Ok(WorkerSlot {
                id,
                sender: entry.sender.clone(),
            });
        }

        if inner.workers.len() >= self.max_workers {
            return Err(JobqError::PoolExhausted);
        }
        let (id, sender) = self.spawn_worker(&mut inner);
        Ok(WorkerSlot { id, sender })
    }

    pub async fn release(&self, id: u64) {
        let mut inner = self.inner.lock().await;
        match inner.workers.get_mut(&id) {
            Some(entry) => {
                entry.busy = false;
                entry.idle_since = Instant::now();
            }
            None => tracing::warn!(worker_id = id, "released unknown worker"),
        }
    }

    /// Number of live workers.
    pub async fn active_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner
            .workers
            .values()
            .filter(|w| !w.task.is_finished())
            .count()
    }

    /// Terminate the longest-idle workers until at most `min` remain. Busy
    /// workers are never terminated; acquisition and cleanup share the pool
    /// lock, so a worker cannot be reclaimed after being handed a job.
    pub async fn cleanup_idle(&self, min: usize) -> usize {
        let mut inner = self.inner.lock().await;
        let mut removed = 0;
        while inner.workers.len() > min {
            let oldest_idle = inner
                .workers
                .iter()
                .filter(|(_, w)| !w.busy)
                .min_by_key(|(_, w)| w.idle_since)
                .map(|(id, _)| *id);
            let Some(id) = oldest_idle else { break };
            if let Some(entry) = inner.workers.remove(&id) {
                // Dropping the sender closes the channel; the idle worker
                // observes it and exits on its own.
                drop(entry.sender);
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, remaining = inner.workers.len(), "reclaimed idle workers");
        }
        removed
    }

    /// Terminate every worker immediately.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        for (id, entry) in inner.workers.drain() {
            entry.task.abort();
            tracing::debug!(worker_id = id, "worker terminated");
        }
    }

    fn spawn_worker(&self, inner: &mut PoolInner) -> (u64, mpsc::Sender<Assignment>) {
        let id = inner.next_id;
        inner.next_id += 1;
        let (sender, receiver) = mpsc::channel(ASSIGNMENT_BUFFER);
        let task = tokio::spawn(worker_task(
            id,
            Arc::clone(&self.executor),
            receiver,
            self.reports.clone(),
        ));
        inner.workers.insert(
            id,
            WorkerEntry {
                sender: sender.clone(),
                task,
                busy: true,
                idle_since: Instant::now(),
            },
        );
        tracing::debug!(worker_id = id, live = inner.workers.len(), "spawned worker");
        (id, sender)
    }

    /// Remove workers whose task died without going through cleanup. Each
    /// removal counts against a restart budget; when the budget is exhausted
    /// the pool refuses further work instead of looping on respawns.
    fn reap_dead(&self, inner: &mut PoolInner) -> Result<()> {
        let dead: Vec<u64> = inner
            .workers
            .iter()
            .filter(|(_, w)| w.task.is_finished())
            .map(|(id, _)| *id)
            .collect();
        if dead.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        for id in dead {
            inner.workers.remove(&id);
            inner.restarts.push(now);
            tracing::warn!(worker_id = id, "reaped dead worker");
        }
        inner.restarts.retain(|t| now.duration_since(*t) < RESTART_WINDOW);
        if inner.restarts.len() > MAX_RESTARTS_PER_WINDOW {
            tracing::error!(
                restarts = inner.restarts.len(),
                window_secs = RESTART_WINDOW.as_secs(),
                "worker restart budget exhausted, giving up"
            );
            return Err(JobqError::Internal(
                "worker restart budget exhausted".to_string(),
            ));
        }
        Ok(())
    }
}
