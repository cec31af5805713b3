//! Worker execution engine.
//!
//! A worker is a long-lived task owned by the [`pool`]. It receives one
//! [`Assignment`] at a time, runs the job's command through the configured
//! [`Executor`] under the job's deadline, and reports a [`WorkerReport`] back
//! to the dispatcher:
//!
//! 1. Worker receives an assignment (job snapshot + cancellation token)
//! 2. The executor runs in its own task so a panicking executor cannot take
//!    the worker down
//! 3. Deadline expiry fires the executor's cancellation token and yields a
//!    timeout failure
//! 4. A fired job token aborts the run; the outcome is reported as
//!    `Cancelled` and never overwrites the terminal state written by cancel

pub mod executor;
pub mod pool;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::scheduler::job::Job;

pub use executor::{Executor, ShellExecutor};
pub use pool::{WorkerPool, WorkerSlot};

/// One unit of work handed to a worker.
#[derive(Debug)]
pub struct Assignment {
    pub job: Job,
    pub cancel: CancellationToken,
}

/// Raw result of a single execution attempt. The dispatcher decides between
/// retry and terminal failure; the worker only reports what happened.
#[derive(Debug)]
pub enum WorkerOutcome {
    Success(String),
    Failure(String),
    Cancelled,
}

#[derive(Debug)]
pub struct WorkerReport {
    pub worker_id: u64,
    pub job_id: String,
    pub outcome: WorkerOutcome,
}

pub(crate) async fn worker_task(
    id: u64,
    executor: Arc<dyn Executor>,
    mut assignments: mpsc::Receiver<Assignment>,
    reports: mpsc::Sender<WorkerReport>,
) {
    tracing::debug!(worker_id = id, "worker started");
    while let Some(assignment) = assignments.recv().await {
        let job_id = assignment.job.id.clone();
        let outcome = execute(id, &executor, assignment).await;
        let report = WorkerReport {
            worker_id: id,
            job_id,
            outcome,
        };
        if reports.send(report).await.is_err() {
            // Dispatcher is gone; nothing left to report to.
            break;
        }
    }
    tracing::debug!(worker_id = id, "worker stopped");
}

async fn execute(
    worker_id: u64,
    executor: &Arc<dyn Executor>,
    assignment: Assignment,
) -> WorkerOutcome {
    let Assignment { job, cancel } = assignment;
    if cancel.is_cancelled() {
        return WorkerOutcome::Cancelled;
    }

    tracing::info!(worker_id, job_id = %job.id, command = %job.command, "executing job");

    let run_token = cancel.child_token();
    let exec = Arc::clone(executor);
    let command = job.command.clone();
    let token = run_token.clone();
    let mut run = tokio::spawn(async move { exec.run(&command, token).await });

    let deadline = Duration::from_millis(job.timeout_ms);
    let result = tokio::select! {
        _ = cancel.cancelled() => {
            run_token.cancel();
            run.abort();
            let _ = run.await;
            return WorkerOutcome::Cancelled;
        }
        result = tokio::time::timeout(deadline, &mut run) => result,
    };

    match result {
        Err(_elapsed) => {
            run_token.cancel();
            run.abort();
            let _ = run.await;
            tracing::warn!(worker_id, job_id = %job.id, timeout_ms = job.timeout_ms, "job timed out");
            WorkerOutcome::Failure(format!("job timed out after {} ms", job.timeout_ms))
        }
        Ok(Err(join_err)) => {
            let reason = if join_err.is_panic() {
                let payload = join_err.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                format!("executor panicked: {message}")
            } else {
                format!("executor fault: {join_err}")
            };
            tracing::error!(worker_id, job_id = %job.id, reason, "executor fault");
            WorkerOutcome::Failure(reason)
        }
        Ok(Ok(run_result)) => {
            // Checkpoint before reporting: a cancel that landed while the run
            // finished must win.
            if cancel.is_cancelled() {
                return WorkerOutcome::Cancelled;
            }
            match run_result {
                Ok(output) => WorkerOutcome::Success(output),
                Err(reason) => WorkerOutcome::Failure(reason),
            }
        }
    }
}
