//! Shared helpers for integration tests: a service harness with a fast
//! dispatcher and a set of deterministic stub executors.
#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use jobq::config::ServiceConfig;
use jobq::scheduler::{Job, JobStatus};
use jobq::service::JobService;
use jobq::worker::Executor;

/// Service config with short intervals for fast tests.
pub fn test_config(max_workers: usize) -> ServiceConfig {
    ServiceConfig {
        max_workers,
        min_workers: 1,
        poll_interval_ms: 10,
        capacity_backoff_ms: 20,
        ..ServiceConfig::default()
    }
}

/// A running service: boundary API handle plus a spawned dispatcher.
pub struct TestService {
    pub service: Arc<JobService>,
    shutdown: CancellationToken,
    dispatcher: JoinHandle<()>,
}

impl TestService {
    pub fn start(config: ServiceConfig, executor: Arc<dyn Executor>) -> Self {
        let shutdown = CancellationToken::new();
        let (service, dispatcher) = JobService::build(&config, executor, shutdown.clone());
        let dispatcher = tokio::spawn(dispatcher.run());
        Self {
            service,
            shutdown,
            dispatcher,
        }
    }

    /// Stop the dispatcher. The service handle stays usable; newly enqueued
    /// jobs remain pending.
    pub async fn stop_dispatcher(&self) {
        self.shutdown.cancel();
        // The loop observes the token on its next wakeup.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Wait for a job to reach `status`, panicking on timeout.
pub async fn wait_for_status(
    service: &JobService,
    id: &str,
    status: JobStatus,
    timeout_duration: Duration,
) -> Job {
    let start = tokio::time::Instant::now();
    loop {
        if let Ok(job) = service.get(id).await {
            if job.status == status {
                return job;
            }
        }
        if start.elapsed() >= timeout_duration {
            panic!("job {id} did not reach {status} within {timeout_duration:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(10)).await;
    assert!(result, "{}", message);
}

/// Echoes the command back as the job result.
pub struct EchoExecutor;

#[async_trait]
impl Executor for EchoExecutor {
    async fn run(&self, command: &str, _cancel: CancellationToken) -> Result<String, String> {
        Ok(command.to_string())
    }
}

/// Fails the first `failures` runs, then succeeds.
pub struct FlakyExecutor {
    remaining: AtomicUsize,
}

impl FlakyExecutor {
    pub fn new(failures: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl Executor for FlakyExecutor {
    async fn run(&self, command: &str, _cancel: CancellationToken) -> Result<String, String> {
        let failed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok();
        if failed {
            Err("transient failure".to_string())
        } else {
            Ok(command.to_string())
        }
    }
}

/// Always fails.
pub struct FailingExecutor;

#[async_trait]
impl Executor for FailingExecutor {
    async fn run(&self, _command: &str, _cancel: CancellationToken) -> Result<String, String> {
        Err("boom".to_string())
    }
}

/// Sleeps for `delay`, honouring cancellation.
pub struct SleepExecutor {
    pub delay: Duration,
}

#[async_trait]
impl Executor for SleepExecutor {
    async fn run(&self, _command: &str, cancel: CancellationToken) -> Result<String, String> {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => Ok("slept".to_string()),
            _ = cancel.cancelled() => Err("execution cancelled".to_string()),
        }
    }
}

/// Records commands in execution order. The command "hold" blocks until its
/// cancellation token fires, which pins a worker for ordering tests.
pub struct RecordingExecutor {
    pub log: Arc<Mutex<Vec<String>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn recorded(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn run(&self, command: &str, cancel: CancellationToken) -> Result<String, String> {
        self.log.lock().unwrap().push(command.to_string());
        if command == "hold" {
            cancel.cancelled().await;
            Err("execution cancelled".to_string())
        } else {
            Ok(command.to_string())
        }
    }
}

/// Succeeds for commands starting with "ok", fails everything else.
pub struct PrefixExecutor;

#[async_trait]
impl Executor for PrefixExecutor {
    async fn run(&self, command: &str, _cancel: CancellationToken) -> Result<String, String> {
        if command.starts_with("ok") {
            Ok(command.to_string())
        } else {
            Err(format!("refused command: {command}"))
        }
    }
}

/// Panics, for executor fault capture.
pub struct PanicExecutor;

#[async_trait]
impl Executor for PanicExecutor {
    async fn run(&self, _command: &str, _cancel: CancellationToken) -> Result<String, String> {
        panic!("executor blew up");
    }
}
