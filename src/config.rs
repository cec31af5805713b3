use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: SocketAddr,
    pub max_workers: usize,
    pub min_workers: usize,
    /// Per-job execution deadline when the client does not set one.
    pub default_timeout_ms: u64,
    /// Re-executions allowed after a failed run when the client does not set one.
    pub default_max_retries: u32,
    /// Soft bound on pending queue depth; admission past it only logs a warning.
    pub queue_warning_depth: usize,
    /// Dispatcher wakeup interval when idle.
    pub poll_interval_ms: u64,
    /// Back-off applied after the pool reports exhaustion.
    pub capacity_backoff_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4000".parse().expect("static listen addr"),
            max_workers: 10,
            min_workers: 1,
            default_timeout_ms: 30_000,
            default_max_retries: 3,
            queue_warning_depth: 1000,
            poll_interval_ms: 100,
            capacity_backoff_ms: 5_000,
        }
    }
}

impl ServiceConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_min_workers(mut self, min_workers: usize) -> Self {
        self.min_workers = min_workers;
        self
    }
}
