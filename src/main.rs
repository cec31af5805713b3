use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use jobq::api;
use jobq::config::ServiceConfig;
use jobq::service::JobService;
use jobq::shutdown::install_shutdown_handler;
use jobq::worker::ShellExecutor;

#[derive(Parser, Debug)]
#[command(name = "jobq")]
#[command(about = "In-memory job queue service with an HTTP API")]
struct Args {
    /// Port to listen on for HTTP
    #[arg(long, default_value = "4000")]
    port: u16,

    /// Maximum number of concurrent workers
    #[arg(long, default_value = "10")]
    max_workers: usize,

    /// Workers kept alive while the queue is empty
    #[arg(long, default_value = "1")]
    min_workers: usize,

    /// Default per-job timeout in milliseconds
    #[arg(long, default_value = "30000")]
    job_timeout_ms: u64,

    /// Default number of retries after a failed run
    #[arg(long, default_value = "3")]
    max_retries: u32,

    /// Soft bound on pending queue depth (admission past it only logs)
    #[arg(long, default_value = "1000")]
    queue_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let config = ServiceConfig {
        listen_addr,
        max_workers: args.max_workers,
        min_workers: args.min_workers,
        default_timeout_ms: args.job_timeout_ms,
        default_max_retries: args.max_retries,
        queue_warning_depth: args.queue_capacity,
        ..ServiceConfig::default()
    };

    tracing::info!(
        addr = %config.listen_addr,
        max_workers = config.max_workers,
        min_workers = config.min_workers,
        "starting jobq"
    );

    let shutdown = install_shutdown_handler();
    let executor = Arc::new(ShellExecutor);
    let (service, dispatcher) = JobService::build(&config, executor, shutdown.clone());
    tokio::spawn(dispatcher.run());

    api::serve(config.listen_addr, service, shutdown).await?;
    Ok(())
}
