use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Runs a job's command. The command string is opaque to the core; only the
/// executor interprets it. `Err` carries the human-readable failure reason
/// that ends up on the job record.
///
/// Implementations must watch `cancel`: the worker fires it on timeout and on
/// job cancellation, and expects the run to stop promptly.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, command: &str, cancel: CancellationToken) -> Result<String, String>;
}

/// Executes commands through `sh -c`, capturing stdout as the job result.
/// A fired cancellation token kills the child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

#[async_trait]
impl Executor for ShellExecutor {
    async fn run(&self, command: &str, cancel: CancellationToken) -> Result<String, String> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn shell: {e}"))?;

        // Drain pipes concurrently so a chatty command cannot fill the pipe
        // buffer and deadlock against wait().
        let stdout_task = tokio::spawn(read_to_string(child.stdout.take()));
        let stderr_task = tokio::spawn(read_to_string(child.stderr.take()));

        let status = tokio::select! {
            status = child.wait() => {
                status.map_err(|e| format!("failed to wait for command: {e}"))?
            }
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err("execution cancelled".to_string());
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(stdout)
        } else if stderr.is_empty() {
            Err(format!("exit code: {:?}", status.code()))
        } else {
            Err(stderr)
        }
    }
}

async fn read_to_string(pipe: Option<impl AsyncRead + Unpin + Send>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}
