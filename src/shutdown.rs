use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Install a handler for SIGINT and SIGTERM.
///
/// Returns a `CancellationToken` cancelled when either signal arrives. The
/// dispatcher and the HTTP server watch the token and stop; workers are
/// terminated without draining.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let handler_token = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install SIGTERM handler");
                    handler_token.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = signal::ctrl_c().await;
            tracing::info!("received ctrl-c, shutting down");
        }
        handler_token.cancel();
    });

    token
}
