//! HTTP surface over the boundary API.

pub mod error;
pub mod handlers;
pub mod request_id;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{JobqError, Result};
use crate::service::JobService;

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<JobService>,
}

pub fn router(service: Arc<JobService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/jobs",
            get(handlers::list_jobs).post(handlers::submit_job),
        )
        .route(
            "/api/jobs/{id}",
            get(handlers::get_job).delete(handlers::cancel_job),
        )
        .fallback(handlers::route_not_found)
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ApiState { service })
}

pub async fn serve(
    addr: SocketAddr,
    service: Arc<JobService>,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(service);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| JobqError::Internal(format!("failed to bind {addr}: {e}")))?;
    tracing::info!(addr = %addr, "http server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| JobqError::Internal(format!("http server failed: {e}")))
}
