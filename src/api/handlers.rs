use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::request_id::RequestId;
use crate::api::ApiState;
use crate::scheduler::{Job, JobStatus};
use crate::service::{EnqueueRequest, ListRequest};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
}

#[derive(Deserialize)]
pub struct SubmitJobRequest {
    pub command: Option<String>,
    pub priority: Option<String>,
    /// Execution deadline in milliseconds.
    pub timeout: Option<i64>,
    pub max_retries: Option<i64>,
}

#[derive(Serialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Serialize)]
pub struct CancelJobResponse {
    pub job_id: String,
    pub status: String,
    pub message: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn submit_job(
    State(state): State<ApiState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        ApiError::bad_request(
            format!("invalid request body: {rejection}"),
            json!({}),
            Some(request_id.0.clone()),
        )
    })?;

    let job = state
        .service
        .enqueue(EnqueueRequest {
            command: body.command.unwrap_or_default(),
            priority: body.priority,
            timeout_ms: body.timeout,
            max_retries: body.max_retries,
        })
        .await
        .map_err(|err| ApiError::from_service(err, Some(request_id.0.clone())))?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitJobResponse {
            job_id: job.id,
            status: "queued",
            message: "job accepted for execution",
        }),
    ))
}

pub async fn get_job(
    State(state): State<ApiState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    if Uuid::parse_str(&id).is_err() {
        return Err(ApiError::bad_request(
            format!("invalid job id: {id}"),
            json!({ "job_id": id }),
            Some(request_id.0),
        ));
    }
    let job = state
        .service
        .get(&id)
        .await
        .map_err(|err| ApiError::from_service(err, Some(request_id.0)))?;
    Ok(Json(job))
}

pub async fn list_jobs(
    State(state): State<ApiState>,
    Extension(request_id): Extension<RequestId>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let Query(query) = query.map_err(|rejection| {
        ApiError::bad_request(
            format!("invalid query string: {rejection}"),
            json!({}),
            Some(request_id.0.clone()),
        )
    })?;

    let page = state
        .service
        .list(ListRequest {
            status: query.status,
            limit: query.limit,
            offset: query.offset,
        })
        .await
        .map_err(|err| ApiError::from_service(err, Some(request_id.0)))?;

    Ok(Json(ListJobsResponse {
        jobs: page.items,
        total: page.total,
        limit: page.limit,
        offset: page.offset,
    }))
}

pub async fn cancel_job(
    State(state): State<ApiState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> Result<Json<CancelJobResponse>, ApiError> {
    let job = state
        .service
        .cancel(&id)
        .await
        .map_err(|err| ApiError::from_service(err, Some(request_id.0)))?;

    let message = if job.status == JobStatus::Cancelled {
        "job cancelled".to_string()
    } else {
        format!("job already in terminal state {}", job.status)
    };
    Ok(Json(CancelJobResponse {
        job_id: job.id,
        status: job.status.to_string(),
        message,
    }))
}

/// Fallback for unknown routes.
pub async fn route_not_found(method: Method, uri: Uri) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "not_found",
            "message": "no such route",
            "path": uri.path(),
            "method": method.as_str(),
        })),
    )
}
