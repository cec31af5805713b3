use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::JobqError;

/// Error surfaced to an HTTP client. Rendered as the common envelope
/// `{status, kind, message, timestamp, error_id, request_id, details}`.
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Value,
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn bad_request(
        message: impl Into<String>,
        details: Value,
        request_id: Option<String>,
    ) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            details,
            request_id,
        }
    }

    /// Map a core error to its HTTP shape. 4xx responses keep the actionable
    /// message and details; internals collapse to an opaque 500.
    pub fn from_service(err: JobqError, request_id: Option<String>) -> Self {
        match err {
            JobqError::InvalidArgument { field, reason } => Self {
                status: StatusCode::BAD_REQUEST,
                message: format!("invalid {field}: {reason}"),
                details: json!({ "field": field, "reason": reason }),
                request_id,
            },
            JobqError::NotFound(id) => Self {
                status: StatusCode::NOT_FOUND,
                message: format!("job not found: {id}"),
                details: json!({ "job_id": id }),
                request_id,
            },
            JobqError::PoolExhausted => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "no capacity to accept work".to_string(),
                details: json!({}),
                request_id,
            },
            other => {
                tracing::error!(error = %other, "internal error reached the http boundary");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "internal server error".to_string(),
                    details: json!({}),
                    request_id,
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_id = Uuid::new_v4().to_string();
        if self.status.is_server_error() {
            tracing::error!(error_id = %error_id, status = self.status.as_u16(), message = %self.message, "request failed");
        }
        let body = json!({
            "status": self.status.as_u16(),
            "kind": "error",
            "message": self.message,
            "timestamp": Utc::now().to_rfc3339(),
            "error_id": error_id,
            "request_id": self.request_id,
            "details": self.details,
        });
        (self.status, Json(body)).into_response()
    }
}
