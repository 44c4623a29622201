//! The error taxonomy shared by every crate in the workspace.
//!
//! Each variant maps to exactly one HTTP status code, matching the
//! classification handlers and storage adapters are expected to produce.

use std::collections::BTreeMap;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;

/// The uniform error type returned by every fallible operation in the
/// request path, from the router down to the storage adapter.
#[derive(Debug)]
pub enum AppError {
    /// A handler recorded one or more `error(field, message)` calls, or a
    /// declared property failed a type check.
    Validation(BTreeMap<String, String>),
    /// A handler invoked `cancel(message, status)`.
    Cancelled { message: String, status: StatusCode },
    /// No or invalid credentials where required.
    Unauthorized(String),
    /// A handler rejected the request on ownership/policy grounds.
    Forbidden(String),
    /// Unknown collection, missing document, or an ownership mask.
    NotFound(String),
    /// A handler failed to compile or raised during execution.
    HandlerFault { message: String, location: String },
    /// The storage backend failed.
    Backend(String),
    /// The request deadline expired.
    Timeout,
}

impl AppError {
    pub fn cancelled(message: impl Into<String>, status: Option<u16>) -> Self {
        let status = status
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(StatusCode::BAD_REQUEST);
        AppError::Cancelled {
            message: message.into(),
            status,
        }
    }

    pub fn handler_fault(message: impl Into<String>, location: impl Into<String>) -> Self {
        AppError::HandlerFault {
            message: message.into(),
            location: location.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Cancelled { status, .. } => *status,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::HandlerFault { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // spec.md §4.3/§5: a handler-deadline expiry is marked cancelled
            // with status 500, not a gateway timeout.
            AppError::Timeout => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Validation(errors) => write!(f, "validation failed: {errors:?}"),
            AppError::Cancelled { message, status } => {
                write!(f, "cancelled ({status}): {message}")
            }
            AppError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            AppError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            AppError::NotFound(msg) => write!(f, "not found: {msg}"),
            AppError::HandlerFault { message, location } => {
                write!(f, "handler fault at {location}: {message}")
            }
            AppError::Backend(msg) => write!(f, "backend error: {msg}"),
            AppError::Timeout => write!(f, "deadline exceeded"),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            AppError::Validation(errors) => {
                (status, Json(json!({ "errors": errors }))).into_response()
            }
            AppError::HandlerFault { message, location } => {
                tracing::error!(location = %location, "handler fault: {message}");
                (status, Json(json!({ "error": "internal error" }))).into_response()
            }
            AppError::Backend(msg) => {
                tracing::error!("backend error: {msg}");
                (status, Json(json!({ "error": "internal error" }))).into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn validation_error_carries_field_map() {
        let mut errors = BTreeMap::new();
        errors.insert("title".to_string(), "required".to_string());
        let response = AppError::Validation(errors).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["errors"]["title"], "required");
    }

    #[tokio::test]
    async fn backend_error_hides_detail_from_response() {
        let response = AppError::Backend("connection reset".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "internal error");
    }

    #[test]
    fn cancelled_defaults_to_400() {
        let err = AppError::cancelled("nope", None);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err = AppError::cancelled("nope", Some(403));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }
}
