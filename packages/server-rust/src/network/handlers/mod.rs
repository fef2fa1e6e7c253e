//! HTTP handler definitions for the bookinfo server.
//!
//! Defines `AppState` (the shared state carried through axum extractors) and
//! `ApiError` (the mapping from `OperationError` to an HTTP response), and
//! re-exports all handler functions for building the router.

pub mod health;
pub mod rpc;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use rpc::{get_comments_handler, get_detail_handler, post_comment_handler};

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bookinfo_core::{BookComments, BookDetails, OperationError};
use serde_json::json;

use super::ShutdownController;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Decorated comments service.
    pub comments: Arc<dyn BookComments>,
    /// Decorated details service.
    pub details: Arc<dyn BookDetails>,
    /// Health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Deadline given to every call started by a request.
    pub call_timeout: Duration,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

/// Status code for a caller that went away before the response was ready.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// An `OperationError` rendered as a JSON HTTP response.
#[derive(Debug)]
pub struct ApiError(pub OperationError);

impl From<OperationError> for ApiError {
    fn from(err: OperationError) -> Self {
        Self(err)
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            OperationError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            OperationError::CircuitOpen { .. } | OperationError::TooManyRequests { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            OperationError::Cancelled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            OperationError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            OperationError::NotFound(_) => StatusCode::NOT_FOUND,
            OperationError::InvalidArgument(_) | OperationError::WrongRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            OperationError::UnknownOperation { .. }
            | OperationError::UnexpectedResponse { .. }
            | OperationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.0.label(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
