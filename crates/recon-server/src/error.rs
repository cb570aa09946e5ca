//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use recon_core::Error;

use crate::types::ApiResponse;

/// Failure of a control-plane request
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed request parameter
    BadRequest(String),
    /// A comparison is already running
    Busy,
    /// Error from the reconciler
    Core(Error),
    /// Worker task failure
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Busy => StatusCode::CONFLICT,
            Self::Core(e) if e.is_format_error() => StatusCode::BAD_REQUEST,
            Self::Core(Error::FileNotLoaded(_) | Error::NoResult | Error::DuplicateKey { .. }) => {
                StatusCode::CONFLICT
            }
            Self::Core(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(msg) | Self::Internal(msg) => msg.clone(),
            Self::Busy => "a comparison is already running".to_string(),
            Self::Core(e) => e.to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::Core(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("worker task failed: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let msg = self.message();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", msg);
        } else {
            tracing::debug!(status = status.as_u16(), "{}", msg);
        }
        (status, Json(ApiResponse::error(status.as_u16() as i32, msg))).into_response()
    }
}
