//! Error encoding for HTTP responses.
//!
//! # Responsibilities
//! - Map each [`RpcError`] to the status code a client should see
//! - Carry the error message in a JSON body
//!
//! # Mapping
//! ```text
//! Application      → 400 Bad Request
//! RateLimited      → 429 Too Many Requests
//! CircuitOpen      → 503 Service Unavailable
//! NoEndpoints      → 503 Service Unavailable
//! Transport        → 502 Bad Gateway
//! DeadlineExceeded → 504 Gateway Timeout
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// Wire shape of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn status_for(err: &RpcError) -> StatusCode {
    match err {
        RpcError::Application(_) => StatusCode::BAD_REQUEST,
        RpcError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        RpcError::CircuitOpen | RpcError::NoEndpoints => StatusCode::SERVICE_UNAVAILABLE,
        RpcError::Transport(_) => StatusCode::BAD_GATEWAY,
        RpcError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
    }
}

/// Handler error: an [`RpcError`] rendered as a response.
#[derive(Debug)]
pub struct HttpError(pub RpcError);

impl From<RpcError> for HttpError {
    fn from(err: RpcError) -> Self {
        Self(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status_for(&self.0), Json(body)).into_response()
    }
}
