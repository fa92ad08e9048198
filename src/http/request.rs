//! Request context extraction.
//!
//! # Responsibilities
//! - Continue the caller's request id (`x-request-id`) or start a new one
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing (SetRequestIdLayer in
//!   server.rs); handlers only read it
//! - An id that is not a UUID is replaced rather than rejected

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::endpoint::CallContext;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Build the per-call context for an inbound request.
pub fn context_from_headers(headers: &HeaderMap) -> CallContext {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .map(CallContext::with_request_id)
        .unwrap_or_default()
}
