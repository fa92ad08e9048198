//! Error taxonomy for the invocation layer.
//!
//! # Propagation
//! ```text
//! RateLimited / CircuitOpen / NoEndpoints  → admission rejection, retried by the orchestrator
//! Transport                                → network failure, retried against another instance
//! Application                              → remote business error, returned immediately
//! DeadlineExceeded                         → time budget exhausted
//! ```
//!
//! Translating these into a transport's native failure (status codes, etc.)
//! happens in the transport module, never here.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced by an endpoint invocation.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Admission rejected by a token bucket. Raised locally before any network
    /// attempt, or reported by a remote instance that throttled the call
    /// (HTTP 429, JSON-RPC limit-exceeded). Either way the request was not
    /// processed, and it says nothing about the instance's health.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The circuit breaker for the target is open; no network attempt was made.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The balancer found an empty live set.
    #[error("no endpoints available")]
    NoEndpoints,

    /// Dial or call-level network failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The remote business logic answered with a defined error value.
    #[error("{0}")]
    Application(Arc<dyn StdError + Send + Sync>),

    /// The call's time budget ran out.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Result type for endpoint invocations.
pub type RpcResult<T> = Result<T, RpcError>;

impl RpcError {
    /// Wrap a business error value, keeping it recoverable via
    /// [`RpcError::downcast_application`].
    pub fn application<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        RpcError::Application(Arc::new(err))
    }

    /// Build a transport error from anything printable.
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        RpcError::Transport(msg.to_string())
    }

    /// Whether another attempt may change the outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RpcError::Application(_))
    }

    /// True when the request was refused before being processed (throttled,
    /// breaker open, nothing to call). Rejections never count against an
    /// instance's health.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RpcError::RateLimited | RpcError::CircuitOpen | RpcError::NoEndpoints
        )
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::RateLimited => "rate_limited",
            RpcError::CircuitOpen => "circuit_open",
            RpcError::NoEndpoints => "no_endpoints",
            RpcError::Transport(_) => "transport",
            RpcError::Application(_) => "application",
            RpcError::DeadlineExceeded => "deadline_exceeded",
        }
    }

    /// Recover the business error value, if it is of type `E`.
    pub fn downcast_application<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            RpcError::Application(err) => (&**err as &(dyn StdError + 'static)).downcast_ref::<E>(),
            _ => None,
        }
    }
}
