//! The endpoint abstraction.
//!
//! An endpoint is a single asynchronous callable: request in, response or
//! [`RpcError`] out. It knows nothing about transports, discovery or
//! resilience policy; those are layered around it (see [`crate::middleware`]).
//!
//! Futures returned by [`Endpoint::invoke`] are `'static` so that wrappers can
//! move them into timers and spawned tasks. Dropping the future cancels the
//! call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::RpcError;

/// Per-call context propagated through every layer.
#[derive(Debug, Clone)]
pub struct CallContext {
    request_id: Uuid,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context with a fresh request id and no deadline.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            deadline: None,
        }
    }

    /// A context continuing an existing request id (e.g. from `x-request-id`).
    pub fn with_request_id(request_id: Uuid) -> Self {
        Self {
            request_id,
            deadline: None,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Tighten the deadline. A later deadline than the current one is ignored.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Tighten the deadline to `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Time left until the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A single asynchronous callable.
pub trait Endpoint<Req, Resp>: Send + Sync + 'static {
    fn invoke(&self, ctx: CallContext, request: Req) -> BoxFuture<'static, Result<Resp, RpcError>>;
}

/// Shared, type-erased endpoint.
pub type BoxEndpoint<Req, Resp> = Arc<dyn Endpoint<Req, Resp>>;

impl<Req, Resp, E> Endpoint<Req, Resp> for Arc<E>
where
    E: Endpoint<Req, Resp> + ?Sized,
{
    fn invoke(&self, ctx: CallContext, request: Req) -> BoxFuture<'static, Result<Resp, RpcError>> {
        (**self).invoke(ctx, request)
    }
}

/// Endpoint backed by an async closure. Built with [`endpoint_fn`].
pub struct FnEndpoint<F> {
    f: F,
}

impl<Req, Resp, F, Fut> Endpoint<Req, Resp> for FnEndpoint<F>
where
    F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
{
    fn invoke(&self, ctx: CallContext, request: Req) -> BoxFuture<'static, Result<Resp, RpcError>> {
        Box::pin((self.f)(ctx, request))
    }
}

/// Turn an async closure into a [`BoxEndpoint`].
pub fn endpoint_fn<Req, Resp, F, Fut>(f: F) -> BoxEndpoint<Req, Resp>
where
    Req: 'static,
    Resp: 'static,
    F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
{
    Arc::new(FnEndpoint { f })
}
