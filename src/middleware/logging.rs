//! Per-call logging middleware.
//!
//! Emits one structured event per call with the method name, the request id,
//! the elapsed time and the error kind (if any).

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tower::Layer;

use crate::endpoint::{CallContext, Endpoint};
use crate::error::RpcError;

/// Layer producing [`Logging`] endpoints.
#[derive(Debug, Clone)]
pub struct LoggingLayer {
    method: Arc<str>,
}

impl LoggingLayer {
    pub fn new(method: impl Into<Arc<str>>) -> Self {
        Self {
            method: method.into(),
        }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            method: self.method.clone(),
        }
    }
}

/// Endpoint wrapper that logs every call.
pub struct Logging<S> {
    inner: S,
    method: Arc<str>,
}

impl<Req, Resp, S> Endpoint<Req, Resp> for Logging<S>
where
    S: Endpoint<Req, Resp>,
    Resp: Send + 'static,
{
    fn invoke(&self, ctx: CallContext, request: Req) -> BoxFuture<'static, Result<Resp, RpcError>> {
        let method = self.method.clone();
        let request_id = ctx.request_id();
        let started = Instant::now();
        let call = self.inner.invoke(ctx, request);

        Box::pin(async move {
            let result = call.await;
            let took_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(_) => tracing::info!(
                    method = %method,
                    request_id = %request_id,
                    took_ms,
                    "call succeeded"
                ),
                Err(e) => tracing::info!(
                    method = %method,
                    request_id = %request_id,
                    took_ms,
                    kind = e.kind(),
                    error = %e,
                    "call failed"
                ),
            }
            result
        })
    }
}
