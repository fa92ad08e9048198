//! Metrics middleware: call count and latency per logical method.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tower::Layer;

use crate::endpoint::{CallContext, Endpoint};
use crate::error::RpcError;
use crate::observability::metrics;

#[derive(Debug, Clone)]
pub struct InstrumentLayer {
    method: Arc<str>,
}

impl InstrumentLayer {
    pub fn new(method: impl Into<Arc<str>>) -> Self {
        Self {
            method: method.into(),
        }
    }
}

impl<S> Layer<S> for InstrumentLayer {
    type Service = Instrument<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Instrument {
            inner,
            method: self.method.clone(),
        }
    }
}

pub struct Instrument<S> {
    inner: S,
    method: Arc<str>,
}

impl<Req, Resp, S> Endpoint<Req, Resp> for Instrument<S>
where
    S: Endpoint<Req, Resp>,
    Resp: Send + 'static,
{
    fn invoke(&self, ctx: CallContext, request: Req) -> BoxFuture<'static, Result<Resp, RpcError>> {
        let method = self.method.clone();
        let started = Instant::now();
        let call = self.inner.invoke(ctx, request);

        Box::pin(async move {
            let result = call.await;
            let outcome = match &result {
                Ok(_) => "success",
                Err(e) => e.kind(),
            };
            metrics::record_call(&method, outcome, started);
            result
        })
    }
}
