//! Request/response types and the endpoint set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::addsvc::service::AddService;
use crate::config::LimitConfig;
use crate::endpoint::{endpoint_fn, BoxEndpoint, CallContext, Endpoint};
use crate::error::RpcError;
use crate::middleware::{Chain, InstrumentLayer, LoggingLayer};
use crate::resilience::{RateLimitLayer, RateLimiter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SumRequest {
    pub a: i32,
    pub b: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SumResponse {
    pub v: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcatRequest {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcatResponse {
    pub v: String,
}

/// One endpoint per operation.
#[derive(Clone)]
pub struct Endpoints {
    pub sum: BoxEndpoint<SumRequest, SumResponse>,
    pub concat: BoxEndpoint<ConcatRequest, ConcatResponse>,
}

impl Endpoints {
    /// Bare endpoints over `svc`, no middleware.
    pub fn from_service(svc: Arc<dyn AddService>) -> Self {
        Self {
            sum: make_sum_endpoint(svc.clone()),
            concat: make_concat_endpoint(svc),
        }
    }

    /// Server-side set: each method is logged, instrumented and rate limited.
    pub fn server(svc: Arc<dyn AddService>, sum_limit: &LimitConfig, concat_limit: &LimitConfig) -> Self {
        let bare = Self::from_service(svc);
        Self {
            sum: server_chain("sum", sum_limit).apply(bare.sum),
            concat: server_chain("concat", concat_limit).apply(bare.concat),
        }
    }

    pub async fn sum(&self, ctx: CallContext, a: i32, b: i32) -> Result<i32, RpcError> {
        Ok(self.sum.invoke(ctx, SumRequest { a, b }).await?.v)
    }

    pub async fn concat(&self, ctx: CallContext, a: &str, b: &str) -> Result<String, RpcError> {
        let request = ConcatRequest {
            a: a.to_string(),
            b: b.to_string(),
        };
        Ok(self.concat.invoke(ctx, request).await?.v)
    }
}

fn server_chain<Req: 'static, Resp: Send + 'static>(method: &'static str, limit: &LimitConfig) -> Chain<Req, Resp> {
    Chain::new()
        .layer("logging", LoggingLayer::new(method))
        .layer("instrument", InstrumentLayer::new(method))
        .layer(
            "rate_limit",
            RateLimitLayer::shared(RateLimiter::new(limit.capacity, limit.refill_rate)),
        )
}

pub fn make_sum_endpoint(svc: Arc<dyn AddService>) -> BoxEndpoint<SumRequest, SumResponse> {
    endpoint_fn(move |_ctx, req: SumRequest| {
        let result = svc
            .sum(req.a, req.b)
            .map(|v| SumResponse { v })
            .map_err(RpcError::application);
        async move { result }
    })
}

pub fn make_concat_endpoint(svc: Arc<dyn AddService>) -> BoxEndpoint<ConcatRequest, ConcatResponse> {
    endpoint_fn(move |_ctx, req: ConcatRequest| {
        let result = svc
            .concat(&req.a, &req.b)
            .map(|v| ConcatResponse { v })
            .map_err(RpcError::application);
        async move { result }
    })
}
