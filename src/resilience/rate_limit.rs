//! Token-bucket admission control.
//!
//! Acquisition never waits: a call either takes a token immediately or fails
//! with [`RpcError::RateLimited`] without reaching the wrapped endpoint.
//! Tokens are refilled lazily from the time elapsed since the last refill.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{self, BoxFuture};
use tokio::time::Instant;
use tower::Layer;

use crate::endpoint::{CallContext, Endpoint};
use crate::error::RpcError;
use crate::observability::metrics;

/// A token bucket.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shareable handle to one bucket.
///
/// Clones share the bucket; every wrapper built from the same limiter draws
/// from the same tokens.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<TokenBucket>>,
}

impl RateLimiter {
    /// `capacity` is the burst size, `refill_rate` the steady-state calls/sec.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            bucket: Arc::new(Mutex::new(TokenBucket::new(capacity as f64, refill_rate))),
        }
    }

    /// Take one token if available.
    pub fn try_acquire(&self) -> bool {
        self.bucket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(Instant::now())
    }

    /// Tokens currently available (after refill).
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(Instant::now());
        bucket.tokens
    }
}

#[derive(Debug, Clone)]
enum Scope {
    /// A fresh bucket for every wrapped endpoint.
    PerEndpoint { capacity: u32, refill_rate: f64 },
    /// One bucket for everything this layer wraps.
    Shared(RateLimiter),
}

/// Layer producing [`RateLimit`] endpoints.
#[derive(Debug, Clone)]
pub struct RateLimitLayer {
    scope: Scope,
    label: &'static str,
}

impl RateLimitLayer {
    /// Every endpoint wrapped by this layer gets its own bucket, owned by
    /// the wrapper and dropped with it.
    pub fn per_endpoint(capacity: u32, refill_rate: f64) -> Self {
        Self {
            scope: Scope::PerEndpoint {
                capacity,
                refill_rate,
            },
            label: "instance",
        }
    }

    /// All endpoints wrapped by this layer share `limiter`.
    pub fn shared(limiter: RateLimiter) -> Self {
        Self {
            scope: Scope::Shared(limiter),
            label: "method",
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimit<S>;

    fn layer(&self, inner: S) -> Self::Service {
        let limiter = match &self.scope {
            Scope::PerEndpoint {
                capacity,
                refill_rate,
            } => RateLimiter::new(*capacity, *refill_rate),
            Scope::Shared(limiter) => limiter.clone(),
        };
        RateLimit {
            inner,
            limiter,
            label: self.label,
        }
    }
}

/// Endpoint wrapper that rejects calls once the bucket is empty.
pub struct RateLimit<S> {
    inner: S,
    limiter: RateLimiter,
    label: &'static str,
}

impl<S> RateLimit<S> {
    /// Guard one endpoint with `limiter`; rejections are reported under the
    /// `instance` scope.
    pub fn new(inner: S, limiter: RateLimiter) -> Self {
        Self {
            inner,
            limiter,
            label: "instance",
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Scope label rejections are counted under: `instance` or `method`.
    pub fn scope(&self) -> &'static str {
        self.label
    }
}

impl<Req, Resp, S> Endpoint<Req, Resp> for RateLimit<S>
where
    S: Endpoint<Req, Resp>,
    Resp: Send + 'static,
{
    fn invoke(&self, ctx: CallContext, request: Req) -> BoxFuture<'static, Result<Resp, RpcError>> {
        if !self.limiter.try_acquire() {
            tracing::debug!(request_id = %ctx.request_id(), scope = self.label, "Rate limit exceeded");
            metrics::record_rate_limited(self.label);
            return Box::pin(future::ready(Err(RpcError::RateLimited)));
        }
        self.inner.invoke(ctx, request)
    }
}
