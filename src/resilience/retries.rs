//! Retry orchestration over a balancer.
//!
//! # Responsibilities
//! - Issue up to `max_attempts` attempts, each against a freshly selected endpoint
//! - Bound the whole logical call (not each attempt) by one deadline
//! - Stop immediately on a business error; retry everything else
//! - Keep a record of every attempt for logging and callers that want it
//!
//! # Design Decisions
//! - `NoEndpoints` from the balancer is retried (an instance may appear) and
//!   consumes an attempt
//! - An in-flight attempt is cancelled when the deadline passes
//! - Optional jittered backoff between attempts never sleeps past the deadline
//! - Exhaustion surfaces the last observed error verbatim

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::Instant;

use crate::discovery::Instance;
use crate::endpoint::{CallContext, Endpoint};
use crate::error::RpcError;
use crate::load_balancer::Balancer;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::resilience::timeouts::with_deadline;

/// Retry budget for one logical call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least one is always made).
    pub max_attempts: u32,
    /// Deadline for the whole logical call.
    pub timeout: Duration,
    /// Base delay for exponential backoff in milliseconds (0 disables).
    pub base_delay_ms: u64,
    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_millis(500),
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

/// One attempt of a logical call.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// 1-based attempt index.
    pub attempt: u32,
    /// Instance the balancer picked, `None` when selection failed.
    pub instance: Option<Instance>,
    /// `None` on success.
    pub error: Option<RpcError>,
    pub elapsed: Duration,
}

/// Result of a logical call plus its attempt history.
#[derive(Debug)]
pub struct CallReport<Resp> {
    pub result: Result<Resp, RpcError>,
    pub attempts: Vec<AttemptRecord>,
}

impl<Resp> CallReport<Resp> {
    pub fn into_result(self) -> Result<Resp, RpcError> {
        self.result
    }
}

/// Endpoint that drives a [`Balancer`] under a [`RetryPolicy`].
pub struct Retry<Req, Resp> {
    method: Arc<str>,
    balancer: Arc<dyn Balancer<Req, Resp>>,
    policy: RetryPolicy,
}

impl<Req, Resp> Retry<Req, Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    pub fn new(method: impl Into<Arc<str>>, balancer: Arc<dyn Balancer<Req, Resp>>, policy: RetryPolicy) -> Self {
        Self {
            method: method.into(),
            balancer,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the logical call and return every attempt alongside the result.
    pub async fn call(&self, ctx: CallContext, request: Req) -> CallReport<Resp> {
        run(
            self.method.clone(),
            self.balancer.clone(),
            self.policy.clone(),
            ctx,
            request,
        )
        .await
    }
}

impl<Req, Resp> Endpoint<Req, Resp> for Retry<Req, Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    fn invoke(&self, ctx: CallContext, request: Req) -> BoxFuture<'static, Result<Resp, RpcError>> {
        let method = self.method.clone();
        let balancer = self.balancer.clone();
        let policy = self.policy.clone();
        Box::pin(async move { run(method, balancer, policy, ctx, request).await.into_result() })
    }
}

async fn run<Req, Resp>(
    method: Arc<str>,
    balancer: Arc<dyn Balancer<Req, Resp>>,
    policy: RetryPolicy,
    ctx: CallContext,
    request: Req,
) -> CallReport<Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    let ctx = ctx.with_timeout(policy.timeout);
    let max_attempts = policy.max_attempts.max(1);
    let backoff = Backoff::from_millis(policy.base_delay_ms, policy.max_delay_ms);
    let mut attempts = Vec::with_capacity(max_attempts as usize);
    let mut last_error: Option<RpcError> = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let delay = backoff.delay(attempt - 1);
            if !delay.is_zero() {
                if ctx.remaining().is_some_and(|left| left <= delay) {
                    break;
                }
                tokio::time::sleep(delay).await;
            }
        }
        if ctx.is_expired() {
            break;
        }

        let started = Instant::now();
        let selected = match balancer.select() {
            Ok(selected) => selected,
            Err(e) => {
                tracing::debug!(method = %method, attempt, error = %e, "Endpoint selection failed");
                metrics::record_attempt(&method, e.kind());
                attempts.push(AttemptRecord {
                    attempt,
                    instance: None,
                    error: Some(e.clone()),
                    elapsed: started.elapsed(),
                });
                last_error = Some(e);
                continue;
            }
        };

        let call = selected.endpoint.invoke(ctx.clone(), request.clone());
        let result = with_deadline(ctx.deadline(), call).await;
        let elapsed = started.elapsed();

        match result {
            Ok(response) => {
                metrics::record_attempt(&method, "success");
                attempts.push(AttemptRecord {
                    attempt,
                    instance: Some(selected.instance),
                    error: None,
                    elapsed,
                });
                return CallReport {
                    result: Ok(response),
                    attempts,
                };
            }
            Err(e) => {
                metrics::record_attempt(&method, e.kind());
                tracing::debug!(
                    method = %method,
                    request_id = %ctx.request_id(),
                    attempt,
                    instance = %selected.instance,
                    error = %e,
                    "Attempt failed"
                );
                attempts.push(AttemptRecord {
                    attempt,
                    instance: Some(selected.instance),
                    error: Some(e.clone()),
                    elapsed,
                });
                if !e.is_retryable() {
                    return CallReport {
                        result: Err(e),
                        attempts,
                    };
                }
                last_error = Some(e);
            }
        }
    }

    let error = last_error.unwrap_or(RpcError::DeadlineExceeded);
    tracing::warn!(
        method = %method,
        request_id = %ctx.request_id(),
        attempts = attempts.len(),
        error = %error,
        "Call failed after retries"
    );
    CallReport {
        result: Err(error),
        attempts,
    }
}
