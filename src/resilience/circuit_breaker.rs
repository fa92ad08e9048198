//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: trip policy satisfied (consecutive failures or failure ratio)
//! Open → Half-Open: after open_timeout, evaluated lazily on the next call
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails (cooldown restarts)
//! ```
//!
//! # Design Decisions
//! - Per-endpoint circuit breaker (not global); it lives and dies with the
//!   cache entry that owns the wrapped endpoint
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial call in Half-Open (prevents hammering recovering backend)
//! - Results of calls admitted before the last state change are ignored
//! - Local rejections are neutral; business errors count as successes

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{self, BoxFuture};
use tokio::time::Instant;
use tower::Layer;

use crate::endpoint::{CallContext, Endpoint};
use crate::error::RpcError;
use crate::observability::metrics;

/// Breaker state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed = 0,
    HalfOpen = 1,
    Open = 2,
}

/// When a closed breaker trips.
#[derive(Debug, Clone, PartialEq)]
pub enum TripPolicy {
    /// Trip after this many consecutive failures.
    ConsecutiveFailures(u32),
    /// Trip once `failures / (successes + failures) >= ratio` with at least
    /// `min_requests` recorded results inside the current window. Counts
    /// reset every `window`.
    FailureRatio {
        ratio: f64,
        min_requests: u32,
        window: Duration,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    pub trip: TripPolicy,
    /// Cooldown between tripping and letting a trial call through.
    pub open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            trip: TripPolicy::ConsecutiveFailures(5),
            open_timeout: Duration::from_secs(30),
        }
    }
}

/// How a finished call counts towards the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Rejected locally; says nothing about the backend.
    Neutral,
}

impl Outcome {
    pub fn classify<T>(result: &Result<T, RpcError>) -> Self {
        match result {
            Ok(_) | Err(RpcError::Application(_)) => Outcome::Success,
            Err(RpcError::Transport(_)) | Err(RpcError::DeadlineExceeded) => Outcome::Failure,
            Err(RpcError::RateLimited) | Err(RpcError::CircuitOpen) | Err(RpcError::NoEndpoints) => {
                Outcome::Neutral
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    successes: u32,
    failures: u32,
    consecutive_failures: u32,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    counts: Counts,
    generation: u64,
    window_start: Instant,
    tripped_at: Option<Instant>,
    trial_in_flight: bool,
}

/// The failure state machine for one wrapped target.
#[derive(Debug)]
pub struct Breaker {
    name: String,
    /// Label the open-circuit gauge is aggregated under.
    group: String,
    config: BreakerConfig,
    inner: Mutex<BreakerState>,
}

/// Admission ticket for one call. Dropping it unfinished records a failure,
/// which is what a cancelled (timed out) attempt is.
#[derive(Debug)]
pub struct Permit {
    breaker: Arc<Breaker>,
    generation: u64,
    trial: bool,
    finished: bool,
}

impl Permit {
    pub fn finish(mut self, outcome: Outcome) {
        self.finished = true;
        self.breaker.on_result(self.generation, self.trial, outcome);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker.on_result(self.generation, self.trial, Outcome::Failure);
        }
    }
}

impl Breaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let name = name.into();
        Self {
            group: name.clone(),
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                counts: Counts::default(),
                generation: 0,
                window_start: Instant::now(),
                tripped_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Report open circuits under `group` instead of the breaker's own name.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, applying the lazy Open → Half-Open transition.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    /// When the breaker last tripped.
    pub fn tripped_at(&self) -> Option<Instant> {
        self.lock().tripped_at
    }

    /// Ask to let one call through.
    pub fn acquire(self: &Arc<Self>) -> Result<Permit, RpcError> {
        let mut inner = self.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => return Err(RpcError::CircuitOpen),
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(RpcError::CircuitOpen);
                }
                inner.trial_in_flight = true;
                true
            }
        };

        Ok(Permit {
            breaker: Arc::clone(self),
            generation: inner.generation,
            trial,
            finished: false,
        })
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh(&self, inner: &mut BreakerState, now: Instant) {
        match inner.state {
            CircuitState::Open => {
                let cooled = inner
                    .tripped_at
                    .map_or(true, |t| now.saturating_duration_since(t) >= self.config.open_timeout);
                if cooled {
                    self.transition(inner, CircuitState::HalfOpen, now);
                }
            }
            CircuitState::Closed => {
                if let TripPolicy::FailureRatio { window, .. } = self.config.trip {
                    if now.saturating_duration_since(inner.window_start) >= window {
                        inner.counts = Counts::default();
                        inner.window_start = now;
                        inner.generation += 1;
                    }
                }
            }
            CircuitState::HalfOpen => {}
        }
    }

    fn on_result(&self, generation: u64, trial: bool, outcome: Outcome) {
        let mut inner = self.lock();
        let now = Instant::now();

        if generation != inner.generation {
            return;
        }

        match (inner.state, outcome) {
            (CircuitState::HalfOpen, Outcome::Success) if trial => {
                self.transition(&mut inner, CircuitState::Closed, now);
            }
            (CircuitState::HalfOpen, Outcome::Failure) if trial => {
                self.transition(&mut inner, CircuitState::Open, now);
            }
            (CircuitState::HalfOpen, Outcome::Neutral) if trial => {
                inner.trial_in_flight = false;
            }
            (CircuitState::Closed, Outcome::Success) => {
                inner.counts.successes += 1;
                inner.counts.consecutive_failures = 0;
            }
            (CircuitState::Closed, Outcome::Failure) => {
                inner.counts.failures += 1;
                inner.counts.consecutive_failures += 1;
                if self.should_trip(&inner.counts) {
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
            _ => {}
        }
    }

    fn should_trip(&self, counts: &Counts) -> bool {
        match self.config.trip {
            TripPolicy::ConsecutiveFailures(threshold) => counts.consecutive_failures >= threshold,
            TripPolicy::FailureRatio {
                ratio,
                min_requests,
                ..
            } => {
                let total = counts.successes + counts.failures;
                total >= min_requests && total > 0 && counts.failures as f64 / total as f64 >= ratio
            }
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.counts = Counts::default();
        inner.window_start = now;
        inner.trial_in_flight = false;
        if to == CircuitState::Open {
            inner.tripped_at = Some(now);
        }

        match to {
            CircuitState::Open => tracing::warn!(breaker = %self.name, from = ?from, "Circuit opened"),
            _ => tracing::info!(breaker = %self.name, from = ?from, to = ?to, "Circuit state changed"),
        }
        if to == CircuitState::Open {
            metrics::record_circuit_opened(&self.group);
        } else if from == CircuitState::Open {
            metrics::record_circuit_closed(&self.group);
        }
    }
}

impl Drop for Breaker {
    fn drop(&mut self) {
        if self.lock().state == CircuitState::Open {
            metrics::record_circuit_closed(&self.group);
        }
    }
}

/// Layer producing [`CircuitBreaker`] endpoints. Every wrapped endpoint gets
/// its own fresh [`Breaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerLayer {
    name: String,
    group: Option<String>,
    config: BreakerConfig,
}

impl CircuitBreakerLayer {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            group: None,
            config,
        }
    }

    /// Aggregate the open-circuit gauge of every produced breaker under `group`.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreaker<S>;

    fn layer(&self, inner: S) -> Self::Service {
        let mut breaker = Breaker::new(self.name.clone(), self.config.clone());
        if let Some(group) = &self.group {
            breaker = breaker.with_group(group.clone());
        }
        CircuitBreaker::new(inner, Arc::new(breaker))
    }
}

/// Endpoint wrapper guarded by a [`Breaker`].
pub struct CircuitBreaker<S> {
    inner: S,
    breaker: Arc<Breaker>,
}

impl<S> CircuitBreaker<S> {
    pub fn new(inner: S, breaker: Arc<Breaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<Breaker> {
        &self.breaker
    }
}

impl<Req, Resp, S> Endpoint<Req, Resp> for CircuitBreaker<S>
where
    S: Endpoint<Req, Resp>,
    Resp: Send + 'static,
{
    fn invoke(&self, ctx: CallContext, request: Req) -> BoxFuture<'static, Result<Resp, RpcError>> {
        let permit = match self.breaker.acquire() {
            Ok(permit) => permit,
            Err(e) => return Box::pin(future::ready(Err(e))),
        };
        let call = self.inner.invoke(ctx, request);

        Box::pin(async move {
            let result = call.await;
            permit.finish(Outcome::classify(&result));
            result
        })
    }
}
