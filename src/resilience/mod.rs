//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Logical call:
//!     → retries.rs (up to N attempts within one deadline)
//!         → balancer selects a per-instance endpoint
//!         → timeouts.rs (attempt bounded by the remaining time)
//!         → circuit_breaker.rs (per instance: fail fast when open)
//!         → rate_limit.rs (token bucket: reject when empty, never wait)
//!         → transport client
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every logical call has a deadline
//! - Business errors are final; everything else may be retried elsewhere
//! - Circuit breaker and bucket state belong to the endpoint they wrap
//! - All resilience logic is composable middleware

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limit;
pub mod retries;
pub mod timeouts;

pub use backoff::Backoff;
pub use circuit_breaker::{Breaker, BreakerConfig, CircuitBreaker, CircuitBreakerLayer, CircuitState, TripPolicy};
pub use rate_limit::{RateLimit, RateLimitLayer, RateLimiter};
pub use retries::{AttemptRecord, CallReport, Retry, RetryPolicy};
