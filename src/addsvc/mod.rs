//! The add service: two pure operations exposed as endpoints.
//!
//! # Data Flow
//! ```text
//! Server side:  HTTP handler → logging → instrument → rate limit → BasicService
//! Client side:  gateway Retry(RoundRobin(EndpointCache(HttpFactory))) → Endpoints
//! ```
//!
//! Both sides expose the same [`Endpoints`] set, so callers do not care whether
//! an operation runs in-process or on a remote replica.

pub mod endpoints;
pub mod service;

pub use endpoints::{ConcatRequest, ConcatResponse, Endpoints, SumRequest, SumResponse};
pub use service::{AddService, BasicService, ServiceError};
