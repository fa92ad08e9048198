//! Resilient RPC invocation layer.
//!
//! Given a logical service name, discovers live instances, balances calls
//! across them, retries failed attempts within a time budget, throttles call
//! rate and isolates failing instances with per-instance circuit breakers.
//! The layer is transport-agnostic: everything above the [`load_balancer::Factory`]
//! only sees the [`endpoint::Endpoint`] contract.

// Core abstractions
pub mod endpoint;
pub mod error;
pub mod middleware;

// Invocation layer
pub mod discovery;
pub mod load_balancer;
pub mod resilience;

// Service and transports
pub mod addsvc;
pub mod gateway;
pub mod http;
pub mod jsonrpc;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use endpoint::{endpoint_fn, BoxEndpoint, CallContext, Endpoint};
pub use error::{RpcError, RpcResult};
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
