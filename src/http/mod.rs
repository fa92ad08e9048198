//! HTTP transport subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     TCP connection
//!         → server.rs (Axum setup, request id, timeout, trace)
//!         → request.rs (x-request-id → CallContext)
//!         → composed endpoint
//!         → response.rs (RpcError → status code + JSON body)
//!
//! Outbound:
//!     EndpointCache → client.rs (HttpFactory builds one reqwest endpoint per instance)
//!         → POST JSON to instance, x-request-id forwarded, deadline as timeout
//!         → status code → RpcError
//! ```

pub mod client;
pub mod request;
pub mod response;
pub mod server;

pub use client::{HttpFactory, RemoteError};
pub use request::{context_from_headers, X_REQUEST_ID};
pub use response::{status_for, ErrorBody, HttpError};
pub use server::{health, service_router, HttpServer};
