//! JSON-RPC 2.0 transport.
//!
//! The second wire protocol of the add service. Both protocols drive the same
//! endpoint sets: only the envelope and the error mapping change.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     POST /rpc → server.rs (envelope → method → composed endpoint) → result | error object
//!
//! Outbound:
//!     EndpointCache → client.rs (JsonRpcFactory builds one endpoint per instance)
//!         → POST envelope to http://{instance}/rpc, request id as envelope id
//!         → error code → RpcError
//! ```

pub mod client;
pub mod server;
pub mod types;

pub use client::JsonRpcFactory;
pub use server::rpc_router;
pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RPC_PATH};
