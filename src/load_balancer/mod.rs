//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Instancer snapshot
//!     → cache.rs (EndpointCache: build new entries via factory.rs, release removed)
//!     → atomically published live list
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through live endpoints)
//!         - random.rs (uniform pick)
//!     → Return one endpoint or NoEndpoints
//! ```
//!
//! # Design Decisions
//! - Balancers are stateless apart from their cursor; the live list is re-read on
//!   every selection, never cached between calls
//! - Per-instance resilience state (breaker, bucket) is owned by the cache entry
//! - Dialing is deferred to first use; building an entry never blocks

pub mod cache;
pub mod factory;
pub mod random;
pub mod round_robin;

use std::sync::Arc;

use crate::discovery::Instance;
use crate::endpoint::BoxEndpoint;
use crate::error::RpcError;

pub use cache::{CacheOptions, EndpointCache};
pub use factory::{factory_fn, layered, ConnectionHandle, Factory};
pub use random::Random;
pub use round_robin::RoundRobin;

/// A live endpoint together with the instance it calls.
pub struct InstanceEndpoint<Req, Resp> {
    pub instance: Instance,
    pub endpoint: BoxEndpoint<Req, Resp>,
}

impl<Req, Resp> Clone for InstanceEndpoint<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

impl<Req, Resp> std::fmt::Debug for InstanceEndpoint<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceEndpoint")
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

/// Read access to the current live endpoint set.
pub trait Endpointer<Req, Resp>: Send + Sync + 'static {
    fn endpoints(&self) -> Arc<Vec<InstanceEndpoint<Req, Resp>>>;
}

/// Picks one live endpoint per call.
pub trait Balancer<Req, Resp>: Send + Sync + 'static {
    fn select(&self) -> Result<InstanceEndpoint<Req, Resp>, RpcError>;
}

/// Fixed endpoint list, mostly useful in tests and for static wiring.
impl<Req: 'static, Resp: 'static> Endpointer<Req, Resp> for Arc<Vec<InstanceEndpoint<Req, Resp>>> {
    fn endpoints(&self) -> Arc<Vec<InstanceEndpoint<Req, Resp>>> {
        self.clone()
    }
}
