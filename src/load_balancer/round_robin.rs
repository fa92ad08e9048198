//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::RpcError;
use crate::load_balancer::{Balancer, Endpointer, InstanceEndpoint};

/// Round-robin selector.
/// Stores an internal counter to rotate through the live endpoints.
pub struct RoundRobin<Req, Resp> {
    endpointer: Arc<dyn Endpointer<Req, Resp>>,
    counter: AtomicUsize,
}

impl<Req, Resp> RoundRobin<Req, Resp> {
    pub fn new(endpointer: Arc<dyn Endpointer<Req, Resp>>) -> Self {
        Self {
            endpointer,
            counter: AtomicUsize::new(0),
        }
    }
}

impl<Req: 'static, Resp: 'static> Balancer<Req, Resp> for RoundRobin<Req, Resp> {
    fn select(&self) -> Result<InstanceEndpoint<Req, Resp>, RpcError> {
        // Length is taken from this call's snapshot; the set may have changed since the last call.
        let endpoints = self.endpointer.endpoints();
        if endpoints.is_empty() {
            return Err(RpcError::NoEndpoints);
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % endpoints.len();
        Ok(endpoints[index].clone())
    }
}
