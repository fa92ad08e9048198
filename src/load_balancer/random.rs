//! Uniform random load balancing strategy.

use std::sync::Arc;

use crate::error::RpcError;
use crate::load_balancer::{Balancer, Endpointer, InstanceEndpoint};

pub struct Random<Req, Resp> {
    endpointer: Arc<dyn Endpointer<Req, Resp>>,
}

impl<Req, Resp> Random<Req, Resp> {
    pub fn new(endpointer: Arc<dyn Endpointer<Req, Resp>>) -> Self {
        Self { endpointer }
    }
}

impl<Req: 'static, Resp: 'static> Balancer<Req, Resp> for Random<Req, Resp> {
    fn select(&self) -> Result<InstanceEndpoint<Req, Resp>, RpcError> {
        let endpoints = self.endpointer.endpoints();
        if endpoints.is_empty() {
            return Err(RpcError::NoEndpoints);
        }
        Ok(endpoints[fastrand::usize(..endpoints.len())].clone())
    }
}
