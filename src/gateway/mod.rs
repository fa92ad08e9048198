//! API gateway: the client side of the add service.
//!
//! # Data Flow
//! ```text
//! discovery (static list or watched file)
//!     → one MethodStack per operation (stack.rs)
//!     → addsvc::Endpoints backed by the stacks
//!     → router.rs (POST /addsvc/sum, POST /addsvc/concat, GET /instances, GET /health)
//! ```

pub mod router;
pub mod stack;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::addsvc::{ConcatRequest, ConcatResponse, Endpoints, ServiceError, SumRequest, SumResponse};
use crate::config::{DiscoveryConfig, GatewayConfig, Protocol};
use crate::discovery::{FileInstancer, FixedInstancer, Instance, Instancer};
use crate::error::RpcError;
use crate::http::{HttpFactory, RemoteError};
use crate::jsonrpc::JsonRpcFactory;
use crate::lifecycle::Shutdown;
use crate::load_balancer::Factory;

pub use router::gateway_router;
pub use stack::MethodStack;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("building HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("watching instance file: {0}")]
    Discovery(#[from] notify::Error),
}

/// Pick the instancer the config asks for.
pub fn instancer_from_config(discovery: &DiscoveryConfig) -> Result<Arc<dyn Instancer>, GatewayError> {
    match &discovery.file {
        Some(path) => Ok(Arc::new(FileInstancer::watch(path)?)),
        None => Ok(Arc::new(FixedInstancer::new(discovery.instances.iter().cloned()))),
    }
}

/// Map a remote business error message back to the add service's error type.
pub fn decode_service_error(message: &str) -> RpcError {
    match ServiceError::from_message(message) {
        Some(err) => RpcError::application(err),
        None => RpcError::application(RemoteError(message.to_string())),
    }
}

/// The assembled gateway.
pub struct Gateway {
    sum: MethodStack<SumRequest, SumResponse>,
    concat: MethodStack<ConcatRequest, ConcatResponse>,
    // Dropping the instancer would stop file watching.
    _instancer: Arc<dyn Instancer>,
}

impl Gateway {
    /// Build both method stacks over the configured protocol. Must be called from within a Tokio runtime.
    pub fn new(config: &GatewayConfig, instancer: Arc<dyn Instancer>, shutdown: &Shutdown) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.transport.connect_timeout_ms))
            .build()?;

        let protocol = config.transport.protocol;

        let sum = MethodStack::build(
            "sum",
            factory_for::<SumRequest, SumResponse>(protocol, &client, "sum"),
            instancer.subscribe(),
            config,
            shutdown.subscribe(),
        );
        let concat = MethodStack::build(
            "concat",
            factory_for::<ConcatRequest, ConcatResponse>(protocol, &client, "concat"),
            instancer.subscribe(),
            config,
            shutdown.subscribe(),
        );

        tracing::info!(service = %config.discovery.service, protocol = ?protocol, "Gateway assembled");
        Ok(Self {
            sum,
            concat,
            _instancer: instancer,
        })
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            sum: self.sum.endpoint(),
            concat: self.concat.endpoint(),
        }
    }

    /// Live instances per method.
    pub fn instances(&self) -> BTreeMap<&'static str, Vec<String>> {
        BTreeMap::from([
            (self.sum.method(), addresses(self.sum.cache().instances())),
            (self.concat.method(), addresses(self.concat.cache().instances())),
        ])
    }

    /// Wait until both caches are closed (after shutdown).
    pub async fn join(&self) {
        self.sum.join().await;
        self.concat.join().await;
    }
}

/// The instance factory for one method over the configured protocol.
fn factory_for<Req, Resp>(protocol: Protocol, client: &reqwest::Client, method: &str) -> Arc<dyn Factory<Req, Resp>>
where
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    match protocol {
        Protocol::Http => {
            Arc::new(HttpFactory::with_client(client.clone(), format!("/{method}")).with_error_decoder(decode_service_error))
        }
        Protocol::JsonRpc => {
            Arc::new(JsonRpcFactory::with_client(client.clone(), method).with_error_decoder(decode_service_error))
        }
    }
}

fn addresses(instances: Vec<Instance>) -> Vec<String> {
    instances.iter().map(ToString::to_string).collect()
}
