//! Client-side stack for one logical method.
//!
//! # Composition (outermost first)
//! ```text
//! logging → instrument → Retry → RoundRobin → EndpointCache
//!                                                 └─ per instance: circuit_breaker → rate_limit → transport
//! ```
//! The limiter sits inside the breaker so that a locally rejected call reaches
//! the breaker as a neutral result and never counts as a backend failure.
//! Both live in the instance's cache entry and are dropped with it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::{GatewayConfig, RateLimitScope};
use crate::discovery::{Instance, Snapshot};
use crate::endpoint::BoxEndpoint;
use crate::load_balancer::{layered, Balancer, CacheOptions, EndpointCache, Endpointer, Factory, RoundRobin};
use crate::middleware::{Chain, InstrumentLayer, LoggingLayer};
use crate::resilience::{CircuitBreakerLayer, RateLimitLayer, RateLimiter, Retry};

/// Everything assembled for one method.
pub struct MethodStack<Req, Resp> {
    method: &'static str,
    endpoint: BoxEndpoint<Req, Resp>,
    cache: Arc<EndpointCache<Req, Resp>>,
    updater: Mutex<Option<JoinHandle<()>>>,
}

impl<Req, Resp> MethodStack<Req, Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    /// Assemble the stack and start following `snapshots`.
    /// Must be called from within a Tokio runtime.
    pub fn build(
        method: &'static str,
        factory: Arc<dyn Factory<Req, Resp>>,
        snapshots: watch::Receiver<Snapshot>,
        config: &GatewayConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let factory = layered(factory, instance_chain(method, config));
        let options = CacheOptions {
            invalidate_on_error: config.discovery.invalidate_on_error_secs.map(Duration::from_secs),
        };
        let cache = Arc::new(EndpointCache::new(method, factory, options));
        let updater = cache.spawn(snapshots, shutdown);

        let endpointer: Arc<dyn Endpointer<Req, Resp>> = cache.clone();
        let balancer: Arc<dyn Balancer<Req, Resp>> = Arc::new(RoundRobin::new(endpointer));
        let retry: BoxEndpoint<Req, Resp> = Arc::new(Retry::new(method, balancer, config.retry.policy()));
        let endpoint = Chain::new()
            .layer("logging", LoggingLayer::new(method))
            .layer("instrument", InstrumentLayer::new(method))
            .apply(retry);

        tracing::info!(method, "Method stack assembled");
        Self {
            method,
            endpoint,
            cache,
            updater: Mutex::new(Some(updater)),
        }
    }
}

impl<Req, Resp> MethodStack<Req, Resp> {
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// The composed, externally callable endpoint.
    pub fn endpoint(&self) -> BoxEndpoint<Req, Resp> {
        self.endpoint.clone()
    }

    pub fn cache(&self) -> &Arc<EndpointCache<Req, Resp>> {
        &self.cache
    }

    /// Wait for the cache updater to finish (after shutdown). Later calls return immediately.
    pub async fn join(&self) {
        let updater = self.updater.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(updater) = updater {
            if let Err(e) = updater.await {
                tracing::error!(method = self.method, error = %e, "Cache updater failed");
            }
        }
    }
}

/// Per-instance chain factory: a fresh breaker (and bucket, for instance scope)
/// for every instance the cache builds.
fn instance_chain<Req, Resp>(
    method: &'static str,
    config: &GatewayConfig,
) -> impl Fn(&Instance) -> Chain<Req, Resp> + Send + Sync + 'static
where
    Req: 'static,
    Resp: Send + 'static,
{
    let breaker = config.circuit_breaker.breaker_config();
    let rate_limit = config.rate_limit.clone();
    let method_bucket = RateLimiter::new(rate_limit.capacity, rate_limit.refill_rate);

    move |instance: &Instance| {
        let chain = Chain::new().layer(
            "circuit_breaker",
            CircuitBreakerLayer::new(format!("{method}@{instance}"), breaker.clone()).with_group(method),
        );
        if !rate_limit.enabled {
            return chain;
        }
        let limiter = match rate_limit.scope {
            RateLimitScope::Instance => RateLimitLayer::per_endpoint(rate_limit.capacity, rate_limit.refill_rate),
            RateLimitScope::Method => RateLimitLayer::shared(method_bucket.clone()),
        };
        chain.layer("rate_limit", limiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::discovery::{InstancePublisher, Instancer};
    use crate::endpoint::{endpoint_fn, CallContext};
    use crate::error::RpcError;
    use crate::load_balancer::{factory_fn, ConnectionHandle};

    /// In-memory instances answering with their own address. Instances listed
    /// in `down` fail with a transport error.
    struct Backends {
        down: Mutex<Vec<String>>,
        released: Mutex<HashMap<String, usize>>,
    }

    fn backends() -> Arc<Backends> {
        Arc::new(Backends {
            down: Mutex::new(Vec::new()),
            released: Mutex::new(HashMap::new()),
        })
    }

    fn factory(backends: Arc<Backends>) -> Arc<dyn Factory<(), String>> {
        factory_fn(move |instance: &Instance| {
            let name = instance.to_string();
            let b = backends.clone();
            let key = name.clone();
            let ep: BoxEndpoint<(), String> = endpoint_fn(move |_ctx, _req: ()| {
                let failing = b.down.lock().unwrap().contains(&key);
                let name = key.clone();
                async move {
                    if failing {
                        Err(RpcError::transport(format!("{name} refused")))
                    } else {
                        Ok(name)
                    }
                }
            });
            let b = backends.clone();
            let handle = ConnectionHandle::new(move || {
                *b.released.lock().unwrap().entry(name).or_default() += 1;
            });
            Ok((ep, handle))
        })
    }

    async fn settle<F: Fn() -> bool>(done: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_alternates_then_drops_removed_instance() {
        let backends = backends();
        let publisher = InstancePublisher::new();
        publisher.publish(["a:1", "b:1"]);
        let (shutdown, _) = broadcast::channel(1);

        let stack = MethodStack::build(
            "sum",
            factory(backends.clone()),
            publisher.subscribe(),
            &GatewayConfig::default(),
            shutdown.subscribe(),
        );
        settle(|| stack.cache().instances().len() == 2).await;

        let ep = stack.endpoint();
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(ep.invoke(CallContext::new(), ()).await.unwrap());
        }
        assert_eq!(seen, vec!["a:1", "b:1", "a:1", "b:1"]);

        publisher.publish(["a:1"]);
        settle(|| stack.cache().instances().len() == 1).await;
        for _ in 0..3 {
            assert_eq!(ep.invoke(CallContext::new(), ()).await.unwrap(), "a:1");
        }
        assert_eq!(backends.released.lock().unwrap().get("b:1"), Some(&1));

        shutdown.send(()).unwrap();
        stack.join().await;
        assert_eq!(backends.released.lock().unwrap().get("a:1"), Some(&1));
    }

    #[tokio::test]
    async fn test_failed_instance_is_retried_elsewhere_and_tripped() {
        let backends = backends();
        backends.down.lock().unwrap().push("a:1".into());
        let publisher = InstancePublisher::new();
        publisher.publish(["a:1", "b:1"]);
        let (shutdown, _) = broadcast::channel(1);

        let mut config = GatewayConfig::default();
        config.circuit_breaker.consecutive_failures = 2;
        let stack = MethodStack::build("sum", factory(backends), publisher.subscribe(), &config, shutdown.subscribe());
        settle(|| stack.cache().instances().len() == 2).await;

        let ep = stack.endpoint();
        for _ in 0..6 {
            assert_eq!(ep.invoke(CallContext::new(), ()).await.unwrap(), "b:1");
        }
    }

    #[tokio::test]
    async fn test_method_scope_shares_one_bucket() {
        let publisher = InstancePublisher::new();
        publisher.publish(["a:1", "b:1"]);
        let (shutdown, _) = broadcast::channel(1);

        let mut config = GatewayConfig::default();
        config.rate_limit.enabled = true;
        config.rate_limit.capacity = 2;
        config.rate_limit.refill_rate = 0.001;
        config.rate_limit.scope = RateLimitScope::Method;
        config.retry.max_attempts = 1;
        let stack = MethodStack::build("sum", factory(backends()), publisher.subscribe(), &config, shutdown.subscribe());
        settle(|| stack.cache().instances().len() == 2).await;

        let ep = stack.endpoint();
        assert!(ep.invoke(CallContext::new(), ()).await.is_ok());
        assert!(ep.invoke(CallContext::new(), ()).await.is_ok());
        assert!(matches!(ep.invoke(CallContext::new(), ()).await, Err(RpcError::RateLimited)));
    }

    #[tokio::test]
    async fn test_instance_scope_buckets_are_independent() {
        let publisher = InstancePublisher::new();
        publisher.publish(["a:1", "b:1"]);
        let (shutdown, _) = broadcast::channel(1);

        let mut config = GatewayConfig::default();
        config.rate_limit.enabled = true;
        config.rate_limit.capacity = 1;
        config.rate_limit.refill_rate = 0.001;
        config.retry.max_attempts = 1;
        let stack = MethodStack::build("sum", factory(backends()), publisher.subscribe(), &config, shutdown.subscribe());
        settle(|| stack.cache().instances().len() == 2).await;

        let ep = stack.endpoint();
        assert_eq!(ep.invoke(CallContext::new(), ()).await.unwrap(), "a:1");
        assert_eq!(ep.invoke(CallContext::new(), ()).await.unwrap(), "b:1");
        assert!(matches!(ep.invoke(CallContext::new(), ()).await, Err(RpcError::RateLimited)));
    }
}
