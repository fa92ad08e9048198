//! Building client endpoints from instance addresses.
//!
//! # Responsibilities
//! - Turn an [`Instance`] into a callable endpoint plus a [`ConnectionHandle`]
//! - Optionally wrap every built endpoint in a per-instance middleware chain
//!
//! # Design Decisions
//! - `build` must not block: resolve/parse eagerly, dial lazily on first call
//! - Releasing a handle is idempotent; dropping an unreleased handle releases it

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::discovery::Instance;
use crate::endpoint::BoxEndpoint;
use crate::error::RpcError;
use crate::middleware::Chain;

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Releasable resources backing one built endpoint.
pub struct ConnectionHandle {
    released: AtomicBool,
    on_release: Mutex<Option<ReleaseFn>>,
}

impl ConnectionHandle {
    /// Handle that runs `on_release` the first time it is released.
    pub fn new(on_release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            released: AtomicBool::new(false),
            on_release: Mutex::new(Some(Box::new(on_release))),
        }
    }

    /// Handle with nothing to clean up.
    pub fn noop() -> Self {
        Self {
            released: AtomicBool::new(false),
            on_release: Mutex::new(None),
        }
    }

    /// Release the connection. Only the first call has an effect.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let on_release = self
            .on_release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(on_release) = on_release {
            on_release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Transport-specific endpoint builder.
pub trait Factory<Req, Resp>: Send + Sync + 'static {
    fn build(&self, instance: &Instance) -> Result<(BoxEndpoint<Req, Resp>, ConnectionHandle), RpcError>;
}

/// Factory backed by a closure. Built with [`factory_fn`].
pub struct FactoryFn<F> {
    f: F,
}

impl<Req, Resp, F> Factory<Req, Resp> for FactoryFn<F>
where
    F: Fn(&Instance) -> Result<(BoxEndpoint<Req, Resp>, ConnectionHandle), RpcError> + Send + Sync + 'static,
{
    fn build(&self, instance: &Instance) -> Result<(BoxEndpoint<Req, Resp>, ConnectionHandle), RpcError> {
        (self.f)(instance)
    }
}

pub fn factory_fn<Req, Resp, F>(f: F) -> Arc<dyn Factory<Req, Resp>>
where
    Req: 'static,
    Resp: 'static,
    F: Fn(&Instance) -> Result<(BoxEndpoint<Req, Resp>, ConnectionHandle), RpcError> + Send + Sync + 'static,
{
    Arc::new(FactoryFn { f })
}

type ChainFn<Req, Resp> = Arc<dyn Fn(&Instance) -> Chain<Req, Resp> + Send + Sync>;

/// Factory wrapping everything it builds in a per-instance chain.
pub struct Layered<Req, Resp> {
    inner: Arc<dyn Factory<Req, Resp>>,
    chain: ChainFn<Req, Resp>,
}

impl<Req: 'static, Resp: 'static> Factory<Req, Resp> for Layered<Req, Resp> {
    fn build(&self, instance: &Instance) -> Result<(BoxEndpoint<Req, Resp>, ConnectionHandle), RpcError> {
        let (endpoint, handle) = self.inner.build(instance)?;
        Ok(((self.chain)(instance).apply(endpoint), handle))
    }
}

/// Wrap `inner` so that every built endpoint goes through `chain(instance)`.
///
/// The chain is built per instance, so stateful stages (breakers, buckets)
/// belong to exactly one cache entry.
pub fn layered<Req, Resp, C>(inner: Arc<dyn Factory<Req, Resp>>, chain: C) -> Arc<dyn Factory<Req, Resp>>
where
    Req: 'static,
    Resp: 'static,
    C: Fn(&Instance) -> Chain<Req, Resp> + Send + Sync + 'static,
{
    Arc::new(Layered {
        inner,
        chain: Arc::new(chain),
    })
}
