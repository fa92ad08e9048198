//! Ordered middleware composition.
//!
//! # Ordering
//! Stages are listed outermost first, the same way `tower::ServiceBuilder`
//! reads:
//! ```text
//! Chain::new()
//!     .layer("circuit_breaker", breaker)   // sees every call first
//!     .layer("rate_limit", limiter)        // innermost, next to the client
//!     .apply(client)
//!
//! call → circuit_breaker → rate_limit → client
//! ```
//! With this order a call rejected by the limiter reaches the breaker as a
//! local rejection and is never counted as a backend failure.
//!
//! Any `tower::Layer` whose service is an [`Endpoint`] can be a stage.

pub mod instrument;
pub mod logging;

use std::sync::Arc;

use tower::Layer;

use crate::endpoint::{BoxEndpoint, Endpoint};

pub use instrument::InstrumentLayer;
pub use logging::LoggingLayer;

type Wrap<Req, Resp> = Arc<dyn Fn(BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> + Send + Sync>;

/// An ordered list of named wrapping stages.
pub struct Chain<Req, Resp> {
    stages: Vec<(&'static str, Wrap<Req, Resp>)>,
}

impl<Req: 'static, Resp: 'static> Chain<Req, Resp> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a `tower::Layer` stage, inside every stage added before it.
    pub fn layer<L>(self, name: &'static str, layer: L) -> Self
    where
        L: Layer<BoxEndpoint<Req, Resp>> + Send + Sync + 'static,
        L::Service: Endpoint<Req, Resp>,
    {
        self.wrap(name, move |inner| Arc::new(layer.layer(inner)) as BoxEndpoint<Req, Resp>)
    }

    /// Append a plain wrapping function as a stage.
    pub fn wrap<F>(mut self, name: &'static str, f: F) -> Self
    where
        F: Fn(BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> + Send + Sync + 'static,
    {
        self.stages.push((name, Arc::new(f)));
        self
    }

    /// Stage names, outermost first.
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|(name, _)| *name).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Wrap `base` so that the first stage is the outermost.
    pub fn apply(&self, base: BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> {
        self.stages
            .iter()
            .rev()
            .fold(base, |inner, (_, wrap)| wrap(inner))
    }
}

impl<Req: 'static, Resp: 'static> Default for Chain<Req, Resp> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Resp> Clone for Chain<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<Req, Resp> std::fmt::Debug for Chain<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|(name, _)| name))
            .finish()
    }
}
