//! Programmatic membership source.
//!
//! Embedders bridging an external registry push snapshots through an
//! [`InstancePublisher`]; tests use it to script membership changes.

use tokio::sync::watch;

use crate::discovery::{Instance, Instancer, Snapshot};

#[derive(Debug)]
pub struct InstancePublisher {
    tx: watch::Sender<Snapshot>,
}

impl InstancePublisher {
    /// Starts with an empty snapshot.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Snapshot::default());
        Self { tx }
    }

    /// Replace the membership.
    pub fn publish<I, T>(&self, instances: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<Instance>,
    {
        self.tx.send_replace(Snapshot::new(instances));
    }

    /// Report that discovery is unavailable.
    pub fn publish_error(&self, message: impl Into<String>) {
        self.tx.send_replace(Snapshot::error(message));
    }

    pub fn current(&self) -> Snapshot {
        self.tx.borrow().clone()
    }
}

impl Default for InstancePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Instancer for InstancePublisher {
    fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }
}
