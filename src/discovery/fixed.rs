//! Static membership.

use tokio::sync::watch;

use crate::discovery::{Instance, Instancer, Snapshot};

/// Instancer that always reports the same instances.
#[derive(Debug)]
pub struct FixedInstancer {
    tx: watch::Sender<Snapshot>,
}

impl FixedInstancer {
    pub fn new<I, T>(instances: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Instance>,
    {
        let (tx, _) = watch::channel(Snapshot::new(instances));
        Self { tx }
    }
}

impl Instancer for FixedInstancer {
    fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }
}
