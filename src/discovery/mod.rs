//! Service discovery collaborators.
//!
//! # Data Flow
//! ```text
//! membership source (static list / publisher / watched file)
//!     → Instancer publishes a Snapshot on a watch channel
//!     → EndpointCache (load_balancer/cache.rs) consumes the latest Snapshot
//! ```
//!
//! # Design Decisions
//! - A watch channel only keeps the latest snapshot; intermediate snapshots
//!   may be skipped, which is fine because each snapshot is complete
//! - A snapshot carrying an error says "discovery is unavailable", not
//!   "there are no instances"

pub mod file;
pub mod fixed;
pub mod publisher;

use std::collections::BTreeSet;
use std::fmt;

use tokio::sync::watch;

pub use file::FileInstancer;
pub use fixed::FixedInstancer;
pub use publisher::InstancePublisher;

/// Network address of one backend replica (`host:port`, scheme optional).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instance(String);

impl Instance {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Instance {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Instance {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Point-in-time membership of a logical service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    instances: BTreeSet<Instance>,
    error: Option<String>,
}

impl Snapshot {
    pub fn new<I, T>(instances: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Instance>,
    {
        Self {
            instances: instances.into_iter().map(Into::into).collect(),
            error: None,
        }
    }

    /// A snapshot reporting that discovery is temporarily unavailable.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            instances: BTreeSet::new(),
            error: Some(message.into()),
        }
    }

    pub fn instances(&self) -> &BTreeSet<Instance> {
        &self.instances
    }

    pub fn err(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn contains(&self, instance: &Instance) -> bool {
        self.instances.contains(instance)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Source of membership snapshots.
pub trait Instancer: Send + Sync {
    /// Receiver positioned at the current snapshot.
    fn subscribe(&self) -> watch::Receiver<Snapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_deduplicates_and_orders() {
        let snapshot = Snapshot::new(["10.0.0.2:8081", "10.0.0.1:8081", "10.0.0.2:8081"]);
        let listed: Vec<_> = snapshot.instances().iter().map(Instance::as_str).collect();
        assert_eq!(listed, vec!["10.0.0.1:8081", "10.0.0.2:8081"]);
        assert!(snapshot.err().is_none());
    }

    #[test]
    fn test_error_snapshot_has_no_members() {
        let snapshot = Snapshot::error("registry unreachable");
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.err(), Some("registry unreachable"));
    }
}
