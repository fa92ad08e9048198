//! Live endpoint cache driven by discovery snapshots.
//!
//! # Responsibilities
//! - Keep exactly one entry (endpoint + connection handle) per live instance
//! - Build entries for new instances, release entries for removed ones
//! - Publish the live list atomically so readers never see a half-applied update
//!
//! # Design Decisions
//! - Updates are serialized by one mutex; readers only touch the `ArcSwap`
//!   and never wait on an update
//! - A factory failure skips that instance; the next snapshot retries it
//! - Error snapshots keep the current entries (optionally invalidated after
//!   errors persist for `invalidate_on_error`)
//! - Handles are released after the new list is published, outside the lock

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::discovery::{Instance, Snapshot};
use crate::endpoint::BoxEndpoint;
use crate::load_balancer::{ConnectionHandle, Endpointer, Factory, InstanceEndpoint};
use crate::observability::metrics;

#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Drop every entry once discovery has been failing for this long.
    /// `None` keeps stale entries for as long as discovery is down.
    pub invalidate_on_error: Option<Duration>,
}

struct Entry<Req, Resp> {
    endpoint: BoxEndpoint<Req, Resp>,
    handle: ConnectionHandle,
}

struct CacheState<Req, Resp> {
    entries: BTreeMap<Instance, Entry<Req, Resp>>,
    error_since: Option<Instant>,
    closed: bool,
}

pub struct EndpointCache<Req, Resp> {
    name: Arc<str>,
    factory: Arc<dyn Factory<Req, Resp>>,
    options: CacheOptions,
    state: Mutex<CacheState<Req, Resp>>,
    live: ArcSwap<Vec<InstanceEndpoint<Req, Resp>>>,
}

impl<Req: 'static, Resp: 'static> EndpointCache<Req, Resp> {
    pub fn new(name: impl Into<Arc<str>>, factory: Arc<dyn Factory<Req, Resp>>, options: CacheOptions) -> Self {
        Self {
            name: name.into(),
            factory,
            options,
            state: Mutex::new(CacheState {
                entries: BTreeMap::new(),
                error_since: None,
                closed: false,
            }),
            live: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instances with a live entry, in address order.
    pub fn instances(&self) -> Vec<Instance> {
        self.live.load().iter().map(|e| e.instance.clone()).collect()
    }

    /// Apply one discovery snapshot.
    pub fn update(&self, snapshot: &Snapshot) {
        let mut state = self.lock();
        if state.closed {
            return;
        }

        if let Some(error) = snapshot.err() {
            let now = Instant::now();
            state.error_since.get_or_insert(now);
            tracing::warn!(method = %self.name, error = %error, "Discovery error, keeping current instances");
            self.invalidate_if_expired(state, now);
            return;
        }
        state.error_since = None;

        let gone: Vec<Instance> = state
            .entries
            .keys()
            .filter(|instance| !snapshot.contains(instance))
            .cloned()
            .collect();
        let mut removed = BTreeMap::new();
        for instance in gone {
            if let Some(entry) = state.entries.remove(&instance) {
                removed.insert(instance, entry);
            }
        }

        for instance in snapshot.instances() {
            if state.entries.contains_key(instance) {
                continue;
            }
            match self.factory.build(instance) {
                Ok((endpoint, handle)) => {
                    tracing::info!(method = %self.name, instance = %instance, "Instance added");
                    state.entries.insert(instance.clone(), Entry { endpoint, handle });
                }
                Err(e) => {
                    tracing::warn!(method = %self.name, instance = %instance, error = %e, "Failed to build endpoint, skipping");
                }
            }
        }

        self.publish(&state.entries);
        drop(state);
        self.release_all(removed);
    }

    /// When the current discovery outage will invalidate the entries, if it
    /// lasts. `None` when discovery is healthy, invalidation is disabled or
    /// there is nothing left to drop.
    pub fn invalidation_deadline(&self) -> Option<Instant> {
        let state = self.lock();
        if state.closed || state.entries.is_empty() {
            return None;
        }
        let window = self.options.invalidate_on_error?;
        state.error_since.map(|since| since + window)
    }

    /// Drop every entry if discovery has been failing for the whole
    /// `invalidate_on_error` window. A single error snapshot that is never
    /// followed by another one still expires this way.
    pub fn expire_stale(&self) {
        let state = self.lock();
        if state.closed {
            return;
        }
        self.invalidate_if_expired(state, Instant::now());
    }

    fn invalidate_if_expired(&self, mut state: MutexGuard<'_, CacheState<Req, Resp>>, now: Instant) {
        let expired = match (self.options.invalidate_on_error, state.error_since) {
            (Some(window), Some(since)) => now.saturating_duration_since(since) >= window,
            _ => false,
        };
        if !expired || state.entries.is_empty() {
            return;
        }
        tracing::warn!(method = %self.name, "Discovery errors persisted, invalidating all instances");
        let removed = std::mem::take(&mut state.entries);
        self.publish(&state.entries);
        drop(state);
        self.release_all(removed);
    }

    /// Release every entry and stop accepting updates.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let removed = std::mem::take(&mut state.entries);
        self.publish(&state.entries);
        drop(state);
        self.release_all(removed);
        tracing::info!(method = %self.name, "Endpoint cache closed");
    }

    /// Follow `snapshots` in the background until `shutdown` fires, then close.
    pub fn spawn(
        self: &Arc<Self>,
        mut snapshots: watch::Receiver<Snapshot>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let initial = snapshots.borrow_and_update().clone();
            cache.update(&initial);

            let mut following = true;
            loop {
                let invalidate_at = cache.invalidation_deadline();
                tokio::select! {
                    changed = snapshots.changed(), if following => {
                        if changed.is_err() {
                            tracing::info!(method = %cache.name, "Discovery stream ended, keeping last instances");
                            following = false;
                            continue;
                        }
                        let snapshot = snapshots.borrow_and_update().clone();
                        cache.update(&snapshot);
                    }
                    _ = sleep_until(invalidate_at) => cache.expire_stale(),
                    _ = shutdown.recv() => break,
                }
            }
            cache.close();
        })
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<Req, Resp>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, entries: &BTreeMap<Instance, Entry<Req, Resp>>) {
        let live: Vec<_> = entries
            .iter()
            .map(|(instance, entry)| InstanceEndpoint {
                instance: instance.clone(),
                endpoint: entry.endpoint.clone(),
            })
            .collect();
        metrics::record_live_instances(&self.name, live.len());
        self.live.store(Arc::new(live));
    }

    fn release_all(&self, removed: BTreeMap<Instance, Entry<Req, Resp>>) {
        for (instance, entry) in removed {
            entry.handle.release();
            metrics::record_connection_released(&self.name);
            tracing::info!(method = %self.name, instance = %instance, "Instance removed, connection released");
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<Req: 'static, Resp: 'static> Endpointer<Req, Resp> for EndpointCache<Req, Resp> {
    fn endpoints(&self) -> Arc<Vec<InstanceEndpoint<Req, Resp>>> {
        self.live.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::discovery::{Instancer, InstancePublisher};
    use crate::endpoint::endpoint_fn;
    use crate::error::RpcError;
    use crate::load_balancer::factory_fn;

    /// Factory counting builds and releases per instance; `bad:*` fails.
    #[derive(Default)]
    struct Tally {
        built: Mutex<HashMap<String, usize>>,
        released: Mutex<HashMap<String, usize>>,
    }

    impl Tally {
        fn built(&self, name: &str) -> usize {
            self.built.lock().unwrap().get(name).copied().unwrap_or(0)
        }
        fn released(&self, name: &str) -> usize {
            self.released.lock().unwrap().get(name).copied().unwrap_or(0)
        }
    }

    fn cache(options: CacheOptions) -> (Arc<EndpointCache<(), String>>, Arc<Tally>) {
        let tally = Arc::new(Tally::default());
        let t = tally.clone();
        let factory = factory_fn(move |instance: &Instance| {
            let name = instance.to_string();
            if name.starts_with("bad:") {
                return Err(RpcError::transport("unresolvable"));
            }
            *t.built.lock().unwrap().entry(name.clone()).or_default() += 1;
            let released = t.clone();
            let key = name.clone();
            let handle = ConnectionHandle::new(move || {
                *released.released.lock().unwrap().entry(key).or_default() += 1;
            });
            let ep: BoxEndpoint<(), String> = endpoint_fn(move |_ctx, _req: ()| {
                let name = name.clone();
                async move { Ok(name) }
            });
            Ok((ep, handle))
        });
        (Arc::new(EndpointCache::new("sum", factory, options)), tally)
    }

    fn names(cache: &EndpointCache<(), String>) -> Vec<String> {
        cache.instances().iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_update_adds_and_removes_entries() {
        let (cache, tally) = cache(CacheOptions::default());

        cache.update(&Snapshot::new(["a:1", "b:1"]));
        assert_eq!(names(&cache), vec!["a:1", "b:1"]);

        cache.update(&Snapshot::new(["a:1", "c:1"]));
        assert_eq!(names(&cache), vec!["a:1", "c:1"]);
        assert_eq!(tally.built("a:1"), 1, "existing entries are kept, not rebuilt");
        assert_eq!(tally.released("b:1"), 1);
        assert_eq!(tally.released("a:1"), 0);

        cache.update(&Snapshot::new(["a:1", "c:1"]));
        cache.update(&Snapshot::new(["a:1"]));
        assert_eq!(tally.released("b:1"), 1, "released exactly once");
        assert_eq!(tally.released("c:1"), 1);
    }

    #[test]
    fn test_factory_failure_skips_instance() {
        let (cache, _) = cache(CacheOptions::default());
        cache.update(&Snapshot::new(["a:1", "bad:1"]));
        assert_eq!(names(&cache), vec!["a:1"]);
    }

    #[test]
    fn test_error_snapshot_keeps_entries() {
        let (cache, tally) = cache(CacheOptions::default());
        cache.update(&Snapshot::new(["a:1"]));
        cache.update(&Snapshot::error("registry down"));
        assert_eq!(names(&cache), vec!["a:1"]);
        assert_eq!(tally.released("a:1"), 0);

        // An empty (non-error) snapshot does remove everything.
        cache.update(&Snapshot::new(Vec::<String>::new()));
        assert!(cache.endpoints().is_empty());
        assert_eq!(tally.released("a:1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_after_persistent_errors() {
        let (cache, tally) = cache(CacheOptions {
            invalidate_on_error: Some(Duration::from_secs(5)),
        });
        cache.update(&Snapshot::new(["a:1"]));

        cache.update(&Snapshot::error("down"));
        tokio::time::advance(Duration::from_secs(3)).await;
        cache.update(&Snapshot::error("down"));
        assert_eq!(names(&cache), vec!["a:1"]);

        tokio::time::advance(Duration::from_secs(3)).await;
        cache.update(&Snapshot::error("down"));
        assert!(names(&cache).is_empty());
        assert_eq!(tally.released("a:1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_persistent_error_invalidates_through_updater() {
        let (cache, tally) = cache(CacheOptions {
            invalidate_on_error: Some(Duration::from_secs(5)),
        });
        let publisher = InstancePublisher::new();
        publisher.publish(["a:1"]);
        let (shutdown_tx, _) = broadcast::channel(1);
        let task = cache.spawn(publisher.subscribe(), shutdown_tx.subscribe());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(names(&cache), vec!["a:1"]);

        // Reported once, never repeated.
        publisher.publish_error("registry down");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(names(&cache), vec!["a:1"]);
        assert!(cache.invalidation_deadline().is_some());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(names(&cache).is_empty());
        assert_eq!(tally.released("a:1"), 1);
        assert!(cache.invalidation_deadline().is_none());

        // Recovery repopulates.
        publisher.publish(["a:1"]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(names(&cache), vec!["a:1"]);
        assert_eq!(tally.built("a:1"), 2);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_before_window_cancels_invalidation() {
        let (cache, tally) = cache(CacheOptions {
            invalidate_on_error: Some(Duration::from_secs(5)),
        });
        let publisher = InstancePublisher::new();
        publisher.publish(["a:1"]);
        let (shutdown_tx, _) = broadcast::channel(1);
        let task = cache.spawn(publisher.subscribe(), shutdown_tx.subscribe());
        tokio::time::sleep(Duration::from_millis(10)).await;

        publisher.publish_error("registry down");
        tokio::time::sleep(Duration::from_secs(3)).await;
        publisher.publish(["a:1"]);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(names(&cache), vec!["a:1"]);
        assert_eq!(tally.released("a:1"), 0);
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let (cache, _) = cache(CacheOptions::default());
        cache.update(&Snapshot::new(["a:1", "b:1"]));
        let before = cache.endpoints();

        cache.update(&Snapshot::new(["c:1"]));
        assert_eq!(before.len(), 2, "published lists are immutable");
        assert_eq!(cache.endpoints().len(), 1);
    }

    #[tokio::test]
    async fn test_spawned_updater_follows_publisher_and_closes() {
        let (cache, tally) = cache(CacheOptions::default());
        let publisher = InstancePublisher::new();
        publisher.publish(["a:1"]);
        let (shutdown_tx, _) = broadcast::channel(1);

        let task = cache.spawn(publisher.subscribe(), shutdown_tx.subscribe());

        publisher.publish(["a:1", "b:1"]);
        tokio::time::timeout(Duration::from_secs(5), async {
            while cache.endpoints().len() != 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
        assert!(cache.endpoints().is_empty());
        assert_eq!(tally.released("a:1"), 1);
        assert_eq!(tally.released("b:1"), 1);

        // Closed caches ignore later snapshots.
        cache.update(&Snapshot::new(["c:1"]));
        assert!(cache.endpoints().is_empty());
        assert_eq!(tally.built("c:1"), 0);
    }
}
