//! File-backed membership with hot reload.
//!
//! The file is TOML:
//! ```toml
//! instances = ["127.0.0.1:8081", "127.0.0.1:8082"]
//! ```
//! The parent directory is watched so that editors replacing the file
//! (write to temp + rename) are picked up. An unreadable or malformed file
//! publishes an error snapshot, which leaves existing cache entries alone.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tokio::sync::watch;

use crate::discovery::{Instancer, Snapshot};

#[derive(Debug, Deserialize)]
struct InstanceFile {
    // Required, so a truncated mid-write file is an error rather than "no instances".
    instances: Vec<String>,
}

/// Read the instance file into a snapshot. Failures become error snapshots.
pub fn read_snapshot(path: &Path) -> Snapshot {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => return Snapshot::error(format!("reading {}: {e}", path.display())),
    };
    match toml::from_str::<InstanceFile>(&content) {
        Ok(file) => Snapshot::new(file.instances),
        Err(e) => Snapshot::error(format!("parsing {}: {e}", path.display())),
    }
}

/// Instancer fed by a watched TOML file.
pub struct FileInstancer {
    path: PathBuf,
    tx: Arc<watch::Sender<Snapshot>>,
    _watcher: RecommendedWatcher,
}

impl FileInstancer {
    /// Load the file and start watching it.
    pub fn watch(path: impl Into<PathBuf>) -> Result<Self, notify::Error> {
        let path = path.into();
        let (tx, _) = watch::channel(read_snapshot(&path));
        let tx = Arc::new(tx);

        let file_name = path.file_name().map(|n| n.to_os_string());
        let reload_path = path.clone();
        let reload_tx = tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !ours || event.kind.is_access() {
                        return;
                    }
                    let snapshot = read_snapshot(&reload_path);
                    if let Some(e) = snapshot.err() {
                        tracing::error!(error = %e, "Instance file unusable, keeping current instances");
                    }
                    reload_tx.send_if_modified(|current| {
                        if *current == snapshot {
                            false
                        } else {
                            tracing::info!(path = ?reload_path, instances = snapshot.len(), "Instance file reloaded");
                            *current = snapshot;
                            true
                        }
                    });
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Instance file watcher started");
        Ok(Self {
            path,
            tx,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Instancer for FileInstancer {
    fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }
}
