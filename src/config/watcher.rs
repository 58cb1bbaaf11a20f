//! Store directory watcher for transformation hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::transform::ConfigResolver;

/// Clears the resolver cache whenever a file under the store root changes.
pub struct StoreWatcher {
    root: PathBuf,
    resolver: Arc<ConfigResolver>,
}

impl StoreWatcher {
    pub fn new(root: &Path, resolver: Arc<ConfigResolver>) -> Self {
        Self {
            root: root.to_path_buf(),
            resolver,
        }
    }

    /// Start watching in notify's background thread.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let resolver = Arc::clone(&self.resolver);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        tracing::info!(paths = ?event.paths, "Store change detected, invalidating transformation config");
                        resolver.clear_cache();
                    }
                }
                Err(e) => tracing::error!(error = %e, "Store watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        tracing::info!(root = ?self.root, "Store watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;
    use std::time::Instant;

    #[tokio::test]
    async fn test_change_clears_resolver_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()));
        let resolver = Arc::new(ConfigResolver::new(store, "transformation-config", Duration::from_secs(3600)));

        let _watcher = StoreWatcher::new(dir.path(), Arc::clone(&resolver)).run().unwrap();
        resolver.load_config().await;
        assert!(resolver.status().cached);

        std::fs::write(dir.path().join("transformation-config"), "{}").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while resolver.status().cached && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!resolver.status().cached);
    }
}
