//! Token registry file watcher for hot reload.

use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::auth::registry::FileTokenStore;
use crate::observability::metrics;

/// Reloads a [`FileTokenStore`] whenever its file changes.
pub struct RegistryWatcher {
    store: Arc<FileTokenStore>,
}

impl RegistryWatcher {
    pub fn new(store: Arc<FileTokenStore>) -> Self {
        Self { store }
    }

    /// Start watching in notify's background thread.
    ///
    /// The returned watcher must be kept alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let store = Arc::clone(&self.store);
        let path = self.store.path().to_path_buf();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        match store.reload() {
                            Ok(tokens) => {
                                metrics::record_registry_reload("ok");
                                tracing::info!(tokens, "Token registry reloaded");
                            }
                            Err(e) => {
                                metrics::record_registry_reload("error");
                                tracing::error!(error = %e, "Failed to reload token registry, keeping current tokens");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Registry watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Token registry watcher started");
        Ok(watcher)
    }
}
