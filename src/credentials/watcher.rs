//! Credentials file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::credentials::store::StaticCredentialStore;

/// Watches the credentials file and swaps in new records on change.
pub struct CredentialsWatcher {
    path: PathBuf,
    store: Arc<StaticCredentialStore>,
}

impl CredentialsWatcher {
    pub fn new(path: &Path, store: Arc<StaticCredentialStore>) -> Self {
        Self {
            path: path.to_path_buf(),
            store,
        }
    }

    /// Start watching in a background thread. Keep the returned watcher alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let store = self.store.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Credentials file change detected, reloading...");
                        match store.reload() {
                            Ok(count) => tracing::info!(credentials = count, "Credentials reloaded"),
                            Err(e) => tracing::error!(
                                "Failed to reload credentials: {}. Keeping current records.",
                                e
                            ),
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Credentials watcher started");
        Ok(watcher)
    }
}
