use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use tracing::info;

use super::watcher::ParamWatcher;
use crate::validation::validate_prefix;
use crate::ChangeSource;
use crate::Result;
use crate::WatchConfig;

/// Shared handle to a watcher owned by a [`WatchHub`]
pub type WatcherHandle = Arc<ParamWatcher>;

/// Owner of every live watcher, keyed by exact prefix.
///
/// There is no process-wide instance: create one hub per change source and
/// call [`WatchHub::shutdown`] (or drop it) to tear all watchers down.
///
/// ```ignore
/// let hub = WatchHub::new(store.clone(), settings.watch.clone());
/// let watcher = hub.watch("net.")?;
/// watcher.on_change(|change| println!("{} = {}", change.key, change.value))?;
/// hub.shutdown();
/// ```
pub struct WatchHub {
    source: Arc<dyn ChangeSource>,
    watchers: DashMap<String, WatcherHandle>,
    config: WatchConfig,
}

impl fmt::Debug for WatchHub {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WatchHub")
            .field("watchers", &self.watchers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WatchHub {
    pub fn new(
        source: Arc<dyn ChangeSource>,
        config: WatchConfig,
    ) -> Self {
        Self {
            source,
            watchers: DashMap::new(),
            config,
        }
    }

    /// Returns the live watcher for exactly `prefix`, creating an idle one if
    /// none exists or the previous one was destroyed.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty prefix or one longer than
    /// `watch.max_prefix_len`.
    pub fn watch(
        &self,
        prefix: &str,
    ) -> Result<WatcherHandle> {
        validate_prefix(prefix, self.config.max_prefix_len)?;

        let handle = match self.watchers.entry(prefix.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_destroyed() {
                    debug!(prefix, "Replacing destroyed watcher");
                    occupied.insert(self.new_watcher(prefix));
                }
                Arc::clone(occupied.get())
            }
            Entry::Vacant(vacant) => {
                debug!(prefix, "Watcher created");
                Arc::clone(vacant.insert(self.new_watcher(prefix)).value())
            }
        };
        Ok(handle)
    }

    /// Live watcher for `prefix` without creating one
    pub fn get(
        &self,
        prefix: &str,
    ) -> Option<WatcherHandle> {
        self.watchers
            .get(prefix)
            .filter(|watcher| !watcher.is_destroyed())
            .map(|watcher| Arc::clone(watcher.value()))
    }

    /// Destroys and forgets the watcher for `prefix`. Returns whether a live
    /// watcher was destroyed.
    pub fn destroy(
        &self,
        prefix: &str,
    ) -> bool {
        match self.watchers.remove(prefix) {
            Some((_, watcher)) => watcher.destroy(),
            None => false,
        }
    }

    /// Number of live watchers
    pub fn len(&self) -> usize {
        self.watchers.iter().filter(|w| !w.is_destroyed()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroys every watcher. Handles held elsewhere observe `Destroyed`.
    pub fn shutdown(&self) {
        let prefixes: Vec<String> = self.watchers.iter().map(|w| w.key().clone()).collect();
        let mut destroyed = 0;
        for prefix in prefixes {
            if self.destroy(&prefix) {
                destroyed += 1;
            }
        }
        if destroyed > 0 {
            info!(destroyed, "Watch hub shut down");
        }
    }

    fn new_watcher(
        &self,
        prefix: &str,
    ) -> WatcherHandle {
        Arc::new(ParamWatcher::new(
            prefix.to_string(),
            Arc::clone(&self.source),
            self.config.clone(),
        ))
    }
}

impl Drop for WatchHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}
