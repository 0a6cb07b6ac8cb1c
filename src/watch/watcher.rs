//! Parameter watcher: one prefix, one registry, at most one low-level
//! subscription.
//!
//! Lifecycle is `Idle -> Subscribed -> Destroyed`, monotonic. The first
//! successful `add_callback` opens the subscription; it stays open after the
//! last callback is removed and is only closed by `destroy` (or drop).
//!
//! Lock order is `state`, then the change source, then the registry's own
//! lock. `state` is held across `subscribe` and `unsubscribe` but never while a
//! callback runs: the handler given to the change source only touches the
//! registry, and the registry releases its lock around each invocation.

use std::fmt;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::registry::ParamCallback;
use super::registry::ParamChange;
use super::registry::SubscriptionId;
use super::registry::SubscriptionRegistry;
use crate::ChangeHandler;
use crate::ChangeSource;
use crate::Result;
use crate::SubscriptionToken;
use crate::WatchConfig;
use crate::WatchError;

/// Observable lifecycle state of a [`ParamWatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherStatus {
    Idle,
    Subscribed,
    Destroyed,
}

#[derive(Debug)]
enum WatcherState {
    Idle,
    Subscribed(SubscriptionToken),
    Destroyed,
}

pub struct ParamWatcher {
    prefix: String,
    state: Mutex<WatcherState>,
    registry: Arc<SubscriptionRegistry>,
    source: Arc<dyn ChangeSource>,
    config: WatchConfig,
}

impl fmt::Debug for ParamWatcher {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ParamWatcher")
            .field("prefix", &self.prefix)
            .field("state", &*self.state.lock())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ParamWatcher {
    /// Creates an idle watcher. Prefix validation is the caller's job; use
    /// [`crate::WatchHub::watch`] for the checked entry point.
    pub(crate) fn new(
        prefix: String,
        source: Arc<dyn ChangeSource>,
        config: WatchConfig,
    ) -> Self {
        Self {
            prefix,
            state: Mutex::new(WatcherState::Idle),
            registry: Arc::new(SubscriptionRegistry::new()),
            source,
            config,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn status(&self) -> WatcherStatus {
        match *self.state.lock() {
            WatcherState::Idle => WatcherStatus::Idle,
            WatcherState::Subscribed(_) => WatcherStatus::Subscribed,
            WatcherState::Destroyed => WatcherStatus::Destroyed,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.status() == WatcherStatus::Destroyed
    }

    /// Token of the open low-level subscription, if any
    pub fn subscription_token(&self) -> Option<SubscriptionToken> {
        match *self.state.lock() {
            WatcherState::Subscribed(token) => Some(token),
            _ => None,
        }
    }

    pub fn callback_count(&self) -> usize {
        self.registry.len()
    }

    /// Registers `callback` for every change under this watcher's prefix.
    ///
    /// The first call opens the low-level subscription. If the source refuses
    /// it, nothing is registered and the watcher stays idle.
    ///
    /// # Errors
    /// - `WatchError::InvalidState` once the watcher is destroyed
    /// - `WatchError::SubscriptionFailed` if the subscription cannot be opened
    pub fn add_callback(
        &self,
        callback: ParamCallback,
    ) -> Result<SubscriptionId> {
        let mut state = self.state.lock();
        match *state {
            WatcherState::Destroyed => {
                return Err(WatchError::InvalidState {
                    prefix: self.prefix.clone(),
                }
                .into());
            }
            WatcherState::Idle => {
                let token = self.open_subscription()?;
                *state = WatcherState::Subscribed(token);
            }
            WatcherState::Subscribed(_) => {}
        }

        if self.config.warn_on_duplicate_callback && self.registry.contains_equivalent(&callback) {
            warn!(
                prefix = %self.prefix,
                "Callback registered twice on the same watcher; each copy receives events"
            );
        }

        let id = self.registry.add(callback);
        trace!(prefix = %self.prefix, subscription_id = id, "Callback registered");
        Ok(id)
    }

    /// Convenience wrapper building the [`ParamCallback`] from a closure
    pub fn on_change<F>(
        &self,
        f: F,
    ) -> Result<SubscriptionId>
    where
        F: Fn(&ParamChange) + Send + Sync + 'static,
    {
        self.add_callback(ParamCallback::new(f))
    }

    /// Removes the first registration of `callback`.
    pub fn remove_callback(
        &self,
        callback: &ParamCallback,
    ) -> Result<()> {
        let state = self.state.lock();
        self.ensure_live(&state)?;
        if !self.registry.remove_by_callback(callback) {
            return Err(self.not_found(format!("{callback:?}")));
        }
        trace!(prefix = %self.prefix, "Callback removed");
        Ok(())
    }

    /// Removes the registration returned by [`Self::add_callback`].
    pub fn remove_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<()> {
        let state = self.state.lock();
        self.ensure_live(&state)?;
        if !self.registry.remove(id) {
            return Err(self.not_found(format!("subscription {id}")));
        }
        trace!(prefix = %self.prefix, subscription_id = id, "Subscription removed");
        Ok(())
    }

    /// Drops every callback. Never fails; the low-level subscription stays open.
    pub fn remove_all_callbacks(&self) -> usize {
        let removed = self.registry.remove_all();
        debug!(prefix = %self.prefix, removed, "All callbacks removed");
        removed
    }

    /// Moves the watcher to `Destroyed`, clears its callbacks and closes the
    /// low-level subscription.
    ///
    /// Returns `true` for the call that performed the transition; later calls
    /// are no-ops. The low-level subscription is released before `Destroyed`
    /// becomes observable, so a replacement watcher for the same prefix can
    /// subscribe as soon as [`Self::is_destroyed`] reports `true`.
    ///
    /// A callback already picked up by a concurrent dispatch pass may still
    /// run, once, after `destroy` returns. The pass then observes the empty
    /// registry and later events reach no callback.
    pub fn destroy(&self) -> bool {
        let mut state = self.state.lock();
        let token = match std::mem::replace(&mut *state, WatcherState::Destroyed) {
            WatcherState::Destroyed => return false,
            WatcherState::Idle => None,
            WatcherState::Subscribed(token) => Some(token),
        };
        let cleared = self.registry.remove_all();

        if let Some(token) = token {
            self.source.unsubscribe(token);
            debug!(prefix = %self.prefix, %token, "Low-level subscription closed");
        }
        drop(state);

        debug!(prefix = %self.prefix, cleared, "Watcher destroyed");
        true
    }

    fn open_subscription(&self) -> Result<SubscriptionToken> {
        let registry: Weak<SubscriptionRegistry> = Arc::downgrade(&self.registry);
        let handler: ChangeHandler = Arc::new(move |key: &str, value: &str| {
            if let Some(registry) = registry.upgrade() {
                registry.dispatch(&ParamChange::new(key, value));
            }
        });

        let token = self
            .source
            .subscribe(&self.prefix, handler)
            .map_err(|e| WatchError::SubscriptionFailed {
                prefix: self.prefix.clone(),
                source: Box::new(e),
            })?;
        debug!(prefix = %self.prefix, %token, "Low-level subscription opened");
        Ok(token)
    }

    fn ensure_live(
        &self,
        state: &WatcherState,
    ) -> Result<()> {
        if matches!(state, WatcherState::Destroyed) {
            return Err(WatchError::InvalidState {
                prefix: self.prefix.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn not_found(
        &self,
        target: String,
    ) -> crate::Error {
        WatchError::NotFound {
            prefix: self.prefix.clone(),
            target,
        }
        .into()
    }
}

impl Drop for ParamWatcher {
    fn drop(&mut self) {
        if self.destroy() {
            trace!(prefix = %self.prefix, "Watcher destroyed on drop");
        }
    }
}
