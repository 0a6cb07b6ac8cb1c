//! Subscription registry with reentrancy-safe dispatch
//!
//! Callbacks are kept in a `BTreeMap` keyed by a per-registry id that only
//! ever grows, so ascending key order is registration order.
//!
//! A dispatch pass never holds the lock while a callback runs. It walks the
//! map one step at a time:
//!
//! ```text
//! lock -> first id -> unlock
//! loop:
//!   lock -> clone callback at id -> unlock -> invoke
//!   lock -> next id after current -> unlock
//! ```
//!
//! A callback may therefore add or remove entries, or tear the whole watcher
//! down, while it is being invoked. Entries removed ahead of the cursor are
//! skipped; entries added during the pass get larger ids and are picked up
//! if the cursor has not reached the end yet. That visibility is best-effort.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;
use tracing::trace;

/// Identifier returned when a callback is registered
pub type SubscriptionId = u64;

/// A single parameter change delivered to callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamChange {
    /// Full key of the parameter that changed
    pub key: String,
    /// Value after the change
    pub value: String,
}

impl ParamChange {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Caller-supplied change handler.
///
/// Cloning is cheap and clones compare equal: two `ParamCallback`s are the same
/// callback exactly when they share the same closure allocation.
#[derive(Clone)]
pub struct ParamCallback(Arc<dyn Fn(&ParamChange) + Send + Sync>);

impl ParamCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ParamChange) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn invoke(
        &self,
        change: &ParamChange,
    ) {
        (self.0)(change)
    }
}

impl PartialEq for ParamCallback {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl Eq for ParamCallback {}

impl fmt::Debug for ParamCallback {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "ParamCallback({:p})", Arc::as_ptr(&self.0))
    }
}

/// Counters for one dispatch pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that returned normally
    pub delivered: usize,
    /// Callbacks that panicked; the pass continued past them
    pub failed: usize,
}

struct RegistryInner {
    entries: BTreeMap<SubscriptionId, ParamCallback>,
    last_id: SubscriptionId,
}

/// Ordered, concurrently mutable set of callbacks owned by one watcher
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SubscriptionRegistry")
            .field("len", &inner.entries.len())
            .field("last_id", &inner.last_id)
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                entries: BTreeMap::new(),
                last_id: 0,
            }),
        }
    }

    /// Stores `callback` under the next id. Ids start at 1 and are never reused.
    pub fn add(
        &self,
        callback: ParamCallback,
    ) -> SubscriptionId {
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let id = inner.last_id;
        inner.entries.insert(id, callback);
        id
    }

    /// Returns whether `id` was registered.
    pub fn remove(
        &self,
        id: SubscriptionId,
    ) -> bool {
        self.inner.lock().entries.remove(&id).is_some()
    }

    /// Removes the lowest-id entry holding `callback`.
    pub fn remove_by_callback(
        &self,
        callback: &ParamCallback,
    ) -> bool {
        let mut inner = self.inner.lock();
        let found = inner
            .entries
            .iter()
            .find(|(_, registered)| *registered == callback)
            .map(|(id, _)| *id);
        match found {
            Some(id) => inner.entries.remove(&id).is_some(),
            None => false,
        }
    }

    /// Clears the registry and returns how many entries were dropped.
    pub fn remove_all(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        removed
    }

    pub fn contains_equivalent(
        &self,
        callback: &ParamCallback,
    ) -> bool {
        self.inner.lock().entries.values().any(|registered| registered == callback)
    }

    pub fn contains(
        &self,
        id: SubscriptionId,
    ) -> bool {
        self.inner.lock().entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Registered ids in dispatch order
    pub fn ids(&self) -> Vec<SubscriptionId> {
        self.inner.lock().entries.keys().copied().collect()
    }

    /// Invokes every registered callback with `change` in ascending id order.
    ///
    /// A panicking callback is logged and counted; the remaining callbacks
    /// still run.
    pub fn dispatch(
        &self,
        change: &ParamChange,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut cursor = self.first_id();

        while let Some(id) = cursor {
            if let Some(callback) = self.callback_at(id) {
                match catch_unwind(AssertUnwindSafe(|| callback.invoke(change))) {
                    Ok(()) => report.delivered += 1,
                    Err(_) => {
                        report.failed += 1;
                        error!(
                            subscription_id = id,
                            key = %change.key,
                            "Parameter callback panicked; continuing dispatch"
                        );
                    }
                }
            }
            cursor = self.next_id_after(id);
        }

        trace!(
            key = %change.key,
            delivered = report.delivered,
            failed = report.failed,
            "Dispatch pass finished"
        );
        report
    }

    fn first_id(&self) -> Option<SubscriptionId> {
        self.inner.lock().entries.keys().next().copied()
    }

    fn callback_at(
        &self,
        id: SubscriptionId,
    ) -> Option<ParamCallback> {
        self.inner.lock().entries.get(&id).cloned()
    }

    fn next_id_after(
        &self,
        id: SubscriptionId,
    ) -> Option<SubscriptionId> {
        self.inner
            .lock()
            .entries
            .range((Bound::Excluded(id), Bound::Unbounded))
            .next()
            .map(|(next, _)| *next)
    }
}
