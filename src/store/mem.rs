//! In-memory parameter service
//!
//! Reference implementation of both collaborator traits so the watch registry
//! and the wait bridge can run end-to-end inside one process.
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   set_parameter() -> table write + commit_id++ -> notify_all(waiters)
//!                                                -> try_send(event_queue)
//!                                                          ↓
//! Background Dispatcher Thread:
//!   event_queue.recv() -> match prefixes in DashMap -> handler(key, value)
//! ```
//!
//! - One subscription per exact prefix; events go to every subscription whose
//!   prefix the key starts with.
//! - A single dispatcher thread delivers events, so order per prefix follows
//!   write order.
//! - When the event queue is full new events are dropped with a warning.
//! - Events written before `start()` wait in the queue.

use std::collections::HashMap;
use std::fmt;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use crossbeam_channel::bounded;
use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use crossbeam_channel::TrySendError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Condvar;
use parking_lot::Mutex;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::validation::validate_key;
use crate::validation::validate_prefix;
use crate::validation::validate_value;
use crate::ChangeHandler;
use crate::ChangeSource;
use crate::ParamChange;
use crate::ParamHandle;
use crate::ParameterStore;
use crate::Result;
use crate::StoreConfig;
use crate::StoreError;
use crate::SubscriptionToken;
use crate::WaitStatus;

const CLOSED_REASON: &str = "parameter store closed";

#[derive(Debug)]
struct ParamEntry {
    name: String,
    value: String,
    commit_id: u64,
}

/// Entries in insertion order; a handle is the entry's position.
#[derive(Debug, Default)]
struct ParamTable {
    entries: Vec<ParamEntry>,
    index: HashMap<String, u32>,
}

impl ParamTable {
    fn get(
        &self,
        key: &str,
    ) -> Option<&ParamEntry> {
        self.index.get(key).map(|&slot| &self.entries[slot as usize])
    }

    fn entry(
        &self,
        handle: ParamHandle,
    ) -> Result<&ParamEntry> {
        self.entries
            .get(handle.0 as usize)
            .ok_or_else(|| StoreError::InvalidHandle(handle.0).into())
    }

    fn write(
        &mut self,
        key: &str,
        value: &str,
    ) -> u64 {
        match self.index.get(key) {
            Some(&slot) => {
                let entry = &mut self.entries[slot as usize];
                entry.value = value.to_string();
                entry.commit_id += 1;
                entry.commit_id
            }
            None => {
                let slot = self.entries.len() as u32;
                self.entries.push(ParamEntry {
                    name: key.to_string(),
                    value: value.to_string(),
                    commit_id: 1,
                });
                self.index.insert(key.to_string(), slot);
                1
            }
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    table: ParamTable,
    closed: bool,
}

struct Subscription {
    token: SubscriptionToken,
    handler: ChangeHandler,
}

struct StoreInner {
    state: Mutex<StoreState>,

    /// Signalled on every write and on close
    changed: Condvar,

    /// Subscriptions keyed by exact prefix
    subscriptions: DashMap<String, Subscription>,

    next_token: AtomicU64,

    /// Dispatcher thread handle (None when not running)
    thread_handle: Mutex<Option<JoinHandle<()>>>,

    /// Shutdown signal sender (None when not running)
    shutdown_tx: Mutex<Option<Sender<()>>>,

    config: StoreConfig,
}

/// Process-local parameter store with change notification.
///
/// ```ignore
/// let store = Arc::new(MemParamStore::new(settings.store.clone()));
/// store.start();
/// store.set_parameter("net.state", "up")?;
/// store.stop();
/// ```
pub struct MemParamStore {
    inner: Arc<StoreInner>,

    /// Sender for the change event queue
    event_sender: Sender<ParamChange>,

    /// Receiver for the change event queue, consumed by the dispatcher
    event_receiver: Arc<Receiver<ParamChange>>,
}

impl fmt::Debug for MemParamStore {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("MemParamStore")
            .field("parameters", &self.inner.state.lock().table.entries.len())
            .field("subscriptions", &self.inner.subscriptions.len())
            .field("queued_events", &self.event_receiver.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl MemParamStore {
    pub fn new(config: StoreConfig) -> Self {
        let (event_sender, event_receiver) = if config.event_queue_size > 0 {
            bounded(config.event_queue_size)
        } else {
            unbounded()
        };

        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState::default()),
                changed: Condvar::new(),
                subscriptions: DashMap::new(),
                next_token: AtomicU64::new(1),
                thread_handle: Mutex::new(None),
                shutdown_tx: Mutex::new(None),
                config,
            }),
            event_sender,
            event_receiver: Arc::new(event_receiver),
        }
    }

    /// Starts the dispatcher thread. A no-op when it is already running.
    pub fn start(&self) {
        let mut handle_guard = self.inner.thread_handle.lock();
        if handle_guard.is_some() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let inner = Arc::clone(&self.inner);
        let receiver = Arc::clone(&self.event_receiver);

        let handle = thread::spawn(move || {
            debug!("Parameter event dispatcher started");

            loop {
                crossbeam_channel::select! {
                    recv(receiver) -> result => {
                        match result {
                            Ok(change) => Self::dispatch_event(&inner, &change),
                            Err(_) => {
                                warn!("Parameter event channel closed unexpectedly");
                                break;
                            }
                        }
                    }
                    recv(shutdown_rx) -> _ => {
                        debug!("Parameter event dispatcher received shutdown signal");
                        break;
                    }
                }
            }

            debug!("Parameter event dispatcher stopped");
        });

        *handle_guard = Some(handle);
        *self.inner.shutdown_tx.lock() = Some(shutdown_tx);
    }

    /// Stops the dispatcher thread and waits for it to exit, unless called
    /// from a handler running on that thread. A no-op when not running.
    pub fn stop(&self) {
        if let Some(tx) = self.inner.shutdown_tx.lock().take() {
            if tx.send(()).is_err() {
                warn!("Parameter event dispatcher exited before shutdown signal");
            }
        }

        let handle = self.inner.thread_handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if let Err(e) = handle.join() {
                error!("Parameter event dispatcher panicked: {:?}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.thread_handle.lock().is_some()
    }

    /// Fails every pending and future wait and rejects further writes.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if !state.closed {
            state.closed = true;
            self.inner.changed.notify_all();
            debug!("Parameter store closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Writes `key` without the read-only check, for values seeded at boot.
    pub fn preload(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.validate_write(key, value)?;
        self.write(key, value)
    }

    /// Number of open subscriptions
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    fn validate_write(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()> {
        validate_key(key, self.inner.config.max_key_len)?;
        validate_value(value, self.inner.config.max_value_len)
    }

    fn write(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(StoreError::Closed.into());
        }
        let commit_id = state.table.write(key, value);
        self.inner.changed.notify_all();

        // Queued under the state lock so events leave in commit order
        if !self.inner.subscriptions.is_empty() {
            match self.event_sender.try_send(ParamChange::new(key, value)) {
                Ok(()) => {}
                Err(TrySendError::Full(change)) => {
                    warn!(key = %change.key, "Parameter event queue full, change notification dropped");
                }
                Err(TrySendError::Disconnected(_)) => {
                    warn!(key, "Parameter event queue disconnected");
                }
            }
        }
        trace!(key, commit_id, "Parameter written");
        Ok(())
    }

    /// Runs on the dispatcher thread. No map lock is held while a handler
    /// runs, so handlers may subscribe and unsubscribe.
    fn dispatch_event(
        inner: &Arc<StoreInner>,
        change: &ParamChange,
    ) {
        let handlers: Vec<(SubscriptionToken, ChangeHandler)> = inner
            .subscriptions
            .iter()
            .filter(|sub| change.key.starts_with(sub.key().as_str()))
            .map(|sub| (sub.value().token, Arc::clone(&sub.value().handler)))
            .collect();

        for (token, handler) in &handlers {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(&change.key, &change.value))).is_err() {
                error!(%token, key = %change.key, "Change handler panicked");
            }
        }

        trace!(key = %change.key, handlers = handlers.len(), "Event dispatched");
    }
}

impl ParameterStore for MemParamStore {
    fn get_parameter(
        &self,
        key: &str,
        default: Option<&str>,
    ) -> Result<String> {
        validate_key(key, self.inner.config.max_key_len)?;
        let state = self.inner.state.lock();
        match (state.table.get(key), default) {
            (Some(entry), _) => Ok(entry.value.clone()),
            (None, Some(default)) => Ok(default.to_string()),
            (None, None) => Err(StoreError::NotFound(key.to_string()).into()),
        }
    }

    fn set_parameter(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.validate_write(key, value)?;
        if self.inner.config.is_read_only(key) {
            return Err(StoreError::ReadOnly(key.to_string()).into());
        }
        self.write(key, value)
    }

    fn find_parameter(
        &self,
        key: &str,
    ) -> Option<ParamHandle> {
        self.inner.state.lock().table.index.get(key).map(|&slot| ParamHandle(slot))
    }

    fn commit_id(
        &self,
        handle: ParamHandle,
    ) -> Result<u64> {
        Ok(self.inner.state.lock().table.entry(handle)?.commit_id)
    }

    fn parameter_name(
        &self,
        handle: ParamHandle,
    ) -> Result<String> {
        Ok(self.inner.state.lock().table.entry(handle)?.name.clone())
    }

    fn parameter_value(
        &self,
        handle: ParamHandle,
    ) -> Result<String> {
        Ok(self.inner.state.lock().table.entry(handle)?.value.clone())
    }
}

impl ChangeSource for MemParamStore {
    fn subscribe(
        &self,
        prefix: &str,
        handler: ChangeHandler,
    ) -> Result<SubscriptionToken> {
        validate_prefix(prefix, self.inner.config.max_key_len)?;
        match self.inner.subscriptions.entry(prefix.to_string()) {
            Entry::Occupied(_) => Err(StoreError::PrefixBusy(prefix.to_string()).into()),
            Entry::Vacant(vacant) => {
                let token = SubscriptionToken(self.inner.next_token.fetch_add(1, Ordering::Relaxed));
                vacant.insert(Subscription { token, handler });
                debug!(prefix, %token, "Change subscription opened");
                Ok(token)
            }
        }
    }

    fn unsubscribe(
        &self,
        token: SubscriptionToken,
    ) {
        self.inner.subscriptions.retain(|prefix, sub| {
            let keep = sub.token != token;
            if !keep {
                debug!(prefix = %prefix, %token, "Change subscription closed");
            }
            keep
        });
    }

    fn wait_sync(
        &self,
        key: &str,
        expected: &str,
        timeout: Duration,
    ) -> WaitStatus {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if state.closed {
                return WaitStatus::Failed(CLOSED_REASON.to_string());
            }
            if state.table.get(key).is_some_and(|entry| entry.value == expected) {
                return WaitStatus::Matched;
            }
            if Instant::now() >= deadline {
                return WaitStatus::TimedOut;
            }
            self.inner.changed.wait_until(&mut state, deadline);
        }
    }
}

impl Drop for MemParamStore {
    fn drop(&mut self) {
        self.stop();
    }
}
