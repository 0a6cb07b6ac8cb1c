use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread::ThreadId;
use std::time::Duration;

use parking_lot::Mutex;

use crate::ChangeHandler;
use crate::ChangeSource;
use crate::Result;
use crate::StoreError;
use crate::SubscriptionToken;
use crate::WaitStatus;

/// Deterministic in-process change source.
///
/// `emit` runs the matching handlers on the calling thread; `wait_sync`
/// returns a scripted status after an optional delay and records the thread
/// it ran on.
pub struct FakeChangeSource {
    subscriptions: Mutex<BTreeMap<u64, (String, ChangeHandler)>>,
    next_token: AtomicUsize,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    refuse_subscribe: Mutex<bool>,
    wait_status: Mutex<WaitStatus>,
    wait_delay: Mutex<Duration>,
    wait_threads: Mutex<Vec<ThreadId>>,
}

impl Default for FakeChangeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChangeSource {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(BTreeMap::new()),
            next_token: AtomicUsize::new(1),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
            refuse_subscribe: Mutex::new(false),
            wait_status: Mutex::new(WaitStatus::Matched),
            wait_delay: Mutex::new(Duration::ZERO),
            wait_threads: Mutex::new(Vec::new()),
        }
    }

    pub fn refuse_subscriptions(
        &self,
        refuse: bool,
    ) {
        *self.refuse_subscribe.lock() = refuse;
    }

    pub fn script_wait(
        &self,
        status: WaitStatus,
        delay: Duration,
    ) {
        *self.wait_status.lock() = status;
        *self.wait_delay.lock() = delay;
    }

    /// Delivers `(key, value)` to every subscription whose prefix matches.
    pub fn emit(
        &self,
        key: &str,
        value: &str,
    ) {
        let handlers: Vec<ChangeHandler> = self
            .subscriptions
            .lock()
            .values()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(key, value);
        }
    }

    pub fn live_subscriptions(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn live_subscriptions_for(
        &self,
        prefix: &str,
    ) -> usize {
        self.subscriptions.lock().values().filter(|(p, _)| p == prefix).count()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    pub fn wait_threads(&self) -> Vec<ThreadId> {
        self.wait_threads.lock().clone()
    }
}

impl ChangeSource for FakeChangeSource {
    fn subscribe(
        &self,
        prefix: &str,
        handler: ChangeHandler,
    ) -> Result<SubscriptionToken> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if *self.refuse_subscribe.lock() {
            return Err(StoreError::PrefixBusy(prefix.to_string()).into());
        }
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) as u64;
        self.subscriptions.lock().insert(token, (prefix.to_string(), handler));
        Ok(SubscriptionToken(token))
    }

    fn unsubscribe(
        &self,
        token: SubscriptionToken,
    ) {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().remove(&token.0);
    }

    fn wait_sync(
        &self,
        _key: &str,
        _expected: &str,
        _timeout: Duration,
    ) -> WaitStatus {
        self.wait_threads.lock().push(std::thread::current().id());
        let delay = *self.wait_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.wait_status.lock().clone()
    }
}
