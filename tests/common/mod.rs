use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use sysparam_watch::MemParamStore;
use sysparam_watch::ParamCallback;
use sysparam_watch::Settings;
use sysparam_watch::WaitBridge;
use sysparam_watch::WatchHub;

use crate::enable_logger;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A started store plus a hub and a bridge sharing it
pub struct Harness {
    pub store: Arc<MemParamStore>,
    pub hub: WatchHub,
    pub bridge: WaitBridge,
}

impl Harness {
    /// Must be called inside a tokio runtime.
    pub fn start() -> Self {
        enable_logger();
        let settings = Settings::default();
        let store = Arc::new(MemParamStore::new(settings.store.clone()));
        store.start();
        let hub = WatchHub::new(store.clone(), settings.watch.clone());
        let bridge = WaitBridge::new(store.clone(), settings.wait.clone()).expect("inside runtime");
        Self { store, hub, bridge }
    }
}

/// Callback tagging every observed `(key, value)` into a channel
pub fn tagged(
    tag: &'static str,
) -> (ParamCallback, Receiver<(&'static str, String, String)>) {
    let (tx, rx) = unbounded();
    (tagged_into(tag, tx), rx)
}

pub fn tagged_into(
    tag: &'static str,
    tx: crossbeam_channel::Sender<(&'static str, String, String)>,
) -> ParamCallback {
    ParamCallback::new(move |change| {
        let _ = tx.send((tag, change.key.clone(), change.value.clone()));
    })
}
