use std::time::Duration;

use crossbeam_channel::unbounded;
use sysparam_watch::ChangeSource;
use sysparam_watch::ErrorKind;
use sysparam_watch::ParameterStore;
use sysparam_watch::WatcherStatus;

use crate::common::tagged;
use crate::common::tagged_into;
use crate::common::Harness;
use crate::common::RECV_TIMEOUT;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fan_out_in_registration_order() {
    let h = Harness::start();
    let (tx, rx) = unbounded();
    let watcher = h.hub.watch("net.").unwrap();
    watcher.add_callback(tagged_into("A", tx.clone())).unwrap();
    watcher.add_callback(tagged_into("B", tx)).unwrap();

    h.store.set_parameter("net.state", "up").unwrap();

    let first = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    let second = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(first, ("A", "net.state".to_string(), "up".to_string()));
    assert_eq!(second, ("B", "net.state".to_string(), "up".to_string()));
    assert_eq!(h.store.subscription_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_changes_follow_write_order() {
    let h = Harness::start();
    let (callback, rx) = tagged("A");
    h.hub.watch("svc.").unwrap().add_callback(callback).unwrap();

    for state in ["starting", "running", "stopping", "stopped"] {
        h.store.set_parameter("svc.logd", state).unwrap();
    }

    let seen: Vec<String> = (0..4).map(|_| rx.recv_timeout(RECV_TIMEOUT).unwrap().2).collect();
    assert_eq!(seen, vec!["starting", "running", "stopping", "stopped"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removed_callback_keeps_low_level_subscription() {
    let h = Harness::start();
    let (callback, rx) = tagged("A");
    let watcher = h.hub.watch("net.").unwrap();

    let id = watcher.add_callback(callback).unwrap();
    watcher.remove_subscription(id).unwrap();

    assert_eq!(watcher.callback_count(), 0);
    assert_eq!(watcher.status(), WatcherStatus::Subscribed);
    assert_eq!(h.store.subscription_count(), 1);

    h.store.set_parameter("net.state", "up").unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_destroy_stops_delivery_and_frees_prefix() {
    let h = Harness::start();
    let (callback, rx) = tagged("old");
    let watcher = h.hub.watch("net.").unwrap();
    watcher.add_callback(callback).unwrap();

    assert!(h.hub.destroy("net."));
    assert_eq!(h.store.subscription_count(), 0);
    assert_eq!(watcher.on_change(|_| {}).unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(h.store.subscription_count(), 0);

    let (callback, fresh_rx) = tagged("new");
    h.hub.watch("net.").unwrap().add_callback(callback).unwrap();
    h.store.set_parameter("net.state", "up").unwrap();

    assert_eq!(fresh_rx.recv_timeout(RECV_TIMEOUT).unwrap().0, "new");
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refused_subscription_leaves_watcher_idle() {
    let h = Harness::start();
    let token = h.store.subscribe("net.", std::sync::Arc::new(|_: &str, _: &str| {})).unwrap();
    let watcher = h.hub.watch("net.").unwrap();

    let err = watcher.on_change(|_| {}).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SubscriptionFailed);
    assert_eq!(watcher.status(), WatcherStatus::Idle);

    h.store.unsubscribe(token);
    watcher.on_change(|_| {}).unwrap();
    assert_eq!(watcher.status(), WatcherStatus::Subscribed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hub_drop_releases_all_subscriptions() {
    let h = Harness::start();
    for prefix in ["net.", "svc.", "persist."] {
        h.hub.watch(prefix).unwrap().on_change(|_| {}).unwrap();
    }
    assert_eq!(h.store.subscription_count(), 3);

    let store = h.store.clone();
    drop(h);

    assert_eq!(store.subscription_count(), 0);
}
