use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use sysparam_watch::ErrorKind;
use sysparam_watch::MemParamStore;
use sysparam_watch::ParameterStore;
use sysparam_watch::StoreConfig;
use sysparam_watch::WaitBridge;
use sysparam_watch::WaitConfig;
use sysparam_watch::WaitFailure;
use sysparam_watch::WaitOutcome;
use sysparam_watch::WaitSubmission;
use tokio::sync::oneshot;

use crate::common::Harness;
use crate::enable_logger;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_never_reached_value_times_out_once() {
    let h = Harness::start();
    h.store.set_parameter("boot.done", "false").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel();

    let counter = calls.clone();
    let started = Instant::now();
    h.bridge
        .wait_async(
            "boot.done",
            "true",
            500,
            Some(Box::new(move |outcome| {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(outcome);
            })),
        )
        .unwrap();

    assert_eq!(rx.await.unwrap(), WaitOutcome::TimedOut);
    assert!(started.elapsed() >= Duration::from_millis(500));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.bridge.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_write_satisfies_wait() {
    let h = Harness::start();
    let store = h.store.clone();
    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        store.set_parameter("boot.done", "true").unwrap();
    });

    let outcome = h.bridge.submit("boot.done", "true", 5_000).unwrap().await;

    assert_eq!(outcome, WaitOutcome::Succeeded);
    writer.join().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zero_timeout_checks_current_value() {
    let h = Harness::start();
    h.store.set_parameter("net.state", "up").unwrap();

    assert_eq!(h.bridge.submit("net.state", "up", 0).unwrap().await, WaitOutcome::Succeeded);
    assert_eq!(h.bridge.submit("net.state", "down", 0).unwrap().await, WaitOutcome::TimedOut);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_closed_store_fails_pending_wait() {
    let h = Harness::start();
    let ticket = h.bridge.submit("boot.done", "true", 5_000).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.store.close();

    assert_eq!(
        ticket.await,
        WaitOutcome::Failed(WaitFailure::Store("parameter store closed".into()))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_request_is_rejected_synchronously() {
    let h = Harness::start();

    let err = h
        .bridge
        .wait_async("boot.done", "true", -1, Some(Box::new(|_| panic!("must not run"))))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(h.bridge.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_without_callback_blocks_caller() {
    let h = Harness::start();
    h.store.set_parameter("boot.done", "true").unwrap();

    let submission = h.bridge.wait_async("boot.done", "true", 100, None).unwrap();

    assert_eq!(submission, WaitSubmission::Completed(WaitOutcome::Succeeded));
}

#[test]
fn test_blocking_wait_from_plain_thread() {
    enable_logger();
    let runtime = tokio::runtime::Builder::new_multi_thread().worker_threads(1).build().unwrap();
    let store = Arc::new(MemParamStore::new(StoreConfig::default()));
    let bridge = WaitBridge::with_runtime(store.clone(), WaitConfig::default(), runtime.handle().clone());

    let ticket = bridge.submit("svc.logd", "running", 2_000).unwrap();
    thread::sleep(Duration::from_millis(50));
    store.set_parameter("svc.logd", "running").unwrap();

    assert_eq!(ticket.blocking_outcome(), WaitOutcome::Succeeded);
    assert_eq!(bridge.wait("svc.logd", "running", 0).unwrap(), WaitOutcome::Succeeded);
}
