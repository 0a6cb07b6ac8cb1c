use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sysparam_watch::MemParamStore;
use sysparam_watch::ParameterStore;
use sysparam_watch::Result;
use sysparam_watch::Settings;
use sysparam_watch::WaitBridge;
use sysparam_watch::WaitOutcome;
use sysparam_watch::WaitSubmission;
use sysparam_watch::WatchHub;
use tokio::sync::oneshot;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = Settings::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability();
    info!(?settings, "Settings loaded");

    let store = Arc::new(MemParamStore::new(settings.store.clone()));
    store.start();
    store.preload("ro.build.version", "1.0.0")?;

    let hub = WatchHub::new(store.clone(), settings.watch.clone());
    let bridge = WaitBridge::new(store.clone(), settings.wait.clone())?;

    let watcher = hub.watch("net.")?;
    watcher.on_change(|change| info!(key = %change.key, value = %change.value, "net change (first)"))?;
    watcher.on_change(|change| info!(key = %change.key, value = %change.value, "net change (second)"))?;

    store.set_parameter("net.state", "up")?;
    store.set_parameter("net.ip", "192.168.1.20")?;

    // Boot completes in the background
    let booter = {
        let store = store.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            if let Err(e) = store.set_parameter("boot.done", "true") {
                error!("Failed to mark boot complete: {:?}", e);
            }
        })
    };

    let (tx, rx) = oneshot::channel();
    let submission = bridge.wait_async(
        "boot.done",
        "true",
        2_000,
        Some(Box::new(move |outcome| {
            let _ = tx.send(outcome);
        })),
    )?;
    let outcome = match submission {
        WaitSubmission::Completed(outcome) => outcome,
        WaitSubmission::Scheduled(request_id) => {
            info!(request_id, "Waiting for boot.done");
            rx.await.unwrap_or(WaitOutcome::Failed(sysparam_watch::WaitFailure::Abandoned))
        }
    };
    println!("boot.done wait {outcome}");

    // An already-satisfied wait does not block
    let ticket = bridge.submit("net.state", "up", 0)?;
    println!("net.state wait {}", ticket.await);

    if booter.join().is_err() {
        error!("Boot thread panicked");
    }

    hub.shutdown();
    store.stop();
    println!("Exiting program.");
    Ok(())
}

pub fn init_observability() -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    guard
}
