use std::fmt;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::completion::Completion;
use super::completion::OnComplete;
use super::completion::WaitFailure;
use super::completion::WaitOutcome;
use super::completion::WaitTicket;
use crate::validation::validate_key;
use crate::validation::validate_timeout;
use crate::validation::validate_value;
use crate::ChangeSource;
use crate::Error;
use crate::Result;
use crate::WaitConfig;
use crate::WaitStatus;

/// Identifier assigned to every accepted wait request
pub type WaitRequestId = u64;

/// What [`WaitBridge::wait_async`] did with a valid request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitSubmission {
    /// Handed to a worker; the outcome arrives through the completion callback
    Scheduled(WaitRequestId),
    /// No callback was supplied, so the wait ran on the caller's thread
    Completed(WaitOutcome),
}

/// Runs "wait until `key == expected` or timeout" requests against a
/// [`ChangeSource`] on the tokio blocking pool.
///
/// Arguments are checked before anything is scheduled; a rejected request
/// never reaches a worker and never resolves. An accepted request resolves
/// exactly once.
pub struct WaitBridge {
    source: Arc<dyn ChangeSource>,
    runtime: Handle,
    config: WaitConfig,
    next_request_id: AtomicU64,
    in_flight: Arc<AtomicUsize>,
}

impl fmt::Debug for WaitBridge {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WaitBridge")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl WaitBridge {
    /// Creates a bridge scheduling on the current tokio runtime.
    ///
    /// # Errors
    /// `Error::Fatal` when called outside a runtime.
    pub fn new(
        source: Arc<dyn ChangeSource>,
        config: WaitConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Fatal(format!("wait bridge requires a tokio runtime: {e}")))?;
        Ok(Self::with_runtime(source, config, runtime))
    }

    pub fn with_runtime(
        source: Arc<dyn ChangeSource>,
        config: WaitConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            source,
            runtime,
            config,
            next_request_id: AtomicU64::new(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of scheduled requests whose outcome has not been delivered yet
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Blocks the calling thread until the wait resolves.
    pub fn wait(
        &self,
        key: &str,
        expected: &str,
        timeout_ms: i32,
    ) -> Result<WaitOutcome> {
        let timeout = self.validate(key, expected, timeout_ms)?;
        let request_id = self.next_request_id();
        debug!(request_id, key, timeout_ms, "Wait running on caller thread");
        Ok(run_wait(self.source.as_ref(), request_id, key, expected, timeout))
    }

    /// Schedules the wait on a worker and reports the outcome to
    /// `on_complete`, exactly once, on that worker.
    ///
    /// Without a callback the wait runs on the caller's thread and its outcome
    /// is returned as [`WaitSubmission::Completed`].
    ///
    /// # Errors
    /// `InvalidArgument` for an empty or oversized key or value, or a negative
    /// timeout. `Fatal` when the runtime is shut down and refuses the task.
    /// `on_complete` is not called in either case.
    pub fn wait_async(
        &self,
        key: &str,
        expected: &str,
        timeout_ms: i32,
        on_complete: Option<OnComplete>,
    ) -> Result<WaitSubmission> {
        let Some(on_complete) = on_complete else {
            return self.wait(key, expected, timeout_ms).map(WaitSubmission::Completed);
        };

        let timeout = self.validate(key, expected, timeout_ms)?;
        let request_id = self.next_request_id();
        let completion = Completion::callback(request_id, on_complete, Arc::clone(&self.in_flight));
        self.schedule(request_id, key, expected, timeout, completion)?;
        Ok(WaitSubmission::Scheduled(request_id))
    }

    /// Schedules the wait and returns a ticket resolving to its outcome.
    ///
    /// # Errors
    /// Same as [`Self::wait_async`].
    pub fn submit(
        &self,
        key: &str,
        expected: &str,
        timeout_ms: i32,
    ) -> Result<WaitTicket> {
        let timeout = self.validate(key, expected, timeout_ms)?;
        let request_id = self.next_request_id();
        let (completion, ticket) = Completion::channel(request_id, Arc::clone(&self.in_flight));
        self.schedule(request_id, key, expected, timeout, completion)?;
        Ok(ticket)
    }

    fn validate(
        &self,
        key: &str,
        expected: &str,
        timeout_ms: i32,
    ) -> Result<Duration> {
        validate_key(key, self.config.max_key_len)?;
        validate_value(expected, self.config.max_value_len)?;
        validate_timeout(timeout_ms)
    }

    fn next_request_id(&self) -> WaitRequestId {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    fn schedule(
        &self,
        request_id: WaitRequestId,
        key: &str,
        expected: &str,
        timeout: Duration,
        completion: Completion,
    ) -> Result<()> {
        let source = Arc::clone(&self.source);
        let slot = Arc::new(Mutex::new(Some(completion)));
        let task_slot = Arc::clone(&slot);
        let task_key = key.to_string();
        let task_expected = expected.to_string();

        // A shut-down runtime cancels the task on the spot; the completion is
        // still in the slot and the handle is already finished.
        let handle = self.runtime.spawn_blocking(move || {
            let Some(completion) = task_slot.lock().take() else {
                return;
            };
            let outcome = run_wait(source.as_ref(), request_id, &task_key, &task_expected, timeout);
            completion.resolve(outcome);
        });

        if handle.is_finished() {
            if let Some(completion) = slot.lock().take() {
                completion.discard();
                warn!(request_id, key, "Wait refused: runtime is shut down");
                return Err(Error::Fatal(format!(
                    "wait runtime is shut down, request {request_id} not scheduled"
                )));
            }
        }

        // Detached: the completion carries the outcome, not the join handle.
        debug!(request_id, key, ?timeout, "Wait scheduled");
        Ok(())
    }
}

fn run_wait(
    source: &dyn ChangeSource,
    request_id: WaitRequestId,
    key: &str,
    expected: &str,
    timeout: Duration,
) -> WaitOutcome {
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| source.wait_sync(key, expected, timeout))) {
        Ok(WaitStatus::Matched) => WaitOutcome::Succeeded,
        Ok(WaitStatus::TimedOut) => WaitOutcome::TimedOut,
        Ok(WaitStatus::Failed(reason)) => WaitOutcome::Failed(WaitFailure::Store(reason)),
        Err(_) => {
            error!(request_id, key, "Parameter store wait panicked");
            WaitOutcome::Failed(WaitFailure::WorkerPanicked)
        }
    };
    debug!(request_id, key, %outcome, "Wait resolved");
    outcome
}
