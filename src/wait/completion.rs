//! Single-resolution completion channel for scheduled waits.
//!
//! A [`Completion`] is moved into the worker that runs the wait. Resolving it
//! consumes it, so a request can only ever be resolved once. If it is dropped
//! unresolved (the worker panicked past its guard, or the runtime discarded the
//! task) the drop delivers `Failed(Abandoned)` instead, so every scheduled
//! request still yields exactly one outcome.

use std::fmt;
use std::future::Future;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use tokio::sync::oneshot;
use tracing::debug;
use tracing::error;
use tracing::warn;

/// Callback receiving the terminal outcome of a scheduled wait
pub type OnComplete = Box<dyn FnOnce(WaitOutcome) + Send + 'static>;

/// Terminal outcome of a wait request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The parameter reached the expected value
    Succeeded,
    /// The timeout elapsed first
    TimedOut,
    Failed(WaitFailure),
}

impl WaitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WaitOutcome::Succeeded)
    }
}

impl fmt::Display for WaitOutcome {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            WaitOutcome::Succeeded => write!(f, "succeeded"),
            WaitOutcome::TimedOut => write!(f, "timed out"),
            WaitOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitFailure {
    /// The store could not perform the wait
    #[error("parameter store wait failed: {0}")]
    Store(String),

    /// The store's wait primitive panicked on the worker
    #[error("wait worker panicked")]
    WorkerPanicked,

    /// The request was dropped before a worker resolved it
    #[error("wait request abandoned before completion")]
    Abandoned,
}

enum CompletionSink {
    Callback(OnComplete),
    Channel(oneshot::Sender<WaitOutcome>),
}

/// Write side of a scheduled wait. Counts itself in the owning bridge's
/// in-flight gauge until delivered.
pub(crate) struct Completion {
    request_id: u64,
    sink: Option<CompletionSink>,
    in_flight: Arc<AtomicUsize>,
}

impl fmt::Debug for Completion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Completion")
            .field("request_id", &self.request_id)
            .field("resolved", &self.sink.is_none())
            .finish()
    }
}

impl Completion {
    pub(crate) fn callback(
        request_id: u64,
        on_complete: OnComplete,
        in_flight: Arc<AtomicUsize>,
    ) -> Self {
        Self::with_sink(request_id, CompletionSink::Callback(on_complete), in_flight)
    }

    pub(crate) fn channel(
        request_id: u64,
        in_flight: Arc<AtomicUsize>,
    ) -> (Self, WaitTicket) {
        let (tx, rx) = oneshot::channel();
        let completion = Self::with_sink(request_id, CompletionSink::Channel(tx), in_flight);
        (completion, WaitTicket { request_id, rx })
    }

    fn with_sink(
        request_id: u64,
        sink: CompletionSink,
        in_flight: Arc<AtomicUsize>,
    ) -> Self {
        in_flight.fetch_add(1, Ordering::AcqRel);
        Self {
            request_id,
            sink: Some(sink),
            in_flight,
        }
    }

    pub(crate) fn resolve(
        mut self,
        outcome: WaitOutcome,
    ) {
        self.deliver(outcome);
    }

    /// Drops the completion without delivering anything. Used when the
    /// request never reached a worker and the caller gets the error instead.
    pub(crate) fn discard(mut self) {
        if self.sink.take().is_some() {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn deliver(
        &mut self,
        outcome: WaitOutcome,
    ) {
        let Some(sink) = self.sink.take() else {
            return;
        };
        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        match sink {
            CompletionSink::Callback(on_complete) => {
                let request_id = self.request_id;
                if panic::catch_unwind(AssertUnwindSafe(move || on_complete(outcome))).is_err() {
                    error!(request_id, "Wait completion callback panicked");
                }
            }
            CompletionSink::Channel(tx) => {
                if tx.send(outcome).is_err() {
                    debug!(request_id = self.request_id, "Wait ticket dropped before completion");
                }
            }
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.sink.is_some() {
            warn!(request_id = self.request_id, "Wait completion dropped unresolved");
            self.deliver(WaitOutcome::Failed(WaitFailure::Abandoned));
        }
    }
}

/// Read side of a scheduled wait, returned by [`crate::WaitBridge::submit`].
///
/// Await it from async code or call [`WaitTicket::blocking_outcome`] from a
/// plain thread.
#[derive(Debug)]
pub struct WaitTicket {
    request_id: u64,
    rx: oneshot::Receiver<WaitOutcome>,
}

impl WaitTicket {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Blocks the current thread until the outcome is delivered.
    ///
    /// # Panics
    /// When called from within an asynchronous execution context.
    pub fn blocking_outcome(self) -> WaitOutcome {
        self.rx.blocking_recv().unwrap_or(WaitOutcome::Failed(WaitFailure::Abandoned))
    }
}

impl Future for WaitTicket {
    type Output = WaitOutcome;

    fn poll(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(WaitOutcome::Failed(WaitFailure::Abandoned)))
    }
}
