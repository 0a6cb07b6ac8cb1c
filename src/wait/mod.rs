//! Asynchronous wait bridge
//!
//! Turns the store's blocking "wait until `key == expected`" primitive into a
//! scheduled request with a single-resolution completion:
//!
//! ```text
//! Created ──validate──▶ Scheduled ──worker──▶ Succeeded | TimedOut | Failed ──▶ Delivered
//!    │
//!    └── InvalidArgument (synchronous, no completion)
//! ```

mod bridge;
mod completion;


pub use bridge::WaitBridge;
pub use bridge::WaitRequestId;
pub use bridge::WaitSubmission;
pub use completion::OnComplete;
pub use completion::WaitFailure;
pub use completion::WaitOutcome;
pub use completion::WaitTicket;
