//! Prefix watch registry and asynchronous wait bridge for named, string-valued
//! system parameters.
//!
//! - [`WatchHub`] / [`ParamWatcher`]: many callbacks per prefix multiplexed
//!   over one low-level [`ChangeSource`] subscription.
//! - [`WaitBridge`]: "wait until `key == expected` or timeout" requests that
//!   resolve exactly once, on a worker thread.
//! - [`MemParamStore`]: in-process parameter service implementing both
//!   collaborator traits.

mod config;
mod constants;
mod errors;
mod source;
mod store;
mod validation;
mod wait;
mod watch;

pub use config::*;
pub use errors::*;
#[cfg(test)]
pub use source::MockChangeSource;
pub use source::ChangeHandler;
pub use source::ChangeSource;
pub use source::ParamHandle;
pub use source::ParameterStore;
pub use source::SubscriptionToken;
pub use source::WaitStatus;
pub use store::*;
pub use wait::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
