//! Collaborator traits consumed by the watch and wait core.
//!
//! [`ChangeSource`] is the single-registration-per-prefix change feed that
//! watchers multiplex over, plus the blocking wait primitive the wait bridge
//! runs on its workers. [`ParameterStore`] is the plain read/write proxy that
//! callers use next to the core.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Handler the change source calls with `(key, value)` for every change under
/// a subscribed prefix.
pub type ChangeHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Token identifying one low-level subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(pub u64);

impl fmt::Display for SubscriptionToken {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Result of the store's blocking wait primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitStatus {
    /// The parameter holds the expected value
    Matched,
    /// The deadline passed without a match
    TimedOut,
    /// The store could not perform the wait
    Failed(String),
}

#[cfg_attr(test, automock)]
pub trait ChangeSource: Send + Sync {
    /// Opens a subscription delivering every change whose key starts with
    /// `prefix` to `handler`.
    fn subscribe(
        &self,
        prefix: &str,
        handler: ChangeHandler,
    ) -> Result<SubscriptionToken>;

    /// Closes a subscription. Unknown tokens are ignored.
    fn unsubscribe(
        &self,
        token: SubscriptionToken,
    );

    /// Blocks the calling thread until `key` equals `expected` or `timeout`
    /// elapses. A zero timeout checks once without blocking.
    fn wait_sync(
        &self,
        key: &str,
        expected: &str,
        timeout: Duration,
    ) -> WaitStatus;
}

/// Stable handle of a parameter entry inside a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamHandle(pub u32);

pub trait ParameterStore: Send + Sync {
    /// Returns the value of `key`, falling back to `default`.
    fn get_parameter(
        &self,
        key: &str,
        default: Option<&str>,
    ) -> Result<String>;

    fn set_parameter(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()>;

    fn find_parameter(
        &self,
        key: &str,
    ) -> Option<ParamHandle>;

    /// Number of writes applied to the entry.
    fn commit_id(
        &self,
        handle: ParamHandle,
    ) -> Result<u64>;

    fn parameter_name(
        &self,
        handle: ParamHandle,
    ) -> Result<String>;

    fn parameter_value(
        &self,
        handle: ParamHandle,
    ) -> Result<String>;
}
