//! Parameter Watch Error Hierarchy
//!
//! Synchronous failures of the watch registry, the wait bridge and the
//! parameter store collaborator. Terminal outcomes of scheduled waits are not
//! errors; they are reported through [`crate::WaitOutcome`].

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed key, value, prefix or timeout
    #[error(transparent)]
    InvalidArgument(#[from] ValidationError),

    /// Watcher lifecycle and callback bookkeeping failures
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Failures reported by the parameter store collaborator
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures such as resource exhaustion
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Classification of every [`Error`] onto the public failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    NotFound,
    SubscriptionFailed,
    Store,
    Config,
    Fatal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Watch(WatchError::InvalidState { .. }) => ErrorKind::InvalidState,
            Error::Watch(WatchError::NotFound { .. }) => ErrorKind::NotFound,
            Error::Watch(WatchError::SubscriptionFailed { .. }) => ErrorKind::SubscriptionFailed,
            Error::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            Error::Store(_) => ErrorKind::Store,
            Error::Config(_) => ErrorKind::Config,
            Error::Fatal(_) => ErrorKind::Fatal,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Parameter key must not be empty")]
    EmptyKey,

    #[error("Parameter key length {len} exceeds limit {max}")]
    KeyTooLong { len: usize, max: usize },

    #[error("Parameter value must not be empty")]
    EmptyValue,

    #[error("Parameter value length {len} exceeds limit {max}")]
    ValueTooLong { len: usize, max: usize },

    #[error("Watch prefix must not be empty")]
    EmptyPrefix,

    #[error("Watch prefix length {len} exceeds limit {max}")]
    PrefixTooLong { len: usize, max: usize },

    #[error("Wait timeout must not be negative (got {0}ms)")]
    NegativeTimeout(i32),
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The watcher was destroyed; it accepts no further callbacks
    #[error("Watcher for prefix {prefix:?} has been destroyed")]
    InvalidState { prefix: String },

    /// Explicit removal named a callback or subscription id that is not registered
    #[error("No {target} registered on watcher for prefix {prefix:?}")]
    NotFound { prefix: String, target: String },

    /// The change source refused to open the low-level subscription
    #[error("Failed to subscribe to changes under prefix {prefix:?}")]
    SubscriptionFailed {
        prefix: String,
        #[source]
        source: Box<Error>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Key has no value and the caller supplied no default
    #[error("Parameter {0:?} not found")]
    NotFound(String),

    /// Key lives under a read-only prefix
    #[error("Parameter {0:?} is read-only")]
    ReadOnly(String),

    /// Handle does not name a known parameter
    #[error("Invalid parameter handle {0}")]
    InvalidHandle(u32),

    /// The exact prefix already carries a change subscription
    #[error("Prefix {0:?} is already being watched")]
    PrefixBusy(String),

    /// Store has been closed
    #[error("Parameter store is closed")]
    Closed,
}
