//! Prefix watch registry
//!
//! Many logical subscribers share a single low-level change subscription per
//! watched prefix.
//!
//! ```text
//! ┌──────────────┐  subscribe(prefix) once   ┌──────────────┐
//! │ ParamWatcher │ ────────────────────────▶ │ ChangeSource │
//! │  (prefix)    │ ◀──────────────────────── │              │
//! └──────┬───────┘   handler(key, value)     └──────────────┘
//!        │ dispatch
//!        ▼
//! ┌──────────────────────┐
//! │ SubscriptionRegistry │  id 1 → A, id 2 → B, ...  (ascending id order)
//! └──────────────────────┘
//! ```
//!
//! - [`WatchHub`] owns watchers by exact prefix and tears them down.
//! - [`ParamWatcher`] opens the low-level subscription on the first callback
//!   and keeps it until destroyed.
//! - [`SubscriptionRegistry`] holds the callbacks and runs dispatch passes
//!   without holding its lock across a callback.

mod hub;
mod registry;
mod watcher;


pub use hub::WatchHub;
pub use hub::WatcherHandle;
pub use registry::DispatchReport;
pub use registry::ParamCallback;
pub use registry::ParamChange;
pub use registry::SubscriptionId;
pub use registry::SubscriptionRegistry;
pub use watcher::ParamWatcher;
pub use watcher::WatcherStatus;
