use std::sync::Arc;

use parking_lot::Mutex;

use crate::ParamCallback;
use crate::ParamChange;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = env_logger::builder().is_test(true).try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Shared, ordered log of `(tag, change)` pairs written by callbacks
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<(String, ParamChange)>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback that records every change under `tag`
    pub fn callback(
        &self,
        tag: &str,
    ) -> ParamCallback {
        let log = Arc::clone(&self.0);
        let tag = tag.to_string();
        ParamCallback::new(move |change| log.lock().push((tag.clone(), change.clone())))
    }

    pub fn entries(&self) -> Vec<(String, ParamChange)> {
        self.0.lock().clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.0.lock().iter().map(|(tag, _)| tag.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}
