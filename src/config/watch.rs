use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::MAX_PREFIX_LEN;
use crate::Error;
use crate::Result;

/// Watcher and hub settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Longest prefix `WatchHub::watch` accepts
    ///
    /// **Default**: 128
    #[serde(default = "default_max_prefix_len")]
    pub max_prefix_len: usize,

    /// Emit a warning when the same callback is registered twice on one watcher
    ///
    /// Duplicates are always accepted; this only controls the diagnostic.
    ///
    /// **Default**: true
    #[serde(default = "default_warn_on_duplicate_callback")]
    pub warn_on_duplicate_callback: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            max_prefix_len: default_max_prefix_len(),
            warn_on_duplicate_callback: default_warn_on_duplicate_callback(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_prefix_len == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch.max_prefix_len must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

const fn default_max_prefix_len() -> usize {
    MAX_PREFIX_LEN
}

const fn default_warn_on_duplicate_callback() -> bool {
    true
}
