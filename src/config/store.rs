use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::constants::EVENT_QUEUE_SIZE;
use crate::constants::MAX_KEY_LEN;
use crate::constants::MAX_VALUE_LEN;
use crate::constants::READ_ONLY_PREFIX;
use crate::Error;
use crate::Result;

/// In-memory parameter store settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Longest key the store accepts on write
    ///
    /// **Default**: 255
    #[serde(default = "default_max_key_len")]
    pub max_key_len: usize,

    /// Longest value the store accepts on write
    ///
    /// **Default**: 255
    #[serde(default = "default_max_value_len")]
    pub max_value_len: usize,

    /// Key prefixes rejected by `set_parameter`
    ///
    /// Values under these prefixes can only be seeded through `preload`.
    ///
    /// **Default**: `["ro."]`
    #[serde(default = "default_read_only_prefixes")]
    pub read_only_prefixes: Vec<String>,

    /// Capacity of the change event queue between writers and the dispatcher
    /// thread. `0` means unbounded.
    ///
    /// When the queue is full new events are dropped with a warning.
    ///
    /// **Default**: 1024
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_key_len: default_max_key_len(),
            max_value_len: default_max_value_len(),
            read_only_prefixes: default_read_only_prefixes(),
            event_queue_size: default_event_queue_size(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_key_len == 0 {
            return Err(Error::Config(ConfigError::Message(
                "store.max_key_len must be greater than 0".into(),
            )));
        }
        if self.max_value_len == 0 {
            return Err(Error::Config(ConfigError::Message(
                "store.max_value_len must be greater than 0".into(),
            )));
        }
        if self.read_only_prefixes.iter().any(|p| p.is_empty()) {
            return Err(Error::Config(ConfigError::Message(
                "store.read_only_prefixes must not contain an empty prefix".into(),
            )));
        }
        if self.event_queue_size > 100_000 {
            warn!(
                "store.event_queue_size ({}) is very large and may hold many undelivered events",
                self.event_queue_size
            );
        }
        Ok(())
    }

    pub(crate) fn is_read_only(
        &self,
        key: &str,
    ) -> bool {
        self.read_only_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }
}

const fn default_max_key_len() -> usize {
    MAX_KEY_LEN
}

const fn default_max_value_len() -> usize {
    MAX_VALUE_LEN
}

fn default_read_only_prefixes() -> Vec<String> {
    vec![READ_ONLY_PREFIX.to_string()]
}

const fn default_event_queue_size() -> usize {
    EVENT_QUEUE_SIZE
}
