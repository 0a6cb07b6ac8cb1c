use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::MAX_KEY_LEN;
use crate::constants::MAX_VALUE_LEN;
use crate::Error;
use crate::Result;

/// Wait bridge request limits
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WaitConfig {
    /// Longest key a wait request may name
    ///
    /// **Default**: 255
    #[serde(default = "default_max_key_len")]
    pub max_key_len: usize,

    /// Longest expected value a wait request may carry
    ///
    /// **Default**: 255
    #[serde(default = "default_max_value_len")]
    pub max_value_len: usize,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_key_len: default_max_key_len(),
            max_value_len: default_max_value_len(),
        }
    }
}

impl WaitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_key_len == 0 {
            return Err(Error::Config(ConfigError::Message(
                "wait.max_key_len must be greater than 0".into(),
            )));
        }
        if self.max_value_len == 0 {
            return Err(Error::Config(ConfigError::Message(
                "wait.max_value_len must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

const fn default_max_key_len() -> usize {
    MAX_KEY_LEN
}

const fn default_max_value_len() -> usize {
    MAX_VALUE_LEN
}
