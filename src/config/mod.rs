//! Configuration management for the parameter watch service.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file named by `SYSPARAM_CONFIG_PATH`
//! - Environment variable overrides (`SYSPARAM__<SECTION>__<FIELD>`)
//! - Component-wise validation

mod store;
mod wait;
mod watch;
pub use store::*;
pub use wait::*;
pub use watch::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_PATH_ENV;
use crate::constants::ENV_PREFIX;
use crate::Result;

/// Main configuration container
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `SYSPARAM_CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Watcher and hub limits
    #[serde(default)]
    pub watch: WatchConfig,
    /// Wait request limits
    #[serde(default)]
    pub wait: WaitConfig,
    /// In-memory parameter store behaviour
    #[serde(default)]
    pub store: StoreConfig,
}

impl Debug for Settings {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("watch", &self.watch)
            .field("wait", &self.wait)
            .field("store", &self.store)
            .finish()
    }
}

impl Settings {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in order, later ones overriding earlier:
    /// 1. Type defaults
    /// 2. File from `SYSPARAM_CONFIG_PATH` (if set)
    /// 3. Environment variables with `SYSPARAM__` prefix
    ///
    /// Callers MUST call `validate()` before using the result.
    ///
    /// ```ignore
    /// std::env::set_var("SYSPARAM__WATCH__MAX_PREFIX_LEN", "64");
    /// let settings = Settings::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        let settings: Self = builder.add_source(env_source()).build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Applies additional overrides from a file without validation.
    ///
    /// Merging order: current values, the new file, then the environment.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.watch.validate()?;
        self.wait.validate()?;
        self.store.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("store.read_only_prefixes")
}
