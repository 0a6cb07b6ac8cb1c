// -
// Length bounds

/// Longest accepted watch prefix.
pub(crate) const MAX_PREFIX_LEN: usize = 128;

/// Longest accepted parameter key. Keys travel in 256-byte buffers, one byte
/// of which is the terminator.
pub(crate) const MAX_KEY_LEN: usize = 255;

/// Longest accepted parameter value, same buffer rule as keys.
pub(crate) const MAX_VALUE_LEN: usize = 255;

// -
// Parameter store

/// Keys under this prefix cannot be written after boot.
pub(crate) const READ_ONLY_PREFIX: &str = "ro.";

/// Default capacity of the store's change event queue.
pub(crate) const EVENT_QUEUE_SIZE: usize = 1024;

/// Prefix of environment variables overriding settings.
pub(crate) const ENV_PREFIX: &str = "SYSPARAM";

/// Environment variable naming an extra configuration file.
pub(crate) const CONFIG_PATH_ENV: &str = "SYSPARAM_CONFIG_PATH";
