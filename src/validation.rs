//! Argument checks shared by the hub, the wait bridge and the store.

use std::time::Duration;

use crate::Result;
use crate::ValidationError;

pub(crate) fn validate_prefix(
    prefix: &str,
    max_len: usize,
) -> Result<()> {
    if prefix.is_empty() {
        return Err(ValidationError::EmptyPrefix.into());
    }
    if prefix.len() > max_len {
        return Err(ValidationError::PrefixTooLong {
            len: prefix.len(),
            max: max_len,
        }
        .into());
    }
    Ok(())
}

pub(crate) fn validate_key(
    key: &str,
    max_len: usize,
) -> Result<()> {
    if key.is_empty() {
        return Err(ValidationError::EmptyKey.into());
    }
    if key.len() > max_len {
        return Err(ValidationError::KeyTooLong {
            len: key.len(),
            max: max_len,
        }
        .into());
    }
    Ok(())
}

pub(crate) fn validate_value(
    value: &str,
    max_len: usize,
) -> Result<()> {
    if value.is_empty() {
        return Err(ValidationError::EmptyValue.into());
    }
    if value.len() > max_len {
        return Err(ValidationError::ValueTooLong {
            len: value.len(),
            max: max_len,
        }
        .into());
    }
    Ok(())
}

/// Converts a millisecond timeout; `0` is a valid "do not block" timeout.
pub(crate) fn validate_timeout(timeout_ms: i32) -> Result<Duration> {
    if timeout_ms < 0 {
        return Err(ValidationError::NegativeTimeout(timeout_ms).into());
    }
    Ok(Duration::from_millis(timeout_ms as u64))
}
