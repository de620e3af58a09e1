#![cfg(test)]

use once_cell::sync::Lazy;
use std::sync::Mutex;

/// Serializes tests that set `WAKEDECK__*` environment variables.
pub(crate) static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
