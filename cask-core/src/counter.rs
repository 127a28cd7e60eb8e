//! Counter arithmetic shared by the stores.

use crate::error::{CacheError, CacheResult};

/// `current + delta`, failing instead of wrapping.
pub fn incremented(current: i64, delta: u64) -> CacheResult<i64> {
    i64::try_from(delta)
        .ok()
        .and_then(|delta| current.checked_add(delta))
        .ok_or_else(|| {
            CacheError::InvalidArgument(format!("incrementing {current} by {delta} overflows"))
        })
}

/// Amount to subtract so that the counter never drops below zero.
///
/// Returns `delta` when the counter can absorb it, otherwise exactly the
/// current value.
pub fn floored_decrement(current: i64, delta: u64) -> i64 {
    match i64::try_from(delta) {
        Ok(delta) if delta <= current => delta,
        _ => current,
    }
}
