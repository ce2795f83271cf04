//! Single-slot memoization of the most recent full detection result (§4.6).
//!
//! The cache is keyed implicitly: it stores the last result regardless of
//! which flag set produced it. This is deliberate — see the design doc's
//! open-question note on memoization — and is why callers mixing flag sets
//! across calls are pointed at `NO_MEMO`.

use std::sync::Mutex;
use std::sync::OnceLock;

use crate::result::DetectionResult;

static SLOT: OnceLock<Mutex<Option<DetectionResult>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<DetectionResult>> {
    SLOT.get_or_init(|| Mutex::new(None))
}

/// Read the cached result, if any. A poisoned lock (a prior panic while
/// holding it) is treated the same as an empty cache rather than panicking
/// the caller.
pub fn load() -> Option<DetectionResult> {
    match slot().lock() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Replace the cached result.
pub fn store(result: DetectionResult) {
    match slot().lock() {
        Ok(mut guard) => *guard = Some(result),
        Err(poisoned) => *poisoned.into_inner() = Some(result),
    }
}

#[cfg(test)]
pub(crate) fn clear() {
    match slot().lock() {
        Ok(mut guard) => *guard = None,
        Err(poisoned) => *poisoned.into_inner() = None,
    }
}
