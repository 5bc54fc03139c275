//! Monotonic time source used by the scheduler.

use std::time::{Duration, Instant};

/// The current monotonic time.
#[inline]
pub fn now() -> Instant {
    Instant::now()
}

/// The monotonic time `offset` from now.
#[inline]
pub fn future(offset: Duration) -> Instant {
    now() + offset
}

/// Microseconds elapsed between `origin` and now, saturating at zero.
pub fn micros_since(origin: Instant) -> u64 {
    let elapsed = now().saturating_duration_since(origin);
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}
