use std::sync::OnceLock;
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// Milliseconds elapsed on a process-wide monotonic clock.
///
/// Record creation times and expiry arithmetic are expressed on this clock, so
/// values are only comparable within one process.
pub fn current_time_millis() -> u64 {
    millis_at(Instant::now())
}

/// Converts an [`Instant`] into the same millisecond clock as [`current_time_millis`].
pub fn millis_at(now: Instant) -> u64 {
    now.saturating_duration_since(epoch()).as_millis() as u64
}

/// Converts a millisecond timestamp back into an [`Instant`].
pub fn instant_at(millis: u64) -> Instant {
    epoch() + Duration::from_millis(millis)
}
