//! Redistribution backoff.
//!
//! The rule is a pure function of the attempt counter so it can be tested
//! independently of the scheduler: while the counter is under the max-cycle
//! threshold, a resend happens only when the count is an exact power of two
//! (one set bit); at or beyond the threshold, a resend happens every
//! `max_cycles` ticks.

use std::time::Duration;

/// Whether a pending pair should be resent on the tick that produced this
/// attempt count.
pub fn should_resend(attempt_count: u32, max_cycles: u32) -> bool {
    if attempt_count == 0 {
        return false;
    }
    if attempt_count < max_cycles {
        attempt_count.count_ones() == 1
    } else {
        attempt_count % max_cycles == 0
    }
}

/// Derive the max-cycle threshold from the configured maximum backoff and
/// the tick interval.
///
/// A max backoff shorter than the interval would yield zero cycles and
/// collapse the backoff into resend-every-tick by division; the result is
/// clamped to 1 instead, which resends every tick explicitly.
pub fn max_cycles(max_backoff: Duration, interval: Duration) -> u32 {
    if interval.is_zero() {
        return 1;
    }
    let cycles = (max_backoff.as_millis() / interval.as_millis()) as u32;
    cycles.max(1)
}
