//! Monotonic timestamps for packet stamping and latency math.
//!
//! All on-wire and logged timestamps are nanoseconds from a steady clock
//! whose epoch is process start — never wall clock.  The first call anchors
//! the epoch; every later call measures against that anchor.

use std::sync::OnceLock;
use std::time::Instant;

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds elapsed since the process-start anchor.
///
/// Monotonic and non-decreasing across threads.  The anchor is created on
/// first use, so endpoints should call this once during setup to pin the
/// epoch before any timing-sensitive work.
pub fn timestamp_ns() -> u64 {
    PROCESS_START.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Convert a nanosecond timestamp difference to microseconds.
pub fn ns_to_us(ns: u64) -> f64 {
    ns as f64 / 1_000.0
}

/// Convert a nanosecond timestamp difference to seconds.
pub fn ns_to_secs(ns: u64) -> f64 {
    ns as f64 / 1e9
}
