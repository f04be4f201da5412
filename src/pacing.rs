//! Target-rate pacing for the send loop.
//!
//! [`RateLimiter`] enforces a floor on inter-send spacing: at a target rate
//! of `r` messages per second, at least `1/r` seconds must elapse between
//! consecutive sends.  It does not try to recover from underruns — a slow
//! iteration is never compensated by a burst, so the achieved rate is at
//! most the target.

use std::time::{Duration, Instant};

/// Sleep quantum while waiting out the inter-send interval.
const PACING_SLEEP: Duration = Duration::from_micros(10);

/// Floor-only pacer for one sending task.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum spacing between sends; `None` disables pacing entirely.
    interval: Option<Duration>,
    /// When the previous send was stamped; `None` before the first send.
    last_send: Option<Instant>,
}

impl RateLimiter {
    /// A pacer for `rate` messages per second.  Any rate ≤ 0 (or one so high
    /// the interval rounds to zero) disables pacing.
    pub fn new(rate: f64) -> Self {
        let interval = if rate > 0.0 {
            let micros = 1_000_000.0 / rate;
            let d = Duration::from_micros(micros as u64);
            (!d.is_zero()).then_some(d)
        } else {
            None
        };
        Self {
            interval,
            last_send: None,
        }
    }

    /// `true` when enough time has passed since the previous [`mark_sent`].
    ///
    /// [`mark_sent`]: RateLimiter::mark_sent
    pub fn can_send(&self) -> bool {
        match (self.interval, self.last_send) {
            (Some(interval), Some(last)) => last.elapsed() >= interval,
            _ => true,
        }
    }

    /// Block until [`can_send`] holds.  The caller must follow up with
    /// [`mark_sent`] once the datagram is actually on the wire.
    ///
    /// [`can_send`]: RateLimiter::can_send
    /// [`mark_sent`]: RateLimiter::mark_sent
    pub async fn wait_for_next_send(&self) {
        while !self.can_send() {
            tokio::time::sleep(PACING_SLEEP).await;
        }
    }

    /// Stamp the moment of the send the interval is measured from.
    pub fn mark_sent(&mut self) {
        self.last_send = Some(Instant::now());
    }
}
