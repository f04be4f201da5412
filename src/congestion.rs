//! TCP-style congestion control for the send loop.
//!
//! [`CongestionController`] keeps the classic `(cwnd, ssthresh, inflight)`
//! triple: slow start doubles the window below `ssthresh`, congestion
//! avoidance grows it by one above, and any loss signal halves it.  The
//! three fields are independently atomic — no pair of reads is guaranteed
//! coherent, which is fine because admission only ever compares a single
//! snapshot of each and every transition clamps back into bounds.
//!
//! [`CongestionMonitor`] is an optional observational wrapper that counts
//! events and logs transitions without changing controller behavior.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hard floor for the congestion window.
pub const MIN_CWND: u64 = 10;
/// Hard ceiling for the congestion window.
pub const MAX_CWND: u64 = 10_000;
/// Window at startup.
pub const INITIAL_CWND: u64 = 1_000;
/// Slow-start threshold at startup.
pub const INITIAL_SSTHRESH: u64 = 5_000;

// ---------------------------------------------------------------------------
// CongestionController
// ---------------------------------------------------------------------------

/// Admission control state shared between the send loop and the ACK task.
///
/// All methods are `&self`; the fields use relaxed atomics because there is
/// no cross-field invariant another thread must observe instantaneously.
#[derive(Debug)]
pub struct CongestionController {
    cwnd: AtomicU64,
    ssthresh: AtomicU64,
    inflight: AtomicU64,

    min_cwnd: u64,
    max_cwnd: u64,
}

impl Default for CongestionController {
    fn default() -> Self {
        Self::new(INITIAL_CWND, INITIAL_SSTHRESH, MIN_CWND, MAX_CWND)
    }
}

impl CongestionController {
    pub fn new(initial_cwnd: u64, initial_ssthresh: u64, min_cwnd: u64, max_cwnd: u64) -> Self {
        assert!(min_cwnd >= 1 && min_cwnd <= max_cwnd);
        Self {
            cwnd: AtomicU64::new(initial_cwnd.clamp(min_cwnd, max_cwnd)),
            ssthresh: AtomicU64::new(initial_ssthresh),
            inflight: AtomicU64::new(0),
            min_cwnd,
            max_cwnd,
        }
    }

    pub fn cwnd(&self) -> u64 {
        self.cwnd.load(Ordering::Relaxed)
    }

    pub fn ssthresh(&self) -> u64 {
        self.ssthresh.load(Ordering::Relaxed)
    }

    pub fn inflight(&self) -> u64 {
        self.inflight.load(Ordering::Relaxed)
    }

    /// `true` when another packet may enter the network.
    pub fn can_send(&self) -> bool {
        self.inflight() < self.cwnd()
    }

    /// One more packet entered the network.
    pub fn packet_sent(&self) {
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    /// One packet left the network.  Saturates at zero: a spurious ack (for
    /// a sequence never counted, e.g. after a reconfiguration) is tolerated
    /// rather than treated as a bug.
    pub fn packet_acked(&self) {
        let _ = self
            .inflight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    /// An ACK frame arrived; `has_loss` reports whether it carried evidence
    /// of holes.  Grows the window on clean ACKs, halves it on loss.
    pub fn on_ack_received(&self, has_loss: bool) {
        if has_loss {
            self.multiplicative_decrease();
        } else {
            self.increase();
        }
    }

    /// A duplicate ACK is treated as a loss signal.
    pub fn on_duplicate_ack(&self) {
        self.multiplicative_decrease();
    }

    /// Retransmission timeout: halve the threshold, then restart slow start
    /// from the floor.
    pub fn on_timeout(&self) {
        self.multiplicative_decrease();
        self.cwnd.store(self.min_cwnd, Ordering::Relaxed);
    }

    /// Fraction of the window currently in flight.
    pub fn utilization(&self) -> f64 {
        let cwnd = self.cwnd();
        if cwnd == 0 {
            return 0.0;
        }
        self.inflight() as f64 / cwnd as f64
    }

    /// `true` when the next clean ACK would be a slow-start step.
    pub fn in_slow_start(&self) -> bool {
        self.cwnd() < self.ssthresh()
    }

    fn increase(&self) {
        let cwnd = self.cwnd();
        let next = if cwnd < self.ssthresh() {
            // Slow start: double per clean ACK.
            (cwnd * 2).min(self.max_cwnd)
        } else {
            // Congestion avoidance: linear growth.
            (cwnd + 1).min(self.max_cwnd)
        };
        self.cwnd.store(next, Ordering::Relaxed);
    }

    fn multiplicative_decrease(&self) {
        let cwnd = self.cwnd();
        let halved = (cwnd / 2).max(self.min_cwnd);
        self.cwnd.store(halved, Ordering::Relaxed);
        self.ssthresh.store(halved, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// CongestionMonitor — observational overlay
// ---------------------------------------------------------------------------

/// Event counters accumulated by [`CongestionMonitor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CongestionSnapshot {
    pub acks: u64,
    pub losses: u64,
    pub timeouts: u64,
    pub slow_start_steps: u64,
    pub avoidance_steps: u64,
}

impl CongestionSnapshot {
    /// Losses per loss-or-ack event.
    pub fn loss_rate(&self) -> f64 {
        let events = self.acks + self.losses;
        if events == 0 {
            return 0.0;
        }
        self.losses as f64 / events as f64
    }
}

/// Counts controller events and logs window transitions.
///
/// Purely observational: every event is applied to the inner controller
/// exactly once, so behavior with and without the monitor is identical.
#[derive(Debug, Default)]
pub struct CongestionMonitor {
    ctrl: CongestionController,
    acks: AtomicU64,
    losses: AtomicU64,
    timeouts: AtomicU64,
    slow_start_steps: AtomicU64,
    avoidance_steps: AtomicU64,
}

impl CongestionMonitor {
    pub fn new(ctrl: CongestionController) -> Self {
        Self {
            ctrl,
            ..Self::default()
        }
    }

    pub fn controller(&self) -> &CongestionController {
        &self.ctrl
    }

    pub fn can_send(&self) -> bool {
        self.ctrl.can_send()
    }

    pub fn packet_sent(&self) {
        self.ctrl.packet_sent();
    }

    pub fn packet_acked(&self) {
        self.ctrl.packet_acked();
    }

    pub fn on_ack_received(&self, has_loss: bool) {
        let before = self.ctrl.cwnd();
        if has_loss {
            self.losses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.acks.fetch_add(1, Ordering::Relaxed);
            if self.ctrl.in_slow_start() {
                self.slow_start_steps.fetch_add(1, Ordering::Relaxed);
            } else {
                self.avoidance_steps.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.ctrl.on_ack_received(has_loss);

        let after = self.ctrl.cwnd();
        if has_loss {
            log::debug!(
                "loss event: cwnd {before} -> {after} (loss rate {:.1}%)",
                self.snapshot().loss_rate() * 100.0
            );
        } else if after != before {
            log::debug!("cwnd increase: {before} -> {after}");
        }
    }

    pub fn on_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        let before = self.ctrl.cwnd();
        self.ctrl.on_timeout();
        log::debug!("timeout event: cwnd {before} -> {} (slow start)", self.ctrl.cwnd());
    }

    pub fn snapshot(&self) -> CongestionSnapshot {
        CongestionSnapshot {
            acks: self.acks.load(Ordering::Relaxed),
            losses: self.losses.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            slow_start_steps: self.slow_start_steps.load(Ordering::Relaxed),
            avoidance_steps: self.avoidance_steps.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
