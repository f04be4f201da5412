//! Receive-side acknowledgement state machine.
//!
//! [`AckTracker`] owns everything the receiver knows about the sequence
//! space:
//!
//! - a dedup map from sequence to receive timestamp;
//! - the **contiguous watermark** `H` — the largest sequence such that all
//!   of `1..=H` have arrived — advanced greedily as holes fill;
//! - the ACK cadence counter that decides when a SACK frame is due.
//!
//! [`build_ack`] reports `H` plus a presence bitmap for the `window_size`
//! sequences above it; anything further out stays invisible to the sender
//! until the watermark advances.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.
//!
//! [`build_ack`]: AckTracker::build_ack

use std::collections::HashMap;

use crate::packet::encode_sack_frame;

/// Sequence span covered by each SACK bitmap, in packets.
pub const DEFAULT_WINDOW_SIZE: usize = 256;

/// Receive-count between SACK frames (1 = acknowledge every packet).
pub const DEFAULT_ACK_PERIOD: u64 = 1;

/// Classification of an inbound data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receipt {
    /// First time this sequence has been seen.
    New,
    /// Already recorded (retransmission overlap or network duplication).
    Duplicate,
}

/// Per-run receive-side state for one peer.
#[derive(Debug)]
pub struct AckTracker {
    /// Receive timestamp of every non-contiguous sequence seen so far.
    /// Entries at or below the watermark are evicted by [`cleanup_before`].
    ///
    /// [`cleanup_before`]: AckTracker::cleanup_before
    received: HashMap<u64, u64>,

    /// Largest `H` with all of `1..=H` received.  Monotonic.
    highest_contiguous: u64,

    /// Lifetime count of distinct sequences accepted.
    received_count: u64,

    window_size: usize,
    ack_period: u64,
    packets_since_ack: u64,
}

impl Default for AckTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE, DEFAULT_ACK_PERIOD)
    }
}

impl AckTracker {
    pub fn new(window_size: usize, ack_period: u64) -> Self {
        assert!(window_size > 0 && window_size % 8 == 0);
        Self {
            received: HashMap::new(),
            highest_contiguous: 0,
            received_count: 0,
            window_size,
            ack_period: ack_period.max(1),
            packets_since_ack: 0,
        }
    }

    /// Record an inbound data frame.
    ///
    /// A sequence at or below the watermark is a duplicate by definition,
    /// even if its dedup entry has already been evicted.  New sequences
    /// advance the watermark greedily: as long as the slot just above `H` is
    /// present, `H` moves up.
    pub fn on_data(&mut self, seq: u64, recv_ts_ns: u64) -> Receipt {
        if seq <= self.highest_contiguous || self.received.contains_key(&seq) {
            return Receipt::Duplicate;
        }

        self.received.insert(seq, recv_ts_ns);
        self.received_count += 1;
        self.packets_since_ack += 1;

        while self.received.contains_key(&(self.highest_contiguous + 1)) {
            self.highest_contiguous += 1;
        }
        Receipt::New
    }

    /// `true` when enough packets have arrived since the last SACK.
    pub fn should_ack(&self) -> bool {
        self.packets_since_ack >= self.ack_period
    }

    /// Make the next [`should_ack`] return `true` regardless of cadence.
    ///
    /// [`should_ack`]: AckTracker::should_ack
    pub fn force_ack(&mut self) {
        self.packets_since_ack = self.ack_period;
    }

    /// Build the wire bytes of a SACK frame and reset the cadence counter.
    ///
    /// The missing set is every hole in `(H, H + window_size]` at this
    /// moment; the frame encoder turns it into a presence bitmap.
    pub fn build_ack(&mut self) -> Vec<u8> {
        let h = self.highest_contiguous;
        let missing: Vec<u64> = (h + 1..=h + self.window_size as u64)
            .filter(|seq| !self.received.contains_key(seq))
            .collect();

        self.packets_since_ack = 0;
        encode_sack_frame(h, &missing, self.window_size)
    }

    /// Evict dedup entries strictly below `seq` to bound memory.
    ///
    /// Safe up to `H + 1`: sequences at or below the watermark classify as
    /// duplicates without consulting the map.
    pub fn cleanup_before(&mut self, seq: u64) {
        self.received.retain(|&s, _| s >= seq);
    }

    pub fn highest_contiguous(&self) -> u64 {
        self.highest_contiguous
    }

    /// Distinct sequences accepted over the tracker's lifetime.
    pub fn received_count(&self) -> u64 {
        self.received_count
    }

    /// Dedup entries currently held (drops as [`cleanup_before`] evicts).
    ///
    /// [`cleanup_before`]: AckTracker::cleanup_before
    pub fn tracked_len(&self) -> usize {
        self.received.len()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::decode_sack_frame;

    #[test]
    fn initial_state() {
        let t = AckTracker::default();
        assert_eq!(t.highest_contiguous(), 0);
        assert_eq!(t.received_count(), 0);
        assert!(!t.should_ack());
    }

    #[test]
    fn duplicate_receive_counted_once() {
        let mut t = AckTracker::default();
        assert_eq!(t.on_data(7, 100), Receipt::New);
        assert_eq!(t.on_data(7, 200), Receipt::Duplicate);
        assert_eq!(t.received_count(), 1);
    }

    #[test]
    fn watermark_advances_greedily_through_filled_hole() {
        let mut t = AckTracker::default();
        t.on_data(1, 0);
        t.on_data(2, 0);
        assert_eq!(t.highest_contiguous(), 2);

        // 4 and 5 arrive before 3: watermark holds.
        t.on_data(4, 0);
        t.on_data(5, 0);
        assert_eq!(t.highest_contiguous(), 2);

        // 3 fills the hole and the watermark jumps over 4 and 5.
        t.on_data(3, 0);
        assert_eq!(t.highest_contiguous(), 5);
    }

    #[test]
    fn watermark_is_monotonic() {
        let mut t = AckTracker::default();
        let mut prev = 0;
        for seq in [3u64, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5, 8, 7] {
            t.on_data(seq, 0);
            assert!(t.highest_contiguous() >= prev);
            prev = t.highest_contiguous();
        }
        // 1..=9 all present by now.
        assert_eq!(t.highest_contiguous(), 9);
    }

    #[test]
    fn sack_reports_watermark_and_holes() {
        let mut t = AckTracker::default();
        for seq in [1u64, 2, 3, 5] {
            t.on_data(seq, 0);
        }

        let frame = decode_sack_frame(&t.build_ack()).unwrap();
        assert_eq!(frame.ack_seq, 3);
        assert!(frame.missing.contains(&4));
        assert!(!frame.missing.contains(&5));
        assert!(frame.missing.contains(&6)); // hole beyond the highest receipt
    }

    #[test]
    fn ack_cadence_default_is_every_packet() {
        let mut t = AckTracker::default();
        assert!(!t.should_ack());
        t.on_data(1, 0);
        assert!(t.should_ack());
        t.build_ack();
        assert!(!t.should_ack());
    }

    #[test]
    fn ack_cadence_honors_period() {
        let mut t = AckTracker::new(256, 4);
        for seq in 1..=3u64 {
            t.on_data(seq, 0);
            assert!(!t.should_ack(), "no ack due after {seq} packets");
        }
        t.on_data(4, 0);
        assert!(t.should_ack());
        t.build_ack();
        assert!(!t.should_ack());
    }

    #[test]
    fn duplicates_do_not_advance_cadence() {
        let mut t = AckTracker::new(256, 2);
        t.on_data(1, 0);
        t.on_data(1, 0);
        t.on_data(1, 0);
        assert!(!t.should_ack());
    }

    #[test]
    fn force_ack_opens_the_gate() {
        let mut t = AckTracker::new(256, 100);
        t.on_data(1, 0);
        assert!(!t.should_ack());
        t.force_ack();
        assert!(t.should_ack());
        t.build_ack();
        assert!(!t.should_ack());
    }

    #[test]
    fn cleanup_keeps_duplicate_classification() {
        let mut t = AckTracker::default();
        for seq in 1..=100u64 {
            t.on_data(seq, 0);
        }
        assert_eq!(t.tracked_len(), 100);

        t.cleanup_before(t.highest_contiguous() + 1);
        assert_eq!(t.tracked_len(), 0);

        // A late retransmission of an evicted sequence is still a duplicate.
        assert_eq!(t.on_data(50, 0), Receipt::Duplicate);
        assert_eq!(t.received_count(), 100);
        // And the SACK is unaffected: watermark still 100.
        let frame = decode_sack_frame(&t.build_ack()).unwrap();
        assert_eq!(frame.ack_seq, 100);
    }

    #[test]
    fn cleanup_spares_entries_above_the_cutoff() {
        let mut t = AckTracker::default();
        t.on_data(1, 0);
        t.on_data(10, 0);
        t.cleanup_before(2);
        assert_eq!(t.tracked_len(), 1);
        assert_eq!(t.on_data(10, 0), Receipt::Duplicate);
    }
}
