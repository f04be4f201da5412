//! Send-side reliability: pending table, ACK processing, retransmissions.
//!
//! Two layers, split the same way as the receive side:
//!
//! - [`PendingTable`] is the pure state machine — an ordered map from
//!   sequence to [`Pending`] entry, swept by cumulative ACKs and probed by
//!   selective ones.  It performs no I/O and collects its results into a
//!   [`SackOutcome`] so callers can dispatch outside any lock.
//! - [`SenderReliability`] owns the socket-facing half: transmitting data
//!   frames, parsing inbound SACK datagrams, firing the ACK callback, and
//!   re-sending the frames the receiver reported missing.
//!
//! Retransmission is entirely SACK-driven: a sequence is re-sent exactly
//! once per ACK frame that reports it missing, and there is no timer.  The
//! engine never gives up on a sequence — the retransmit cap is purely
//! observational.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock;
use crate::packet::{self, FrameError, MIN_MESSAGE_SIZE};
use crate::socket::Socket;

/// Retransmit count above which the engine starts complaining in the log.
pub const DEFAULT_MAX_RETRANSMITS: u32 = 3;

// ---------------------------------------------------------------------------
// Pending table
// ---------------------------------------------------------------------------

/// Per-sequence record held from transmission until cumulative ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    pub seq: u64,
    /// Monotonic clock at the *first* transmission; retransmissions reuse it.
    pub send_ts_ns: u64,
    pub retransmits: u32,
}

/// One sequence leaving the pending table, reported to the ACK callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckEvent {
    pub seq: u64,
    pub send_ts_ns: u64,
    pub ack_recv_ts_ns: u64,
    pub retransmits: u32,
}

/// Everything one SACK frame did to the pending table.
///
/// Collected inside the critical section, dispatched after it.
#[derive(Debug, Default)]
pub struct SackOutcome {
    /// Sequences cumulatively acknowledged, in increasing order.
    pub acked: Vec<AckEvent>,
    /// Live entries the frame reported missing, counts already bumped.
    pub retransmit: Vec<Pending>,
}

impl SackOutcome {
    /// `true` when the frame carried evidence of holes in sent traffic.
    ///
    /// Reported-missing positions with no live entry (sequences beyond what
    /// has been sent — the bitmap always spans its full window) do not
    /// count: only an actual retransmission order signals loss.
    pub fn has_loss(&self) -> bool {
        !self.retransmit.is_empty()
    }
}

/// Ordered map of unacknowledged sequences.
///
/// This type only manages state; socket I/O and event dispatch are the
/// caller's responsibility.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: BTreeMap<u64, Pending>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly transmitted sequence.
    ///
    /// The caller guarantees `seq` is strictly greater than every sequence
    /// ever inserted, so keys never collide.
    pub fn insert(&mut self, seq: u64, send_ts_ns: u64) {
        self.entries.insert(
            seq,
            Pending {
                seq,
                send_ts_ns,
                retransmits: 0,
            },
        );
    }

    /// Apply one parsed SACK frame.
    ///
    /// Every entry at or below `ack_seq` leaves the table and becomes an
    /// [`AckEvent`] stamped with `ack_recv_ts_ns`; an entry can therefore be
    /// acknowledged at most once over its lifetime.  Every `missing`
    /// sequence that still has a live entry gets its retransmit count
    /// bumped and a copy queued for re-send.
    pub fn process_ack(&mut self, ack_seq: u64, missing: &[u64], ack_recv_ts_ns: u64) -> SackOutcome {
        let mut outcome = SackOutcome::default();

        // Cumulative sweep: split off everything above the watermark and
        // drain what remains (all keys <= ack_seq, in order).
        let above = self.entries.split_off(&(ack_seq + 1));
        let acked = std::mem::replace(&mut self.entries, above);
        for (_, entry) in acked {
            outcome.acked.push(AckEvent {
                seq: entry.seq,
                send_ts_ns: entry.send_ts_ns,
                ack_recv_ts_ns,
                retransmits: entry.retransmits,
            });
        }

        // Selective holes: bump and queue whatever is still live.
        for &seq in missing {
            if let Some(entry) = self.entries.get_mut(&seq) {
                entry.retransmits += 1;
                outcome.retransmit.push(*entry);
            }
        }
        outcome
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current state of one pending sequence, if still unacknowledged.
    pub fn get(&self, seq: u64) -> Option<Pending> {
        self.entries.get(&seq).copied()
    }
}

// ---------------------------------------------------------------------------
// SenderReliability
// ---------------------------------------------------------------------------

/// Callback invoked once per acknowledged sequence, outside the table lock.
pub type AckCallback = Box<dyn Fn(AckEvent) + Send + Sync>;

/// Socket-facing reliability engine for the sending endpoint.
pub struct SenderReliability {
    socket: Arc<Socket>,
    peer: SocketAddr,
    msg_size: usize,
    max_retransmits: u32,
    pending: Mutex<PendingTable>,
    ack_callback: Option<AckCallback>,
    stopped: AtomicBool,
}

impl SenderReliability {
    pub fn new(socket: Arc<Socket>, peer: SocketAddr, msg_size: usize) -> Self {
        Self {
            socket,
            peer,
            msg_size,
            max_retransmits: DEFAULT_MAX_RETRANSMITS,
            pending: Mutex::new(PendingTable::new()),
            ack_callback: None,
            stopped: AtomicBool::new(false),
        }
    }

    /// Install the per-sequence ACK handler.  Call before sharing the engine
    /// across tasks.
    pub fn set_ack_callback(&mut self, callback: AckCallback) {
        self.ack_callback = Some(callback);
    }

    /// Retransmit count above which [`on_sack`] logs a warning.
    ///
    /// [`on_sack`]: SenderReliability::on_sack
    pub fn set_max_retransmits(&mut self, cap: u32) {
        self.max_retransmits = cap;
    }

    /// Transmit a fresh data frame and record it as pending.
    ///
    /// Returns `false` when the socket refused the datagram, in which case
    /// the sequence is *not* recorded — from the engine's point of view it
    /// was never sent.  The caller guarantees `seq` strictly increases
    /// across calls.
    pub async fn send(&self, seq: u64, send_ts_ns: u64) -> bool {
        let frame = packet::encode_data_frame(seq, send_ts_ns, self.msg_size);
        match self.socket.send_to(&frame, self.peer).await {
            Ok(n) if n > 0 => {
                self.pending.lock().unwrap().insert(seq, send_ts_ns);
                true
            }
            Ok(_) => false,
            Err(e) => {
                log::debug!("send of seq {seq} failed: {e}");
                false
            }
        }
    }

    /// Feed one raw SACK datagram to the engine.
    ///
    /// Parses the frame, sweeps the pending table under its lock, then —
    /// with the lock released — fires the ACK callback for each newly
    /// acknowledged sequence and re-sends every reported hole.  Retransmit
    /// failures are fire-and-forget.
    pub async fn on_sack(&self, datagram: &[u8]) -> Result<SackSummary, FrameError> {
        let frame = packet::decode_sack_frame(datagram)?;
        let now_ns = clock::timestamp_ns();

        let outcome = self
            .pending
            .lock()
            .unwrap()
            .process_ack(frame.ack_seq, &frame.missing, now_ns);

        if let Some(callback) = &self.ack_callback {
            for event in &outcome.acked {
                callback(*event);
            }
        }

        for entry in &outcome.retransmit {
            if entry.retransmits > self.max_retransmits {
                log::warn!(
                    "seq {} on retransmit #{} (cap {})",
                    entry.seq,
                    entry.retransmits,
                    self.max_retransmits
                );
            }
            // Header-only frame: the receiver reads nothing past the header,
            // and the original send timestamp is preserved.
            let frame = packet::encode_data_frame(entry.seq, entry.send_ts_ns, MIN_MESSAGE_SIZE);
            if let Err(e) = self.socket.send_to(&frame, self.peer).await {
                log::debug!("retransmit of seq {} failed: {e}", entry.seq);
            }
        }

        Ok(SackSummary {
            newly_acked: outcome.acked.len(),
            retransmitted: outcome.retransmit.len(),
            has_loss: outcome.has_loss(),
        })
    }

    /// Number of sequences currently awaiting acknowledgement.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Cooperative shutdown signal for the ACK task.  Idempotent.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

/// What one SACK frame did, for the coordination layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SackSummary {
    pub newly_acked: usize,
    pub retransmitted: usize,
    pub has_loss: bool,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
