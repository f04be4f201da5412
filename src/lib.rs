//! `udp-bench` — latency/throughput measurement of an unreliable datagram
//! path under a reliable, window-based delivery protocol.
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────┐  data frames (seq ‖ ts ‖ padding)  ┌────────────┐
//!  │   Sender   │───────────────────────────────────▶│  Receiver  │
//!  │            │                                    │            │
//!  │ send loop  │        SACK frames                 │ AckTracker │
//!  │ + ACK task │◀───────────────────────────────────│ (watermark │
//!  └────┬───────┘   (watermark ‖ presence bitmap)    │  + dedup)  │
//!       │                                            └─────┬──────┘
//!  ┌────▼────────────────────────────┐                     │
//!  │ SenderReliability (pending tbl) │               per-packet CSV
//!  │ CongestionMonitor (cwnd/ssthr)  │
//!  │ RateLimiter  ·  StatsCollector  │
//!  └────┬────────────────────────────┘
//!       │ raw UDP datagrams
//!  ┌────▼──────┐
//!  │  Socket   │  (thin async wrapper around tokio UdpSocket)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]      — wire format (serialise / deserialise both frame types)
//! - [`reliability`] — sender-side pending table and SACK processing
//! - [`ack`]         — receiver-side dedup, watermark, SACK construction
//! - [`congestion`]  — cwnd/ssthresh/inflight admission control
//! - [`pacing`]      — target-rate floor on inter-send spacing
//! - [`stats`]       — latency samples, percentiles, throughput counters
//! - [`logger`]      — per-packet CSV timing logs
//! - [`clock`]       — monotonic nanosecond timestamps
//! - [`socket`]      — async UDP socket abstraction
//! - [`sender`]      — sending endpoint (send loop + background ACK task)
//! - [`receiver`]    — receiving endpoint (recv loop + ACK cadence)

pub mod ack;
pub mod clock;
pub mod congestion;
pub mod logger;
pub mod pacing;
pub mod packet;
pub mod receiver;
pub mod reliability;
pub mod sender;
pub mod socket;
pub mod stats;
