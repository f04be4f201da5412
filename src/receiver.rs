//! Receiving endpoint: single-task recv loop with ACK cadence.
//!
//! Each datagram is parsed as a data frame, classified against the
//! [`AckTracker`], logged and counted when new, and answered with a SACK
//! frame whenever the cadence says one is due.  The sender's address is
//! learned from the first data frame and kept for the rest of the run.
//!
//! The loop runs until Ctrl-C, then forces a final ACK (so the sender's
//! pending table drains even when the cadence is coarse) and prints the
//! summary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};

use crate::ack::{AckTracker, Receipt};
use crate::clock;
use crate::logger::TimingLog;
use crate::packet::{self, MAX_PACKET_SIZE};
use crate::socket::Socket;
use crate::stats::{ProgressReporter, StatsCollector};

/// Accepted-packet interval between dedup-set cleanups.
const CLEANUP_EVERY: u64 = 65_536;

/// Everything the receiving endpoint needs to run.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// UDP port to listen on.
    pub listen_port: u16,
    /// CSV output path.
    pub log_path: PathBuf,
    /// SACK bitmap span in sequences (multiple of 8).
    pub window_size: usize,
    /// Packets between SACK frames (1 = acknowledge every packet).
    pub ack_period: u64,
}

/// Run the receiving endpoint until Ctrl-C.
pub async fn run(config: ReceiverConfig) -> Result<()> {
    ensure!(
        config.window_size > 0 && config.window_size % 8 == 0,
        "ack window must be a positive multiple of 8"
    );

    let socket = Arc::new(
        Socket::bind(SocketAddr::from(([0, 0, 0, 0], config.listen_port)))
            .await
            .context("binding receiver socket")?,
    );
    let logger = TimingLog::create(&config.log_path)
        .with_context(|| format!("creating log file {}", config.log_path.display()))?;
    let stats = StatsCollector::new();
    let mut tracker = AckTracker::new(config.window_size, config.ack_period);
    let mut progress = ProgressReporter::new(0);

    log::info!(
        "listening on port {} (logging to {})",
        config.listen_port,
        config.log_path.display()
    );

    let mut buf = [0u8; MAX_PACKET_SIZE];
    let mut peer: Option<SocketAddr> = None;
    let mut accepted_since_cleanup = 0u64;
    stats.start_collection();

    loop {
        let (n, from) = tokio::select! {
            read = socket.recv_from(&mut buf) => match read {
                Ok(read) => read,
                Err(e) => {
                    log::debug!("socket read failed: {e}");
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        };
        let recv_ts = clock::timestamp_ns();

        let header = match packet::decode_data_frame(&buf[..n]) {
            Ok(header) => header,
            Err(e) => {
                log::debug!("dropping malformed datagram from {from}: {e}");
                continue;
            }
        };
        let peer = *peer.get_or_insert(from);

        if tracker.on_data(header.seq, recv_ts) == Receipt::New {
            if let Err(e) = logger.log_receiver_row(header.seq, recv_ts, header.send_ts_ns) {
                log::error!("log write failed for seq {}: {e}", header.seq);
            }
            stats.add_packet_received(n);
            stats.add_latency_measurement(header.send_ts_ns, recv_ts);

            progress.increment();
            if progress.due() {
                progress.print_progress();
            }

            accepted_since_cleanup += 1;
            if accepted_since_cleanup >= CLEANUP_EVERY {
                tracker.cleanup_before(tracker.highest_contiguous() + 1);
                accepted_since_cleanup = 0;
            }
        }

        if tracker.should_ack() {
            let frame = tracker.build_ack();
            if let Err(e) = socket.send_to(&frame, peer).await {
                log::debug!("ack send failed: {e}");
            }
        }
    }

    // Final ACK so the sender sees the closing watermark.
    tracker.force_ack();
    if let Some(peer) = peer {
        let frame = tracker.build_ack();
        if let Err(e) = socket.send_to(&frame, peer).await {
            log::debug!("final ack send failed: {e}");
        }
    }

    stats.end_collection();
    progress.finish();
    logger.flush().context("flushing log file")?;

    log::info!(
        "received {} distinct sequences, contiguous through {}",
        tracker.received_count(),
        tracker.highest_contiguous()
    );
    stats.print_summary();
    Ok(())
}
