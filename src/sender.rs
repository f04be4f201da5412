//! Sending endpoint: paced send loop plus background ACK task.
//!
//! # Structure
//!
//! ```text
//!  main task                      ACK task
//!  ─────────                      ────────
//!  for seq in 1..=N               loop
//!    wait for cwnd credit           recv SACK datagram (bounded poll)
//!    wait for pacer                 feed SenderReliability::on_sack
//!    send + record pending          notify congestion (has_loss)
//!    packet_sent / stats
//! ```
//!
//! Both tasks share the reliability engine, the congestion monitor, and the
//! stats collector behind `Arc`s.  The ACK callback (wired here) logs one
//! CSV row per acknowledged sequence, records the round trip in the stats,
//! and returns the sequence's congestion credit.
//!
//! Shutdown: after the last sequence is submitted the main task sleeps for
//! a trailing-ACK grace period, flips the engine's stop flag, and joins the
//! ACK task, which polls the flag between bounded socket reads.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use tokio::time::timeout;

use crate::clock;
use crate::congestion::{CongestionController, CongestionMonitor};
use crate::logger::TimingLog;
use crate::pacing::RateLimiter;
use crate::packet::{MAX_PACKET_SIZE, MIN_MESSAGE_SIZE};
use crate::reliability::SenderReliability;
use crate::socket::Socket;
use crate::stats::{ProgressReporter, StatsCollector};

/// Sleep while waiting for a congestion-window credit.
const CWND_WAIT: Duration = Duration::from_micros(10);

/// Upper bound on one ACK-task socket read, so the stop flag is observed
/// promptly.
const ACK_POLL: Duration = Duration::from_millis(100);

/// Pause after a failed ACK-socket read before retrying.
const ACK_RETRY: Duration = Duration::from_micros(100);

/// How long to keep the ACK task alive after the last send, for ACKs still
/// in flight.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Everything the sending endpoint needs to run.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Receiver address.
    pub peer: SocketAddr,
    /// Total datagram size, `16..=2048` bytes.
    pub msg_size: usize,
    /// Target send rate in messages per second; ≤ 0 disables pacing.
    pub rate: f64,
    /// Number of sequences to send (`1..=total_msgs`).
    pub total_msgs: u64,
    /// CSV output path.
    pub log_path: PathBuf,
}

/// Run the sending endpoint to completion.
pub async fn run(config: SenderConfig) -> Result<()> {
    ensure!(
        (MIN_MESSAGE_SIZE..=MAX_PACKET_SIZE).contains(&config.msg_size),
        "message size must be in {MIN_MESSAGE_SIZE}..={MAX_PACKET_SIZE} bytes"
    );

    let socket = Arc::new(
        Socket::bind(SocketAddr::from(([0, 0, 0, 0], 0)))
            .await
            .context("binding sender socket")?,
    );
    let logger = Arc::new(
        TimingLog::create(&config.log_path)
            .with_context(|| format!("creating log file {}", config.log_path.display()))?,
    );
    let stats = Arc::new(StatsCollector::new());
    let congestion = Arc::new(CongestionMonitor::new(CongestionController::default()));

    let mut reliability = SenderReliability::new(Arc::clone(&socket), config.peer, config.msg_size);
    {
        let logger = Arc::clone(&logger);
        let stats = Arc::clone(&stats);
        let congestion = Arc::clone(&congestion);
        let msg_size = config.msg_size;
        reliability.set_ack_callback(Box::new(move |event| {
            if let Err(e) = logger.log_sender_row(
                event.seq,
                event.send_ts_ns,
                event.ack_recv_ts_ns,
                event.retransmits,
            ) {
                log::error!("log write failed for seq {}: {e}", event.seq);
            }
            stats.add_latency_measurement(event.send_ts_ns, event.ack_recv_ts_ns);
            stats.add_packet_received(msg_size);
            congestion.packet_acked();
        }));
    }
    let reliability = Arc::new(reliability);

    let ack_task = tokio::spawn(ack_loop(
        Arc::clone(&socket),
        Arc::clone(&reliability),
        Arc::clone(&congestion),
    ));

    log::info!(
        "sending {} messages of {} bytes to {} (target rate {:.0} msg/s)",
        config.total_msgs,
        config.msg_size,
        config.peer,
        config.rate
    );

    let mut limiter = RateLimiter::new(config.rate);
    let mut progress = ProgressReporter::new(config.total_msgs);
    stats.start_collection();

    for seq in 1..=config.total_msgs {
        while !congestion.can_send() {
            tokio::time::sleep(CWND_WAIT).await;
        }
        limiter.wait_for_next_send().await;
        limiter.mark_sent();

        let send_ts = clock::timestamp_ns();
        if reliability.send(seq, send_ts).await {
            congestion.packet_sent();
            stats.add_packet_sent(config.msg_size);
            progress.increment();
            if progress.due() {
                progress.print_progress();
            }
        }
    }
    progress.finish();

    log::info!("all sequences submitted, draining trailing ACKs");
    tokio::time::sleep(DRAIN_GRACE).await;
    reliability.stop();
    ack_task.await.context("joining ACK task")?;

    stats.end_collection();
    logger.flush().context("flushing log file")?;

    let leftover = reliability.pending_count();
    if leftover > 0 {
        log::warn!("{leftover} sequences never acknowledged");
    }
    let cc = congestion.snapshot();
    log::info!(
        "congestion: {} acks, {} losses, {} timeouts ({} slow-start / {} avoidance steps)",
        cc.acks,
        cc.losses,
        cc.timeouts,
        cc.slow_start_steps,
        cc.avoidance_steps
    );
    stats.print_summary();
    Ok(())
}

/// Background task: read SACK datagrams and feed them to the engine until
/// the stop flag flips.
async fn ack_loop(
    socket: Arc<Socket>,
    reliability: Arc<SenderReliability>,
    congestion: Arc<CongestionMonitor>,
) {
    let mut buf = [0u8; MAX_PACKET_SIZE];

    while !reliability.is_stopped() {
        let (n, _from) = match timeout(ACK_POLL, socket.recv_from(&mut buf)).await {
            Ok(Ok(read)) => read,
            Ok(Err(e)) => {
                log::debug!("ack socket read failed: {e}");
                tokio::time::sleep(ACK_RETRY).await;
                continue;
            }
            Err(_elapsed) => continue, // re-check the stop flag
        };
        if n == 0 {
            continue;
        }

        match reliability.on_sack(&buf[..n]).await {
            Ok(summary) => congestion.on_ack_received(summary.has_loss),
            Err(e) => log::debug!("dropping malformed ack datagram: {e}"),
        }
    }
}
