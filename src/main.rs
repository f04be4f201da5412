//! Entry point for `udp-bench`.
//!
//! Parses CLI arguments and dispatches into either **sender** or
//! **receiver** mode.  All protocol work is delegated to library modules;
//! `main.rs` owns only process setup (logging, argument parsing).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use udp_bench::ack::{DEFAULT_ACK_PERIOD, DEFAULT_WINDOW_SIZE};
use udp_bench::receiver::{self, ReceiverConfig};
use udp_bench::sender::{self, SenderConfig};

/// Measure UDP path latency and throughput under reliable delivery.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send paced, congestion-controlled traffic and log per-packet RTTs.
    Sender {
        /// Receiver IP address (e.g. 127.0.0.1).
        recv_ip: IpAddr,
        /// Receiver UDP port.
        port: u16,
        /// Datagram size in bytes (16..=2048).
        msg_size: usize,
        /// Target rate in messages per second (0 = unpaced).
        rate: f64,
        /// Total number of messages to send.
        total_msgs: u64,
        /// Output CSV path (seq,send_ts_ns,ack_recv_ts_ns,retransmits).
        log: PathBuf,
    },
    /// Receive, deduplicate, acknowledge, and log per-packet arrivals.
    Receiver {
        /// UDP port to listen on.
        listen_port: u16,
        /// Output CSV path (seq,recv_ts_ns,send_ts_ns).
        log: PathBuf,
        /// SACK bitmap span in sequences.
        #[arg(long, default_value_t = DEFAULT_WINDOW_SIZE)]
        window: usize,
        /// Packets between SACK frames.
        #[arg(long, default_value_t = DEFAULT_ACK_PERIOD)]
        ack_period: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    match cli.mode {
        Mode::Sender {
            recv_ip,
            port,
            msg_size,
            rate,
            total_msgs,
            log,
        } => {
            sender::run(SenderConfig {
                peer: SocketAddr::new(recv_ip, port),
                msg_size,
                rate,
                total_msgs,
                log_path: log,
            })
            .await
        }
        Mode::Receiver {
            listen_port,
            log,
            window,
            ack_period,
        } => {
            receiver::run(ReceiverConfig {
                listen_port,
                log_path: log,
                window_size: window,
                ack_period,
            })
            .await
        }
    }
}
