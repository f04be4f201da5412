//! Per-packet CSV timing logs for offline analysis.
//!
//! One [`TimingLog`] per endpoint, append-only.  The header row is written
//! lazily with the first record, so a single type serves both schemas:
//!
//! - sender: `seq,send_ts_ns,ack_recv_ts_ns,retransmits`
//! - receiver: `seq,recv_ts_ns,send_ts_ns`
//!
//! Writes go through a buffered writer behind a mutex; rows arrive from the
//! ACK callback and the receive loop, one line per packet.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug)]
struct LogInner {
    writer: BufWriter<File>,
    header_written: bool,
}

/// Append-only CSV log of per-packet timing records.
#[derive(Debug)]
pub struct TimingLog {
    inner: Mutex<LogInner>,
}

impl TimingLog {
    /// Create (truncate) the log file.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Mutex::new(LogInner {
                writer: BufWriter::new(file),
                header_written: false,
            }),
        })
    }

    /// One row per acknowledged sequence, written from the sender.
    pub fn log_sender_row(
        &self,
        seq: u64,
        send_ts_ns: u64,
        ack_recv_ts_ns: u64,
        retransmits: u32,
    ) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.header_written {
            writeln!(inner.writer, "seq,send_ts_ns,ack_recv_ts_ns,retransmits")?;
            inner.header_written = true;
        }
        writeln!(inner.writer, "{seq},{send_ts_ns},{ack_recv_ts_ns},{retransmits}")
    }

    /// One row per newly received sequence, written from the receiver.
    pub fn log_receiver_row(&self, seq: u64, recv_ts_ns: u64, send_ts_ns: u64) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.header_written {
            writeln!(inner.writer, "seq,recv_ts_ns,send_ts_ns")?;
            inner.header_written = true;
        }
        writeln!(inner.writer, "{seq},{recv_ts_ns},{send_ts_ns}")
    }

    /// Push buffered rows to disk.
    pub fn flush(&self) -> io::Result<()> {
        self.inner.lock().unwrap().writer.flush()
    }
}
