//! Latency and throughput aggregation.
//!
//! [`LatencyStats`] keeps every sample in memory so end-of-run percentiles
//! are exact rather than estimated; at benchmark scales (millions of
//! packets, 8 bytes each) that is a deliberate trade.  [`ThroughputStats`]
//! is plain counters plus a start/end timestamp pair.  [`StatsCollector`]
//! wraps both behind one mutex so the send loop and the ACK task can feed it
//! concurrently.

use std::io::{self, Write};
use std::sync::Mutex;

use crate::clock;

// ---------------------------------------------------------------------------
// Latency
// ---------------------------------------------------------------------------

/// One-way or round-trip latency samples, in nanoseconds.
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    samples: Vec<u64>,
    sum_ns: u64,
    min_ns: u64,
    max_ns: u64,
}

impl LatencyStats {
    pub fn add(&mut self, latency_ns: u64) {
        if self.samples.is_empty() {
            self.min_ns = latency_ns;
            self.max_ns = latency_ns;
        } else {
            self.min_ns = self.min_ns.min(latency_ns);
            self.max_ns = self.max_ns.max(latency_ns);
        }
        self.sum_ns += latency_ns;
        self.samples.push(latency_ns);
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn mean_us(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        clock::ns_to_us(self.sum_ns) / self.samples.len() as f64
    }

    pub fn min_us(&self) -> f64 {
        clock::ns_to_us(self.min_ns)
    }

    pub fn max_us(&self) -> f64 {
        clock::ns_to_us(self.max_ns)
    }

    /// Percentile over a sorted copy of the samples: element
    /// `⌊p · (n − 1) / 100⌋`.  `p` is in `[0, 100]`.
    pub fn percentile_ns(&self, p: f64) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let index = (p * (sorted.len() - 1) as f64 / 100.0) as usize;
        sorted[index]
    }

    pub fn percentile_us(&self, p: f64) -> f64 {
        clock::ns_to_us(self.percentile_ns(p))
    }
}

// ---------------------------------------------------------------------------
// Throughput
// ---------------------------------------------------------------------------

/// Packet and byte counters bracketed by a start/end timestamp pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThroughputStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub start_ts_ns: u64,
    pub end_ts_ns: u64,
}

impl ThroughputStats {
    pub fn start(&mut self) {
        self.start_ts_ns = clock::timestamp_ns();
    }

    pub fn end(&mut self) {
        self.end_ts_ns = clock::timestamp_ns();
    }

    pub fn duration_secs(&self) -> f64 {
        clock::ns_to_secs(self.end_ts_ns.saturating_sub(self.start_ts_ns))
    }

    /// Received packets per second over the collection window.
    pub fn packet_rate(&self) -> f64 {
        let secs = self.duration_secs();
        if secs <= 0.0 {
            return 0.0;
        }
        self.packets_received as f64 / secs
    }

    /// Received megabits per second over the collection window.
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.duration_secs();
        if secs <= 0.0 {
            return 0.0;
        }
        (self.bytes_received as f64 * 8.0) / secs / 1e6
    }

    /// `(sent − received) / sent`; zero before anything is sent.
    pub fn loss_rate(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.packets_sent.saturating_sub(self.packets_received) as f64 / self.packets_sent as f64
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StatsInner {
    latency: LatencyStats,
    throughput: ThroughputStats,
}

/// Thread-safe aggregation point shared by an endpoint's tasks.
#[derive(Debug, Default)]
pub struct StatsCollector {
    inner: Mutex<StatsInner>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_collection(&self) {
        self.inner.lock().unwrap().throughput.start();
    }

    pub fn end_collection(&self) {
        self.inner.lock().unwrap().throughput.end();
    }

    /// Record a latency sample from a timestamp pair.  Pairs that are not
    /// causally ordered (clock skew between hosts) are dropped.
    pub fn add_latency_measurement(&self, send_ts_ns: u64, recv_ts_ns: u64) {
        if recv_ts_ns > send_ts_ns {
            self.inner.lock().unwrap().latency.add(recv_ts_ns - send_ts_ns);
        }
    }

    pub fn add_packet_sent(&self, bytes: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.throughput.packets_sent += 1;
        inner.throughput.bytes_sent += bytes as u64;
    }

    pub fn add_packet_received(&self, bytes: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.throughput.packets_received += 1;
        inner.throughput.bytes_received += bytes as u64;
    }

    pub fn latency(&self) -> LatencyStats {
        self.inner.lock().unwrap().latency.clone()
    }

    pub fn throughput(&self) -> ThroughputStats {
        self.inner.lock().unwrap().throughput
    }

    /// Human-readable end-of-run summary on stdout.
    pub fn print_summary(&self) {
        let inner = self.inner.lock().unwrap();
        let latency = &inner.latency;
        let tp = &inner.throughput;

        println!("\n=== Final statistics ===");
        if latency.count() > 0 {
            println!("Latency:");
            println!("  packets: {}", latency.count());
            println!("  mean:    {:.2} us", latency.mean_us());
            println!("  min:     {:.2} us", latency.min_us());
            println!("  max:     {:.2} us", latency.max_us());
            println!("  p50:     {:.2} us", latency.percentile_us(50.0));
            println!("  p99:     {:.2} us", latency.percentile_us(99.0));
        }
        println!("Throughput:");
        println!("  duration:    {:.2} s", tp.duration_secs());
        println!("  packet rate: {:.0} pps", tp.packet_rate());
        println!("  throughput:  {:.2} Mbps", tp.throughput_mbps());
        println!("  loss rate:   {:.2}%", tp.loss_rate() * 100.0);
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Minimum spacing between progress lines.
const REPORT_INTERVAL_NS: u64 = 1_000_000_000;

/// Carriage-return progress lines for long runs.
///
/// `total == 0` means the goal is unknown (receiver side); the line then
/// shows only the running count and rate.
#[derive(Debug)]
pub struct ProgressReporter {
    total: u64,
    completed: u64,
    start_ns: u64,
    last_report_ns: u64,
}

impl ProgressReporter {
    pub fn new(total: u64) -> Self {
        let now = clock::timestamp_ns();
        Self {
            total,
            completed: 0,
            start_ns: now,
            last_report_ns: now,
        }
    }

    pub fn increment(&mut self) {
        self.completed += 1;
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// `true` at most once per [`REPORT_INTERVAL_NS`].
    pub fn due(&mut self) -> bool {
        let now = clock::timestamp_ns();
        if now.saturating_sub(self.last_report_ns) >= REPORT_INTERVAL_NS {
            self.last_report_ns = now;
            true
        } else {
            false
        }
    }

    /// Items per second since construction.
    pub fn rate(&self) -> f64 {
        let secs = clock::ns_to_secs(clock::timestamp_ns().saturating_sub(self.start_ns));
        if secs <= 0.0 {
            return 0.0;
        }
        self.completed as f64 / secs
    }

    pub fn print_progress(&self) {
        if self.total > 0 {
            let pct = self.completed as f64 * 100.0 / self.total as f64;
            print!(
                "\rprogress: {}/{} ({:.0}%)  rate: {:.0} msg/s",
                self.completed, self.total, pct, self.rate()
            );
        } else {
            print!("\rreceived: {}  rate: {:.0} msg/s", self.completed, self.rate());
        }
        let _ = io::stdout().flush();
    }

    /// Print the final progress line and terminate it.
    pub fn finish(&mut self) {
        if self.total > 0 {
            self.completed = self.total;
        }
        self.print_progress();
        println!();
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
