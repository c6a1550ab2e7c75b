//! Peer regions and their latency history.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use prometheus::{Histogram, HistogramOpts};

/// Histogram buckets in microseconds: 100µs doubling up to ~3.3s.
pub fn latency_buckets() -> Vec<f64> {
    // exponential_buckets only fails on a zero count or non-positive start.
    prometheus::exponential_buckets(100.0, 2.0, 16).unwrap_or_default()
}

/// Metric name for the latency histogram from `local` to `peer`.
///
/// Characters outside `[A-Za-z0-9_]` become `_` so any region identifier
/// yields a valid metric name.
pub fn metric_name(local: &str, peer: &str) -> String {
    format!(
        "latency_{}_to_{}_microsecond",
        sanitize(local),
        sanitize(peer)
    )
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// One remote region.
///
/// The address is derived once, at discovery time. Only the measurement
/// scheduler records samples; everything else reads.
pub struct Peer {
    identifier: String,
    address: String,
    histogram: Histogram,
    last_latency_us: AtomicU64,
    samples: AtomicU64,
    created: Instant,
    /// Millis since `created` of the last sample, plus one. 0 = never.
    last_measured: AtomicU64,
}

impl Peer {
    pub fn new(
        local: &str,
        identifier: impl Into<String>,
        address: impl Into<String>,
    ) -> prometheus::Result<Self> {
        let identifier = identifier.into();
        let opts = HistogramOpts::new(
            metric_name(local, &identifier),
            format!("Kernel TCP round-trip time from {local} to {identifier}, in microseconds"),
        )
        .buckets(latency_buckets());

        Ok(Self {
            histogram: Histogram::with_opts(opts)?,
            identifier,
            address: address.into(),
            last_latency_us: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            created: Instant::now(),
            last_measured: AtomicU64::new(0),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Dial address, `host:port`.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    /// Most recent RTT sample in microseconds. 0 until the first success.
    pub fn last_latency_us(&self) -> u64 {
        self.last_latency_us.load(Ordering::Relaxed)
    }

    /// Successful measurements recorded so far.
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// When the last sample was recorded.
    pub fn last_measured(&self) -> Option<Instant> {
        match self.last_measured.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(self.created + Duration::from_millis(ms - 1)),
        }
    }

    /// Record one completed measurement.
    pub fn record(&self, rtt_us: u32) {
        self.histogram.observe(f64::from(rtt_us));
        self.last_latency_us.store(u64::from(rtt_us), Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
        let since = self.created.elapsed().as_millis() as u64;
        self.last_measured.store(since + 1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("identifier", &self.identifier)
            .field("address", &self.address)
            .field("last_latency_us", &self.last_latency_us())
            .field("samples", &self.samples())
            .finish()
    }
}
