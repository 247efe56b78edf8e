//! Latency Stats Module
//!
//! Round-trip time of answered RPC calls, kept in an HdrHistogram for
//! percentile reporting.

use hdrhistogram::Histogram;
use std::time::Instant;

/// Upper bound of a recordable round trip: one hour in nanoseconds
const MAX_RTT_NS: u64 = 3_600_000_000_000;

/// Latency statistics structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
    pub p99_9: u64,
    pub p99_99: u64,
    pub max: u64,
}

/// Histogram of call round-trip times in nanoseconds
pub struct LatencyTracker {
    histogram: Histogram<u64>,
    /// Answers received since creation, including resets
    response_count: u64,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyTracker {
    /// Histogram bounds are 1 ns to 1 hour with 3 significant figures
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new_with_bounds(1, MAX_RTT_NS, 3)
                .expect("Failed to create histogram"),
            response_count: 0,
        }
    }

    /// Record the answer to a call sent at `sent_at`, returning the RTT in ns
    pub fn record_response(&mut self, sent_at: Instant) -> u64 {
        let rtt = sent_at.elapsed().as_nanos().min(u128::from(MAX_RTT_NS)) as u64;
        self.record_latency(rtt);
        rtt
    }

    /// Record a latency value in the histogram
    fn record_latency(&mut self, rtt_ns: u64) {
        let clamped = rtt_ns.clamp(1, MAX_RTT_NS);
        if let Err(e) = self.histogram.record(clamped) {
            log::warn!("Failed to record latency {}: {}", rtt_ns, e);
        }
        self.response_count += 1;
    }

    /// Get current latency statistics
    pub fn get_stats(&self) -> LatencyStats {
        LatencyStats {
            count: self.histogram.len(),
            p50: self.histogram.value_at_quantile(0.50),
            p90: self.histogram.value_at_quantile(0.90),
            p95: self.histogram.value_at_quantile(0.95),
            p99: self.histogram.value_at_quantile(0.99),
            p99_9: self.histogram.value_at_quantile(0.999),
            p99_99: self.histogram.value_at_quantile(0.9999),
            max: self.histogram.max(),
        }
    }

    /// Log the current statistics and start a new interval
    pub fn log_and_reset(&mut self) {
        let stats = self.get_stats();
        log::info!(
            "Call latency (ns, n={}): p50={}, p90={}, p95={}, p99={}, p99.9={}, p99.99={}, max={}",
            stats.count,
            stats.p50,
            stats.p90,
            stats.p95,
            stats.p99,
            stats.p99_9,
            stats.p99_99,
            stats.max
        );
        self.histogram.reset();
    }

    pub fn response_count(&self) -> u64 {
        self.response_count
    }
}
