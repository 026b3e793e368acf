//! Replication counters
//!
//! Lock-free counters updated from the connection loop and read by the
//! health endpoint. Apply latency is sampled into a bounded window.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Core metrics for the replication engine.
pub struct ReplicatorMetrics {
    // Inbound traffic
    pub frames_received: AtomicU64,
    pub protocol_anomalies: AtomicU64,

    // Book maintenance
    pub snapshots_applied: AtomicU64,
    pub deltas_applied: AtomicU64,
    pub deltas_discarded: AtomicU64,
    pub sequence_gaps: AtomicU64,
    pub apply_latency_ns: Mutex<LatencyTracker>,

    // Connection lifecycle
    pub connects: AtomicU64,
    pub reconnects: AtomicU64,
    pub failed_connects: AtomicU64,

    // Outbound control
    pub subscribe_frames_sent: AtomicU64,
    pub unsubscribe_frames_sent: AtomicU64,
}

impl ReplicatorMetrics {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            protocol_anomalies: AtomicU64::new(0),
            snapshots_applied: AtomicU64::new(0),
            deltas_applied: AtomicU64::new(0),
            deltas_discarded: AtomicU64::new(0),
            sequence_gaps: AtomicU64::new(0),
            apply_latency_ns: Mutex::new(LatencyTracker::new(1000)),
            connects: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            failed_connects: AtomicU64::new(0),
            subscribe_frames_sent: AtomicU64::new(0),
            unsubscribe_frames_sent: AtomicU64::new(0),
        }
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anomaly(&self) {
        self.protocol_anomalies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot(&self, latency_ns: u64) {
        self.snapshots_applied.fetch_add(1, Ordering::Relaxed);
        self.apply_latency_ns.lock().record(latency_ns);
    }

    pub fn record_delta(&self, latency_ns: u64) {
        self.deltas_applied.fetch_add(1, Ordering::Relaxed);
        self.apply_latency_ns.lock().record(latency_ns);
    }

    pub fn record_discard(&self) {
        self.deltas_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gap(&self) {
        self.sequence_gaps.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful connect; every connect after the first counts as a reconnect.
    pub fn record_connect(&self) {
        if self.connects.fetch_add(1, Ordering::Relaxed) > 0 {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failed_connect(&self) {
        self.failed_connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscribe_sent(&self) {
        self.subscribe_frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unsubscribe_sent(&self) {
        self.unsubscribe_frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("frames_received".to_string(), self.frames_received.load(Ordering::Relaxed));
        m.insert("protocol_anomalies".to_string(), self.protocol_anomalies.load(Ordering::Relaxed));
        m.insert("snapshots_applied".to_string(), self.snapshots_applied.load(Ordering::Relaxed));
        m.insert("deltas_applied".to_string(), self.deltas_applied.load(Ordering::Relaxed));
        m.insert("deltas_discarded".to_string(), self.deltas_discarded.load(Ordering::Relaxed));
        m.insert("sequence_gaps".to_string(), self.sequence_gaps.load(Ordering::Relaxed));
        m.insert("connects".to_string(), self.connects.load(Ordering::Relaxed));
        m.insert("reconnects".to_string(), self.reconnects.load(Ordering::Relaxed));
        m.insert("failed_connects".to_string(), self.failed_connects.load(Ordering::Relaxed));
        m.insert("subscribe_frames_sent".to_string(), self.subscribe_frames_sent.load(Ordering::Relaxed));
        m.insert("unsubscribe_frames_sent".to_string(), self.unsubscribe_frames_sent.load(Ordering::Relaxed));
        if let Some(p99) = self.apply_latency_ns.lock().percentile(99) {
            m.insert("apply_latency_p99_ns".to_string(), p99);
        }
        m
    }
}

impl Default for ReplicatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: Vec<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let idx = (p.min(100) * (sorted.len() - 1)) / 100;
        sorted.get(idx).copied()
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}
