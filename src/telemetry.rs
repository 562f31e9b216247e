//! Per-transmission outcome history and derived link aggregates.
//!
//! The log is a fixed-capacity ring: once full, each new record overwrites the
//! oldest. Cumulative packet counters are independent of ring eviction and
//! only ever reset explicitly. All derived figures are pure functions of the
//! current ring contents plus the counters, so reporting is deterministic.

use serde_json::json;

use crate::envelope::Metrics;

/// Default number of transmission outcomes kept in the ring.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Outcome of one send attempt cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransmissionRecord {
    /// Message id of the transmission.
    pub id: u32,
    /// Seconds since node boot when the outcome was recorded.
    pub timestamp: u64,
    /// Whether the send completed (acknowledged, or physically sent for acks).
    pub success: bool,
    /// Ack signal strength in dBm.
    pub rssi: i16,
    /// Ack signal-to-noise ratio in dB.
    pub snr: f32,
    /// Physical retransmissions consumed before the outcome.
    pub retries: u32,
    /// Milliseconds from first transmit to acknowledgment; 0 when unmeasured.
    pub latency_ms: u64,
}

/// Fixed-capacity circular history of transmission outcomes.
#[derive(Debug, Clone)]
pub struct TransmissionLog {
    records: Vec<TransmissionRecord>,
    capacity: usize,
    /// Next slot to write; wraps modulo capacity once the ring is full.
    cursor: usize,
    total_packets: u64,
    successful_packets: u64,
}

impl Default for TransmissionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TransmissionLog {
    /// Create a log with the default ring capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a log holding up to `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be non-zero");
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
            total_packets: 0,
            successful_packets: 0,
        }
    }

    /// Append an outcome, overwriting the oldest slot when the ring is full.
    pub fn record(&mut self, record: TransmissionRecord) {
        self.total_packets += 1;
        if record.success {
            self.successful_packets += 1;
        }

        if self.records.len() < self.capacity {
            self.records.push(record);
        } else {
            self.records[self.cursor] = record;
        }
        self.cursor = (self.cursor + 1) % self.capacity;

        tracing::debug!(id = record.id, success = record.success, "transmission recorded");
    }

    /// Number of records currently held (at most the capacity).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no outcome has been recorded since creation or reset.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ring capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cumulative count of recorded transmissions, unaffected by eviction.
    pub fn total_packets(&self) -> u64 {
        self.total_packets
    }

    /// Cumulative count of successful transmissions.
    pub fn successful_packets(&self) -> u64 {
        self.successful_packets
    }

    /// Iterate records oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TransmissionRecord> {
        let (older, newer) = if self.records.len() < self.capacity {
            (&self.records[..], &[][..])
        } else {
            let (tail, head) = self.records.split_at(self.cursor);
            (head, tail)
        };
        older.iter().chain(newer.iter())
    }

    /// Fraction of all recorded transmissions that succeeded; 0 before any.
    pub fn success_rate(&self) -> f64 {
        if self.total_packets == 0 {
            return 0.0;
        }
        self.successful_packets as f64 / self.total_packets as f64
    }

    /// Mean RSSI over successful ring entries; −120 dBm when none qualify.
    pub fn average_rssi(&self) -> i16 {
        let (sum, count) = self
            .iter()
            .filter(|r| r.success)
            .fold((0i64, 0i64), |(s, c), r| (s + i64::from(r.rssi), c + 1));
        if count == 0 {
            return -120;
        }
        (sum / count) as i16
    }

    /// Mean SNR over successful ring entries; 0.0 when none qualify.
    pub fn average_snr(&self) -> f32 {
        let (sum, count) = self
            .iter()
            .filter(|r| r.success)
            .fold((0.0f64, 0u32), |(s, c), r| (s + f64::from(r.snr), c + 1));
        if count == 0 {
            return 0.0;
        }
        (sum / f64::from(count)) as f32
    }

    /// Mean retransmission count over all ring entries regardless of outcome.
    pub fn average_retries(&self) -> f32 {
        if self.records.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.iter().map(|r| u64::from(r.retries)).sum();
        sum as f32 / self.records.len() as f32
    }

    /// Mean latency over successful entries with a measured (non-zero) latency.
    pub fn average_latency_ms(&self) -> u64 {
        let (sum, count) = self
            .iter()
            .filter(|r| r.success && r.latency_ms > 0)
            .fold((0u64, 0u64), |(s, c), r| (s + r.latency_ms, c + 1));
        if count == 0 {
            return 0;
        }
        sum / count
    }

    /// Performance aggregates as a wire metrics document.
    pub fn performance_metrics(&self) -> Metrics {
        let mut doc = Metrics::new();
        doc.insert("success_rate".into(), json!(self.success_rate()));
        doc.insert("avg_retries".into(), json!(self.average_retries()));
        doc.insert("avg_latency".into(), json!(self.average_latency_ms()));
        doc.insert("total_packets".into(), json!(self.total_packets()));
        doc
    }

    /// Signal aggregates as a wire metrics document.
    pub fn signal_metrics(&self) -> Metrics {
        let mut doc = Metrics::new();
        doc.insert("rssi".into(), json!(self.average_rssi()));
        doc.insert("snr".into(), json!(self.average_snr()));
        doc
    }

    /// Clear the ring and the cumulative counters.
    pub fn reset(&mut self) {
        self.records.clear();
        self.cursor = 0;
        self.total_packets = 0;
        self.successful_packets = 0;
    }
}
