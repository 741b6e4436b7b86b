use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{Error, Result};

/// Metrics requested from the engine on every poll.
pub const SESSION_METRIC_NAMES: [&str; 16] = [
    "net.sent_payload_bytes",
    "net.sent_bytes",
    "net.sent_ip_overhead_bytes",
    "net.sent_tracker_bytes",
    "net.recv_payload_bytes",
    "net.recv_bytes",
    "net.recv_ip_overhead_bytes",
    "net.recv_tracker_bytes",
    "net.recv_redundant_bytes",
    "net.recv_failed_bytes",
    "dht.dht_bytes_in",
    "dht.dht_bytes_out",
    "dht.dht_nodes",
    "peer.num_peers_up_disk",
    "peer.num_peers_down_disk",
    "peer.num_peers_connected",
];

/// One poll of the engine's counters. Byte counters never decrease while the
/// engine is running, the last four fields are gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CumulativeCounters {
    pub sent_payload_bytes: u64,
    pub sent_bytes: u64,
    pub sent_ip_overhead_bytes: u64,
    pub sent_tracker_bytes: u64,
    pub recv_payload_bytes: u64,
    pub recv_bytes: u64,
    pub recv_ip_overhead_bytes: u64,
    pub recv_tracker_bytes: u64,
    pub recv_redundant_bytes: u64,
    pub recv_failed_bytes: u64,
    pub dht_bytes_in: u64,
    pub dht_bytes_out: u64,

    pub dht_nodes: u64,
    pub peers_up_disk: u64,
    pub peers_down_disk: u64,
    pub peers_connected: u64,

    pub timestamp: DateTime<Utc>,
}

impl CumulativeCounters {
    /// All zeroes at the given time.
    pub fn zero(timestamp: DateTime<Utc>) -> Self {
        Self {
            sent_payload_bytes: 0,
            sent_bytes: 0,
            sent_ip_overhead_bytes: 0,
            sent_tracker_bytes: 0,
            recv_payload_bytes: 0,
            recv_bytes: 0,
            recv_ip_overhead_bytes: 0,
            recv_tracker_bytes: 0,
            recv_redundant_bytes: 0,
            recv_failed_bytes: 0,
            dht_bytes_in: 0,
            dht_bytes_out: 0,
            dht_nodes: 0,
            peers_up_disk: 0,
            peers_down_disk: 0,
            peers_connected: 0,
            timestamp,
        }
    }

    /// The cumulative byte counters by metric name, gauges excluded.
    pub fn byte_counters(&self) -> [(&'static str, u64); 12] {
        [
            ("net.sent_payload_bytes", self.sent_payload_bytes),
            ("net.sent_bytes", self.sent_bytes),
            ("net.sent_ip_overhead_bytes", self.sent_ip_overhead_bytes),
            ("net.sent_tracker_bytes", self.sent_tracker_bytes),
            ("net.recv_payload_bytes", self.recv_payload_bytes),
            ("net.recv_bytes", self.recv_bytes),
            ("net.recv_ip_overhead_bytes", self.recv_ip_overhead_bytes),
            ("net.recv_tracker_bytes", self.recv_tracker_bytes),
            ("net.recv_redundant_bytes", self.recv_redundant_bytes),
            ("net.recv_failed_bytes", self.recv_failed_bytes),
            ("dht.dht_bytes_in", self.dht_bytes_in),
            ("dht.dht_bytes_out", self.dht_bytes_out),
        ]
    }

    pub fn from_metrics(metrics: &HashMap<String, u64>, timestamp: DateTime<Utc>) -> Result<Self> {
        let get = |name: &'static str| {
            metrics
                .get(name)
                .copied()
                .ok_or(Error::MissingMetric(name))
        };
        Ok(Self {
            sent_payload_bytes: get("net.sent_payload_bytes")?,
            sent_bytes: get("net.sent_bytes")?,
            sent_ip_overhead_bytes: get("net.sent_ip_overhead_bytes")?,
            sent_tracker_bytes: get("net.sent_tracker_bytes")?,
            recv_payload_bytes: get("net.recv_payload_bytes")?,
            recv_bytes: get("net.recv_bytes")?,
            recv_ip_overhead_bytes: get("net.recv_ip_overhead_bytes")?,
            recv_tracker_bytes: get("net.recv_tracker_bytes")?,
            recv_redundant_bytes: get("net.recv_redundant_bytes")?,
            recv_failed_bytes: get("net.recv_failed_bytes")?,
            dht_bytes_in: get("dht.dht_bytes_in")?,
            dht_bytes_out: get("dht.dht_bytes_out")?,
            dht_nodes: get("dht.dht_nodes")?,
            peers_up_disk: get("peer.num_peers_up_disk")?,
            peers_down_disk: get("peer.num_peers_down_disk")?,
            peers_connected: get("peer.num_peers_connected")?,
            timestamp,
        })
    }
}
