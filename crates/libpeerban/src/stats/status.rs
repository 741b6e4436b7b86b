use std::ops::{Add, AddAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::counters::CumulativeCounters;

/// Traffic totals that survive restarts. Rates and gauges are meaningless
/// across a gap, so only byte counters live here.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct PersistenceStatus {
    /// net.recv_payload_bytes
    pub total_payload_download: u64,
    /// net.sent_payload_bytes
    pub total_payload_upload: u64,
    /// net.recv_ip_overhead_bytes
    pub ip_overhead_download: u64,
    /// net.sent_ip_overhead_bytes
    pub ip_overhead_upload: u64,
    /// net.recv_tracker_bytes
    pub tracker_download: u64,
    /// net.sent_tracker_bytes
    pub tracker_upload: u64,
    /// dht.dht_bytes_in
    pub dht_download: u64,
    /// dht.dht_bytes_out
    pub dht_upload: u64,
    /// Redundant plus hash-failed bytes.
    pub total_wasted: u64,
    /// All received bytes including IP overhead.
    pub total_download: u64,
    /// All sent bytes including IP overhead.
    pub total_upload: u64,
}

impl From<&CumulativeCounters> for PersistenceStatus {
    fn from(c: &CumulativeCounters) -> Self {
        Self {
            total_payload_download: c.recv_payload_bytes,
            total_payload_upload: c.sent_payload_bytes,
            ip_overhead_download: c.recv_ip_overhead_bytes,
            ip_overhead_upload: c.sent_ip_overhead_bytes,
            tracker_download: c.recv_tracker_bytes,
            tracker_upload: c.sent_tracker_bytes,
            dht_download: c.dht_bytes_in,
            dht_upload: c.dht_bytes_out,
            total_wasted: c.recv_redundant_bytes.saturating_add(c.recv_failed_bytes),
            total_download: c.recv_bytes.saturating_add(c.recv_ip_overhead_bytes),
            total_upload: c.sent_bytes.saturating_add(c.sent_ip_overhead_bytes),
        }
    }
}

impl AddAssign for PersistenceStatus {
    fn add_assign(&mut self, rhs: Self) {
        self.total_payload_download = self
            .total_payload_download
            .saturating_add(rhs.total_payload_download);
        self.total_payload_upload = self
            .total_payload_upload
            .saturating_add(rhs.total_payload_upload);
        self.ip_overhead_download = self
            .ip_overhead_download
            .saturating_add(rhs.ip_overhead_download);
        self.ip_overhead_upload = self
            .ip_overhead_upload
            .saturating_add(rhs.ip_overhead_upload);
        self.tracker_download = self.tracker_download.saturating_add(rhs.tracker_download);
        self.tracker_upload = self.tracker_upload.saturating_add(rhs.tracker_upload);
        self.dht_download = self.dht_download.saturating_add(rhs.dht_download);
        self.dht_upload = self.dht_upload.saturating_add(rhs.dht_upload);
        self.total_wasted = self.total_wasted.saturating_add(rhs.total_wasted);
        self.total_download = self.total_download.saturating_add(rhs.total_download);
        self.total_upload = self.total_upload.saturating_add(rhs.total_upload);
    }
}

impl Add for PersistenceStatus {
    type Output = PersistenceStatus;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

/// Bytes per second over the last poll interval.
#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct SessionRates {
    pub payload_download_rate: f64,
    pub payload_upload_rate: f64,
    pub download_rate: f64,
    pub upload_rate: f64,
    pub ip_overhead_download_rate: f64,
    pub ip_overhead_upload_rate: f64,
    pub dht_download_rate: f64,
    pub dht_upload_rate: f64,
    pub tracker_download_rate: f64,
    pub tracker_upload_rate: f64,
}

#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionGauges {
    /// Nodes in the DHT routing table.
    pub dht_nodes: u64,
    /// Peers waiting on disk reads (peer.num_peers_up_disk).
    pub disk_read_queue: u64,
    /// Peers waiting on disk writes (peer.num_peers_down_disk).
    pub disk_write_queue: u64,
    pub peers_count: u64,
}

impl From<&CumulativeCounters> for SessionGauges {
    fn from(c: &CumulativeCounters) -> Self {
        Self {
            dht_nodes: c.dht_nodes,
            disk_read_queue: c.peers_up_disk,
            disk_write_queue: c.peers_down_disk,
            peers_count: c.peers_connected,
        }
    }
}

/// Live totals since the process started. Serializes into one flat map.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionStatus {
    #[serde(flatten)]
    pub totals: PersistenceStatus,
    #[serde(flatten)]
    pub rates: SessionRates,
    #[serde(flatten)]
    pub gauges: SessionGauges,
    /// When the totals were last taken from the engine.
    #[serde(skip)]
    pub last_timestamp: DateTime<Utc>,
}

impl SessionStatus {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            totals: Default::default(),
            rates: Default::default(),
            gauges: Default::default(),
            last_timestamp: started_at,
        }
    }

    /// This session's totals added to `history`. Rates and gauges are taken as is.
    pub fn with_history(&self, history: &PersistenceStatus) -> Self {
        Self {
            totals: self.totals + *history,
            ..self.clone()
        }
    }
}

/// The part of the live status that may be persisted.
pub fn persistable_view(live: &SessionStatus) -> PersistenceStatus {
    live.totals
}
