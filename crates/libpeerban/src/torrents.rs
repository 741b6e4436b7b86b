use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::Serialize;
use tracing::{debug, trace};

/// Bits of [`PeerEntry::flags`], same values as libtorrent's `peer_info` flags.
pub mod peer_flags {
    pub const INTERESTING: u32 = 0x1;
    pub const CHOKED: u32 = 0x2;
    pub const REMOTE_INTERESTED: u32 = 0x4;
    pub const REMOTE_CHOKED: u32 = 0x8;
    pub const SUPPORTS_EXTENSIONS: u32 = 0x10;
    pub const OUTGOING_CONNECTION: u32 = 0x20;
    pub const HANDSHAKE: u32 = 0x40;
    pub const CONNECTING: u32 = 0x80;
    pub const SEED: u32 = 0x400;
    pub const SNUBBED: u32 = 0x1000;
    pub const UPLOAD_ONLY: u32 = 0x2000;
    pub const UTP_SOCKET: u32 = 0x20000;

    /// Peers in these states have no complete handshake yet.
    pub const HALF_OPEN: u32 = CONNECTING | HANDSHAKE;
}

/// Client name reported for peers whose client string isn't valid UTF-8.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// A torrent as the engine sees it.
#[derive(Clone, Debug)]
pub struct TorrentEntry {
    pub id: String,
    pub name: String,
    pub info_hash: String,
    pub progress: f32,
    pub total_wanted_done: u64,
    pub total_size: u64,
    pub private: bool,
    pub upload_payload_rate: u64,
    pub download_payload_rate: u64,
    pub peers: Vec<PeerEntry>,
}

impl TorrentEntry {
    /// Seeding or downloading right now.
    pub fn is_active(&self) -> bool {
        self.upload_payload_rate > 0 || self.download_payload_rate > 0
    }
}

/// A connected (or connecting) peer as the engine sees it.
#[derive(Clone, Debug)]
pub struct PeerEntry {
    pub addr: SocketAddr,
    pub peer_id: [u8; 20],
    pub client: Vec<u8>,
    pub up_speed: u64,
    pub down_speed: u64,
    pub payload_up_speed: u64,
    pub payload_down_speed: u64,
    pub total_upload: u64,
    pub total_download: u64,
    pub progress: f32,
    pub flags: u32,
    pub source: u32,
    pub local_endpoint: SocketAddr,
    pub queue_bytes: u64,
    pub request_timeout: i64,
    pub num_hashfails: u32,
    pub download_queue_length: u32,
    pub upload_queue_length: u32,
    pub failcount: u32,
    pub downloading_block_index: i64,
    pub downloading_progress: u64,
    pub downloading_total: u64,
    pub connection_type: u32,
    pub send_quota: i64,
    pub receive_quota: i64,
    pub rtt: u32,
    pub num_pieces: u32,
    pub download_rate_peak: u64,
    pub upload_rate_peak: u64,
    pub progress_ppm: u32,
}

impl Default for PeerEntry {
    fn default() -> Self {
        let unspecified = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        Self {
            addr: unspecified,
            peer_id: [0; 20],
            client: Vec::new(),
            up_speed: 0,
            down_speed: 0,
            payload_up_speed: 0,
            payload_down_speed: 0,
            total_upload: 0,
            total_download: 0,
            progress: 0.,
            flags: 0,
            source: 0,
            local_endpoint: unspecified,
            queue_bytes: 0,
            request_timeout: 0,
            num_hashfails: 0,
            download_queue_length: 0,
            upload_queue_length: 0,
            failcount: 0,
            downloading_block_index: -1,
            downloading_progress: 0,
            downloading_total: 0,
            connection_type: 0,
            send_quota: 0,
            receive_quota: 0,
            rtt: 0,
            num_pieces: 0,
            download_rate_peak: 0,
            upload_rate_peak: 0,
            progress_ppm: 0,
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Torrent {
    pub id: String,
    pub name: String,
    pub info_hash: String,
    pub progress: f32,
    pub size: u64,
    pub completed_size: u64,
    #[serde(rename = "priv")]
    pub private: bool,
}

impl From<&TorrentEntry> for Torrent {
    fn from(t: &TorrentEntry) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            info_hash: t.info_hash.clone(),
            progress: t.progress,
            size: t.total_size,
            completed_size: t.total_wanted_done,
            private: t.private,
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ActiveTorrent {
    #[serde(flatten)]
    pub torrent: Torrent,
    pub upload_payload_rate: u64,
    pub download_payload_rate: u64,
    pub peers: Vec<Peer>,
}

impl From<&TorrentEntry> for ActiveTorrent {
    fn from(t: &TorrentEntry) -> Self {
        let peers = t
            .peers
            .iter()
            .filter(|p| {
                // Half-open peers may block the engine while being inspected.
                let half_open = p.flags & peer_flags::HALF_OPEN != 0;
                if half_open {
                    trace!(addr=%p.addr, "skipping half-open peer");
                }
                !half_open
            })
            .map(Peer::from)
            .collect();
        Self {
            torrent: Torrent::from(t),
            upload_payload_rate: t.upload_payload_rate,
            download_payload_rate: t.download_payload_rate,
            peers,
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Peer {
    pub ip: String,
    pub port: u16,
    pub peer_id: String,
    pub client_name: String,
    pub up_speed: u64,
    pub down_speed: u64,
    pub payload_up_speed: u64,
    pub payload_down_speed: u64,
    pub total_upload: u64,
    pub total_download: u64,
    pub progress: f32,
    pub flags: u32,
    pub source: u32,
    pub local_endpoint_ip: String,
    pub local_endpoint_port: u16,
    pub queue_bytes: u64,
    pub request_timeout: i64,
    pub num_hashfails: u32,
    pub download_queue_length: u32,
    pub upload_queue_length: u32,
    pub failcount: u32,
    pub downloading_block_index: i64,
    pub downloading_progress: u64,
    pub downloading_total: u64,
    pub connection_type: u32,
    pub send_quota: i64,
    pub receive_quota: i64,
    pub rtt: u32,
    pub num_pieces: u32,
    pub download_rate_peak: u64,
    pub upload_rate_peak: u64,
    pub progress_ppm: u32,
}

fn decode_client_name(addr: SocketAddr, client: &[u8]) -> String {
    match std::str::from_utf8(client) {
        Ok(name) => name.to_owned(),
        Err(e) => {
            debug!(%addr, error=%e, "peer client name is not valid utf-8");
            UNKNOWN_CLIENT.to_owned()
        }
    }
}

impl From<&PeerEntry> for Peer {
    fn from(p: &PeerEntry) -> Self {
        Self {
            ip: p.addr.ip().to_string(),
            port: p.addr.port(),
            peer_id: hex::encode(p.peer_id),
            client_name: decode_client_name(p.addr, &p.client),
            up_speed: p.up_speed,
            down_speed: p.down_speed,
            payload_up_speed: p.payload_up_speed,
            payload_down_speed: p.payload_down_speed,
            total_upload: p.total_upload,
            total_download: p.total_download,
            progress: p.progress,
            flags: p.flags,
            source: p.source,
            local_endpoint_ip: p.local_endpoint.ip().to_string(),
            local_endpoint_port: p.local_endpoint.port(),
            queue_bytes: p.queue_bytes,
            request_timeout: p.request_timeout,
            num_hashfails: p.num_hashfails,
            download_queue_length: p.download_queue_length,
            upload_queue_length: p.upload_queue_length,
            failcount: p.failcount,
            downloading_block_index: p.downloading_block_index,
            downloading_progress: p.downloading_progress,
            downloading_total: p.downloading_total,
            connection_type: p.connection_type,
            send_quota: p.send_quota,
            receive_quota: p.receive_quota,
            rtt: p.rtt,
            num_pieces: p.num_pieces,
            download_rate_peak: p.download_rate_peak,
            upload_rate_peak: p.upload_rate_peak,
            progress_ppm: p.progress_ppm,
        }
    }
}
