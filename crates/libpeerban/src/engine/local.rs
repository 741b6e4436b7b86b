use std::{collections::HashMap, net::IpAddr, sync::Arc};

use anyhow::bail;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{CompiledIpFilter, IpFilter, NetworkEngine};
use crate::torrents::TorrentEntry;

gen_stats!(EngineCountersAtomic EngineCountersSnapshot, counters: [
    sent_payload_bytes u64,
    sent_bytes u64,
    sent_ip_overhead_bytes u64,
    sent_tracker_bytes u64,
    recv_payload_bytes u64,
    recv_bytes u64,
    recv_ip_overhead_bytes u64,
    recv_tracker_bytes u64,
    recv_redundant_bytes u64,
    recv_failed_bytes u64,
    dht_bytes_in u64,
    dht_bytes_out u64
], gauges: [
    dht_nodes u64,
    num_peers_up_disk u64,
    num_peers_down_disk u64,
    num_peers_connected u64
]);

impl EngineCountersSnapshot {
    fn metric(&self, name: &str) -> Option<u64> {
        let v = match name {
            "net.sent_payload_bytes" => self.sent_payload_bytes,
            "net.sent_bytes" => self.sent_bytes,
            "net.sent_ip_overhead_bytes" => self.sent_ip_overhead_bytes,
            "net.sent_tracker_bytes" => self.sent_tracker_bytes,
            "net.recv_payload_bytes" => self.recv_payload_bytes,
            "net.recv_bytes" => self.recv_bytes,
            "net.recv_ip_overhead_bytes" => self.recv_ip_overhead_bytes,
            "net.recv_tracker_bytes" => self.recv_tracker_bytes,
            "net.recv_redundant_bytes" => self.recv_redundant_bytes,
            "net.recv_failed_bytes" => self.recv_failed_bytes,
            "dht.dht_bytes_in" => self.dht_bytes_in,
            "dht.dht_bytes_out" => self.dht_bytes_out,
            "dht.dht_nodes" => self.dht_nodes,
            "peer.num_peers_up_disk" => self.num_peers_up_disk,
            "peer.num_peers_down_disk" => self.num_peers_down_disk,
            "peer.num_peers_connected" => self.num_peers_connected,
            _ => return None,
        };
        Some(v)
    }
}

#[derive(Debug, Default, Clone)]
pub struct LocalEngineOptions {
    /// Refuse filter tables with more rules than this.
    pub max_filter_rules: Option<usize>,
}

struct FilterState {
    table: IpFilter,
    compiled: CompiledIpFilter,
}

/// An in-process engine. Whoever moves the bytes bumps [`LocalEngine::counters`].
pub struct LocalEngine {
    pub counters: EngineCountersAtomic,
    filter: ArcSwap<FilterState>,
    torrents: RwLock<Vec<TorrentEntry>>,
    opts: LocalEngineOptions,
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl LocalEngine {
    pub fn new(opts: LocalEngineOptions) -> Self {
        let table = IpFilter::new();
        Self {
            counters: Default::default(),
            filter: ArcSwap::from_pointee(FilterState {
                compiled: table.compile(),
                table,
            }),
            torrents: Default::default(),
            opts,
        }
    }

    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        self.filter.load().compiled.is_blocked(ip)
    }

    pub fn add_torrent(&self, torrent: TorrentEntry) {
        let mut g = self.torrents.write();
        g.retain(|t| t.id != torrent.id);
        g.push(torrent);
    }

    pub fn update_torrent(&self, id: &str, f: impl FnOnce(&mut TorrentEntry)) -> bool {
        match self.torrents.write().iter_mut().find(|t| t.id == id) {
            Some(t) => {
                f(t);
                true
            }
            None => false,
        }
    }

    pub fn remove_torrent(&self, id: &str) -> Option<TorrentEntry> {
        let mut g = self.torrents.write();
        let pos = g.iter().position(|t| t.id == id)?;
        Some(g.remove(pos))
    }
}

#[async_trait]
impl NetworkEngine for LocalEngine {
    fn ip_filter(&self) -> IpFilter {
        self.filter.load().table.clone()
    }

    fn set_ip_filter(&self, filter: IpFilter) -> anyhow::Result<()> {
        if let Some(max) = self.opts.max_filter_rules
            && filter.len() > max
        {
            bail!("filter has {} rules, at most {max} allowed", filter.len());
        }
        let compiled = filter.compile();
        debug!(rules = filter.len(), "swapping ip filter");
        self.filter.store(Arc::new(FilterState {
            table: filter,
            compiled,
        }));
        Ok(())
    }

    async fn session_metrics(
        &self,
        names: &[&'static str],
    ) -> anyhow::Result<HashMap<String, u64>> {
        let snapshot = self.counters.snapshot();
        Ok(names
            .iter()
            .filter_map(|name| Some((name.to_string(), snapshot.metric(name)?)))
            .collect())
    }

    fn torrents(&self) -> Vec<TorrentEntry> {
        self.torrents.read().clone()
    }
}
