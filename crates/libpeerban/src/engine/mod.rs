mod ip_filter;
pub mod local;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::torrents::TorrentEntry;

pub use ip_filter::{ALLOWED, BLOCKED, CompiledIpFilter, IpFilter};

/// The BitTorrent engine the adapter is attached to.
///
/// Filter methods are synchronous and must not do network I/O, they are
/// called while the blocklist lock is held.
#[async_trait]
pub trait NetworkEngine: Send + Sync {
    /// A copy of the current filter table.
    fn ip_filter(&self) -> IpFilter;

    /// Replace the filter table. Either the whole table is applied or none of it.
    fn set_ip_filter(&self, filter: IpFilter) -> anyhow::Result<()>;

    /// Cumulative session counters by libtorrent metric name.
    async fn session_metrics(
        &self,
        names: &[&'static str],
    ) -> anyhow::Result<HashMap<String, u64>>;

    fn torrents(&self) -> Vec<TorrentEntry>;
}
