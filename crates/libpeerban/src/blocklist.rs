use std::{collections::BTreeSet, net::IpAddr, sync::Arc};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    Error, Result,
    engine::{ALLOWED, BLOCKED, IpFilter, NetworkEngine},
};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BlocklistSnapshot {
    pub size: usize,
    pub ips: Vec<String>,
}

/// Keeps the set of banned addresses and the engine's filter table in step.
///
/// Every operation holds the blocklist lock from reading the set until the
/// engine has accepted the new table, so callers see either the old or the
/// new state. The set is only written after the engine accepted the change.
pub struct IpFilterManager {
    engine: Arc<dyn NetworkEngine>,
    blocklist: Mutex<BTreeSet<IpAddr>>,
}

/// Parse every address, failing on the first invalid one.
pub fn parse_ips<S: AsRef<str>>(ips: impl IntoIterator<Item = S>) -> Result<BTreeSet<IpAddr>> {
    ips.into_iter()
        .map(|ip| {
            let ip = ip.as_ref().trim();
            ip.parse::<IpAddr>()
                .map_err(|_| Error::InvalidAddress(ip.to_owned()))
        })
        .collect()
}

fn add_single_rules<'a>(
    filter: &mut IpFilter,
    ips: impl IntoIterator<Item = &'a IpAddr>,
    access: u32,
) -> Result<()> {
    for ip in ips {
        filter.add_rule(*ip, *ip, access)?;
    }
    Ok(())
}

impl IpFilterManager {
    pub fn new(engine: Arc<dyn NetworkEngine>) -> Self {
        Self {
            engine,
            blocklist: Default::default(),
        }
    }

    fn apply(&self, filter: IpFilter) -> Result<()> {
        self.engine.set_ip_filter(filter).map_err(Error::FilterSync)
    }

    /// Ban exactly `ips`, starting from an empty filter table.
    pub fn replace<S: AsRef<str>>(&self, ips: impl IntoIterator<Item = S>) -> Result<()> {
        let ips = parse_ips(ips)?;
        let mut filter = IpFilter::new();
        add_single_rules(&mut filter, &ips, BLOCKED)?;

        let mut g = self.blocklist.lock();
        self.apply(filter)?;
        info!(count = ips.len(), "replaced blocklist");
        *g = ips;
        Ok(())
    }

    /// Ban addresses that aren't banned yet. Returns how many were added.
    pub fn ban<S: AsRef<str>>(&self, ips: impl IntoIterator<Item = S>) -> Result<usize> {
        let ips = parse_ips(ips)?;
        let mut g = self.blocklist.lock();
        let pending = ips.difference(&g).copied().collect::<BTreeSet<_>>();
        if pending.is_empty() {
            debug!("nothing new to ban");
            return Ok(0);
        }

        let mut filter = self.engine.ip_filter();
        add_single_rules(&mut filter, &pending, BLOCKED)?;
        self.apply(filter)?;

        debug!(ips = ?pending, "banned");
        let count = pending.len();
        g.extend(pending);
        Ok(count)
    }

    /// Lift bans on addresses that are currently banned. Returns how many
    /// were removed.
    pub fn unban<S: AsRef<str>>(&self, ips: impl IntoIterator<Item = S>) -> Result<usize> {
        let ips = parse_ips(ips)?;
        let mut g = self.blocklist.lock();
        let pending = ips.intersection(&g).copied().collect::<BTreeSet<_>>();
        if pending.is_empty() {
            debug!("nothing to unban");
            return Ok(0);
        }

        // Allow rules added after the deny rules take precedence.
        let mut filter = self.engine.ip_filter();
        add_single_rules(&mut filter, &pending, ALLOWED)?;
        self.apply(filter)?;

        debug!(ips = ?pending, "unbanned");
        for ip in &pending {
            g.remove(ip);
        }
        Ok(pending.len())
    }

    /// Replay a persisted blocklist on top of the engine's current table.
    /// Entries that don't parse are skipped.
    pub fn restore<S: AsRef<str>>(&self, ips: impl IntoIterator<Item = S>) -> Result<usize> {
        let mut parsed = BTreeSet::new();
        for ip in ips {
            let ip = ip.as_ref();
            match ip.trim().parse::<IpAddr>() {
                Ok(addr) => {
                    parsed.insert(addr);
                }
                Err(_) => warn!(ip, "skipping invalid address in persisted blocklist"),
            }
        }
        let count = self.ban(parsed.iter().map(|ip| ip.to_string()))?;
        info!(count, "restored blocklist");
        Ok(count)
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.blocklist.lock().contains(&ip)
    }

    pub fn ips(&self) -> Vec<String> {
        self.blocklist.lock().iter().map(|ip| ip.to_string()).collect()
    }

    pub fn snapshot(&self) -> BlocklistSnapshot {
        let ips = self.ips();
        BlocklistSnapshot {
            size: ips.len(),
            ips,
        }
    }
}
