use std::collections::BTreeSet;
use std::net::IpAddr;

use intervaltree::IntervalTree;

use crate::{Error, Result};

/// Access flags of a rule that lets the address through.
pub const ALLOWED: u32 = 0;
/// Access flags of a rule that refuses connections to and from the address.
pub const BLOCKED: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Rule {
    first: IpAddr,
    last: IpAddr,
    access: u32,
}

impl Rule {
    fn contains(&self, ip: IpAddr) -> bool {
        self.first <= ip && ip <= self.last
    }

    fn covers(&self, other: &Rule) -> bool {
        self.first <= other.first && other.last <= self.last
    }

    fn overlaps(&self, other: &Rule) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// The engine's connection filter: an ordered table of address ranges.
///
/// When rules overlap, the one added last wins. Adding an allow rule for an
/// address that was denied earlier therefore unblocks it without rebuilding
/// the table. Rules shadowed by a newer one are dropped, and an allow rule
/// that overlaps nothing isn't stored, so the table doesn't grow with
/// repeated ban/unban of the same addresses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IpFilter {
    rules: Vec<Rule>,
}

impl IpFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn add_rule(&mut self, first: IpAddr, last: IpAddr, access: u32) -> Result<()> {
        match (first, last) {
            (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)) => {}
            _ => return Err(Error::MixedAddressFamilies { first, last }),
        }
        if first > last {
            return Err(Error::ReversedRange { first, last });
        }
        let rule = Rule {
            first,
            last,
            access,
        };
        // Rules fully inside the new range can never match again.
        self.rules.retain(|r| !rule.covers(r));
        if access == ALLOWED && !self.rules.iter().any(|r| rule.overlaps(r)) {
            return Ok(());
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Access flags for `ip`, [`ALLOWED`] when no rule covers it.
    pub fn access(&self, ip: IpAddr) -> u32 {
        self.rules
            .iter()
            .rev()
            .find(|r| r.contains(ip))
            .map_or(ALLOWED, |r| r.access)
    }

    /// Single-address rules that currently resolve to [`BLOCKED`].
    pub fn denied_addresses(&self) -> BTreeSet<IpAddr> {
        self.rules
            .iter()
            .filter(|r| r.first == r.last)
            .map(|r| r.first)
            .filter(|ip| self.access(*ip) == BLOCKED)
            .collect()
    }

    pub fn compile(&self) -> CompiledIpFilter {
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();
        for (seq, rule) in self.rules.iter().enumerate() {
            match (rule.first, rule.last) {
                (IpAddr::V4(first), IpAddr::V4(last)) => {
                    let range = first.to_bits() as u64..last.to_bits() as u64 + 1;
                    v4.push((range, (seq, rule.access)));
                }
                (IpAddr::V6(first), IpAddr::V6(last)) => {
                    // The all-ones address can't be an exclusive end, it stays unmatched.
                    let range = first.to_bits()..last.to_bits().saturating_add(1);
                    v6.push((range, (seq, rule.access)));
                }
                _ => unreachable!("add_rule() rejects mixed families"),
            }
        }
        CompiledIpFilter {
            v4: IntervalTree::from_iter(v4),
            v6: IntervalTree::from_iter(v6),
        }
    }
}

/// Interval-tree lookup built from an [`IpFilter`] for per-connection checks.
pub struct CompiledIpFilter {
    // Values are (rule sequence number, access flags).
    v4: IntervalTree<u64, (usize, u32)>,
    v6: IntervalTree<u128, (usize, u32)>,
}

impl CompiledIpFilter {
    pub fn access(&self, ip: IpAddr) -> u32 {
        fn latest<'a>(
            it: impl Iterator<Item = &'a (usize, u32)>,
        ) -> Option<&'a (usize, u32)> {
            it.max_by_key(|(seq, _)| *seq)
        }
        let found = match ip {
            IpAddr::V4(a) => latest(
                self.v4
                    .query_point(a.to_bits() as u64)
                    .map(|e| &e.value),
            ),
            IpAddr::V6(a) => latest(self.v6.query_point(a.to_bits()).map(|e| &e.value)),
        };
        found.map_or(ALLOWED, |(_, access)| *access)
    }

    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        self.access(ip) & BLOCKED != 0
    }
}
