//! Address resolution caches (ARP for IPv4, NDP for IPv6)
//!
//! One row per protocol address. Entries live until the process exits
//! unless a TTL is configured.

use super::DeviceId;
use crate::protocol::MacAddr;
use std::collections::HashMap;
use std::hash::Hash;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{Duration, Instant};

/// Resolved neighbor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub mac: MacAddr,
    /// Device the neighbor was learned on
    pub device: DeviceId,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    neighbor: Neighbor,
    last_updated: Instant,
}

/// Protocol address to link address table
#[derive(Debug)]
pub struct ResolutionCache<A> {
    entries: HashMap<A, CacheEntry>,
    ttl: Option<Duration>,
}

/// IPv4 neighbors learned through ARP
pub type ArpCache = ResolutionCache<Ipv4Addr>;

/// IPv6 neighbors learned through NDP
pub type NeighborCache = ResolutionCache<Ipv6Addr>;

impl<A> Default for ResolutionCache<A> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            ttl: None,
        }
    }
}

impl<A: Copy + Eq + Hash> ResolutionCache<A> {
    /// Cache whose entries never expire
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose entries are dropped `ttl` after their last update
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Some(ttl),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Insert a mapping, or update the existing row for `addr` in place.
    pub fn upsert(&mut self, addr: A, mac: MacAddr, device: DeviceId) {
        self.upsert_at(addr, mac, device, Instant::now());
    }

    fn upsert_at(&mut self, addr: A, mac: MacAddr, device: DeviceId, now: Instant) {
        let neighbor = Neighbor { mac, device };
        self.entries
            .entry(addr)
            .and_modify(|entry| {
                entry.neighbor = neighbor;
                entry.last_updated = now;
            })
            .or_insert(CacheEntry {
                neighbor,
                last_updated: now,
            });
    }

    pub fn lookup(&self, addr: &A) -> Option<Neighbor> {
        self.lookup_at(addr, Instant::now())
    }

    fn lookup_at(&self, addr: &A, now: Instant) -> Option<Neighbor> {
        let entry = self.entries.get(addr)?;
        if self.is_expired(entry, now) {
            return None;
        }
        Some(entry.neighbor)
    }

    pub fn contains(&self, addr: &A) -> bool {
        self.lookup(addr).is_some()
    }

    /// Drop expired rows, returning how many went away.
    pub fn evict_expired(&mut self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    pub fn evict_expired_at(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        if let Some(ttl) = self.ttl {
            self.entries
                .retain(|_, e| now.saturating_duration_since(e.last_updated) < ttl);
        }
        before - self.entries.len()
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.last_updated) >= ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
