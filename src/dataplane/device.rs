//! Network devices and the transmit capability

use super::napt::NatDevice;
use super::nat64::Nat64Table;
use crate::protocol::ipv4::mask_from_prefix_len;
use crate::protocol::ipv6::is_link_local;
use crate::protocol::MacAddr;
use crate::Result;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Index of a device in the router's device list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev{}", self.0)
    }
}

/// IPv4 address assigned to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Config {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl Ipv4Config {
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            address,
            prefix_len: prefix_len.min(32),
        }
    }

    pub fn netmask(&self) -> Ipv4Addr {
        mask_from_prefix_len(self.prefix_len)
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) & u32::from(self.netmask()))
    }

    /// Directed broadcast address of the connected network
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) | !u32::from(self.netmask()))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & u32::from(self.netmask()) == u32::from(self.network())
    }
}

/// One IPv6 address with its prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Prefix {
    pub address: Ipv6Addr,
    pub prefix_len: u8,
}

/// IPv6 addresses assigned to a device, link-local included
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ipv6Config {
    pub addresses: Vec<Ipv6Prefix>,
}

impl Ipv6Config {
    pub fn has_address(&self, addr: &Ipv6Addr) -> bool {
        self.addresses.iter().any(|a| a.address == *addr)
    }

    pub fn link_local(&self) -> Option<Ipv6Addr> {
        self.addresses
            .iter()
            .map(|a| a.address)
            .find(|a| is_link_local(*a))
    }

    /// First address that is not link-local
    pub fn global(&self) -> Option<Ipv6Prefix> {
        self.addresses
            .iter()
            .copied()
            .find(|a| !is_link_local(a.address))
    }

    /// Source address for packets sent to `dst`: link-local for link-scoped
    /// destinations, otherwise the first global address.
    pub fn source_for(&self, dst: Ipv6Addr) -> Option<Ipv6Addr> {
        let link_scoped = is_link_local(dst) || dst.segments()[0] == 0xff02;
        if link_scoped {
            self.link_local().or_else(|| self.global().map(|p| p.address))
        } else {
            self.global().map(|p| p.address).or_else(|| self.link_local())
        }
    }
}

/// A network device known to the router
#[derive(Debug)]
pub struct NetDevice {
    pub name: String,
    pub mac: MacAddr,
    pub ipv4: Option<Ipv4Config>,
    pub ipv6: Option<Ipv6Config>,
    pub nat: Option<NatDevice>,
    pub nat64: Option<Nat64Table>,
}

impl NetDevice {
    pub fn new(name: impl Into<String>, mac: MacAddr) -> Self {
        Self {
            name: name.into(),
            mac,
            ipv4: None,
            ipv6: None,
            nat: None,
            nat64: None,
        }
    }

    pub fn with_ipv4(mut self, address: Ipv4Addr, prefix_len: u8) -> Self {
        self.ipv4 = Some(Ipv4Config::new(address, prefix_len));
        self
    }

    pub fn with_ipv6(mut self, address: Ipv6Addr, prefix_len: u8) -> Self {
        self.ipv6
            .get_or_insert_with(Ipv6Config::default)
            .addresses
            .push(Ipv6Prefix {
                address,
                prefix_len,
            });
        self
    }

    pub fn ipv4_addr(&self) -> Option<Ipv4Addr> {
        self.ipv4.map(|c| c.address)
    }

    pub fn has_ipv6_addr(&self, addr: &Ipv6Addr) -> bool {
        self.ipv6.as_ref().is_some_and(|c| c.has_address(addr))
    }
}

/// Transmit capability for Ethernet frames
pub trait Transmit {
    fn transmit(&mut self, device: DeviceId, frame: Vec<u8>) -> Result<()>;
}

/// Frames waiting to be written to their devices, in send order
#[derive(Debug, Default)]
pub struct TxQueue {
    frames: Vec<(DeviceId, Vec<u8>)>,
}

impl TxQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[(DeviceId, Vec<u8>)] {
        &self.frames
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, (DeviceId, Vec<u8>)> {
        self.frames.drain(..)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Transmit for TxQueue {
    fn transmit(&mut self, device: DeviceId, frame: Vec<u8>) -> Result<()> {
        self.frames.push((device, frame));
        Ok(())
    }
}
