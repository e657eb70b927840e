//! NAPT (Network Address Port Translation)
//!
//! N:1 source NAT for the inside network. Entries sit in fixed slot arrays:
//! TCP and UDP slots map one-to-one onto global ports 20000-59999, ICMP echo
//! slots onto the 16-bit identifier.

use crate::protocol::checksum::{incremental_update, incremental_update_u32};
use crate::protocol::icmp::{IcmpHeader, IcmpType};
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::tcp::{self, TcpHeader};
use crate::protocol::udp::{self, UdpHeader};
use crate::protocol::ip_proto;
use crate::{Error, Result};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

/// Lowest global port handed out for TCP and UDP
pub const NAT_GLOBAL_PORT_MIN: u16 = 20000;
/// Highest global port handed out for TCP and UDP
pub const NAT_GLOBAL_PORT_MAX: u16 = 59999;
pub const NAT_GLOBAL_PORT_SIZE: usize = (NAT_GLOBAL_PORT_MAX - NAT_GLOBAL_PORT_MIN) as usize + 1;
/// One slot per ICMP identifier
pub const NAT_ICMP_ID_SIZE: usize = 1 << 16;

/// Offset of the identifier in an ICMP echo message
const ICMP_ID_OFFSET: usize = 4;
const ICMP_CHECKSUM_OFFSET: usize = 2;

/// NAPT-supported protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NaptProtocol {
    Tcp,
    Udp,
    Icmp,
}

impl NaptProtocol {
    fn index(self) -> usize {
        self as usize
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            ip_proto::ICMP => Some(NaptProtocol::Icmp),
            ip_proto::TCP => Some(NaptProtocol::Tcp),
            ip_proto::UDP => Some(NaptProtocol::Udp),
            _ => None,
        }
    }
}

/// Translation direction, seen from the inside network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatDirection {
    /// Inside to outside: source is rewritten
    Outgoing,
    /// Outside to inside: destination is rewritten
    Incoming,
}

/// One live mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NatEntry {
    pub global_addr: Ipv4Addr,
    /// Global port, or ICMP identifier
    pub global_port: u16,
    pub local_addr: Ipv4Addr,
    pub local_port: u16,
}

/// NAPT translation table
#[derive(Debug)]
pub struct NaptTable {
    tcp: Vec<Option<NatEntry>>,
    udp: Vec<Option<NatEntry>>,
    icmp: Vec<Option<NatEntry>>,
    /// (protocol, local address, local port) -> slot
    by_local: HashMap<(NaptProtocol, Ipv4Addr, u16), usize>,
    /// No slot below this index is free, per protocol
    first_free: [usize; 3],
}

impl Default for NaptTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NaptTable {
    pub fn new() -> Self {
        Self {
            tcp: vec![None; NAT_GLOBAL_PORT_SIZE],
            udp: vec![None; NAT_GLOBAL_PORT_SIZE],
            icmp: vec![None; NAT_ICMP_ID_SIZE],
            by_local: HashMap::new(),
            first_free: [0; 3],
        }
    }

    fn slots(&self, protocol: NaptProtocol) -> &[Option<NatEntry>] {
        match protocol {
            NaptProtocol::Tcp => &self.tcp,
            NaptProtocol::Udp => &self.udp,
            NaptProtocol::Icmp => &self.icmp,
        }
    }

    fn slots_mut(&mut self, protocol: NaptProtocol) -> &mut Vec<Option<NatEntry>> {
        match protocol {
            NaptProtocol::Tcp => &mut self.tcp,
            NaptProtocol::Udp => &mut self.udp,
            NaptProtocol::Icmp => &mut self.icmp,
        }
    }

    fn slot_for_global_port(protocol: NaptProtocol, port: u16) -> Option<usize> {
        match protocol {
            NaptProtocol::Icmp => Some(port as usize),
            _ if (NAT_GLOBAL_PORT_MIN..=NAT_GLOBAL_PORT_MAX).contains(&port) => {
                Some((port - NAT_GLOBAL_PORT_MIN) as usize)
            }
            _ => None,
        }
    }

    fn global_port_for_slot(protocol: NaptProtocol, slot: usize) -> u16 {
        match protocol {
            NaptProtocol::Icmp => slot as u16,
            _ => NAT_GLOBAL_PORT_MIN + slot as u16,
        }
    }

    pub fn get_by_local(&self, protocol: NaptProtocol, addr: Ipv4Addr, port: u16) -> Option<NatEntry> {
        let slot = *self.by_local.get(&(protocol, addr, port))?;
        self.slots(protocol)[slot]
    }

    pub fn get_by_global(&self, protocol: NaptProtocol, addr: Ipv4Addr, port: u16) -> Option<NatEntry> {
        let slot = Self::slot_for_global_port(protocol, port)?;
        self.slots(protocol)[slot].filter(|e| e.global_addr == addr && e.global_port == port)
    }

    /// Claim the first free slot for a new local endpoint.
    pub fn create_entry(
        &mut self,
        protocol: NaptProtocol,
        local_addr: Ipv4Addr,
        local_port: u16,
        global_addr: Ipv4Addr,
    ) -> Result<NatEntry> {
        let start = self.first_free[protocol.index()];
        let slots = self.slots_mut(protocol);
        let slot = slots[start..]
            .iter()
            .position(Option::is_none)
            .map(|offset| start + offset)
            .ok_or(Error::NatTableFull)?;

        let entry = NatEntry {
            global_addr,
            global_port: Self::global_port_for_slot(protocol, slot),
            local_addr,
            local_port,
        };
        slots[slot] = Some(entry);
        self.first_free[protocol.index()] = slot + 1;
        self.by_local.insert((protocol, local_addr, local_port), slot);

        debug!(
            ?protocol,
            local = %local_addr,
            local_port,
            global_port = entry.global_port,
            "NAT entry created"
        );
        Ok(entry)
    }

    /// Existing mapping for the local endpoint, or a new one.
    pub fn find_or_create(
        &mut self,
        protocol: NaptProtocol,
        local_addr: Ipv4Addr,
        local_port: u16,
        global_addr: Ipv4Addr,
    ) -> Result<NatEntry> {
        match self.get_by_local(protocol, local_addr, local_port) {
            Some(entry) if entry.global_addr == global_addr => Ok(entry),
            Some(mut entry) => {
                // Outside address changed since the entry was made
                entry.global_addr = global_addr;
                if let Some(slot) = Self::slot_for_global_port(protocol, entry.global_port) {
                    self.slots_mut(protocol)[slot] = Some(entry);
                }
                Ok(entry)
            }
            None => self.create_entry(protocol, local_addr, local_port, global_addr),
        }
    }

    /// Number of live entries across all protocols
    pub fn len(&self) -> usize {
        self.by_local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_local.is_empty()
    }
}

/// NAPT state held by the inside device
#[derive(Debug)]
pub struct NatDevice {
    /// Global address written into outgoing packets
    pub outside_addr: Ipv4Addr,
    pub table: NaptTable,
}

/// Transport fields NAT touches, located in the payload
struct PortField {
    port_offset: usize,
    checksum_offset: usize,
    /// Whether the transport checksum covers the IP pseudo-header
    pseudo_header: bool,
    /// UDP over IPv4 may carry no checksum at all
    optional_checksum: bool,
}

impl NatDevice {
    pub fn new(outside_addr: Ipv4Addr) -> Self {
        Self {
            outside_addr,
            table: NaptTable::new(),
        }
    }

    /// Rewrite `header` and the transport header at the start of `payload`.
    ///
    /// Checksums are adjusted incrementally: the transport checksum by the
    /// address and port deltas, the IP header checksum by the address delta.
    pub fn translate(
        &mut self,
        direction: NatDirection,
        header: &mut Ipv4Header,
        payload: &mut [u8],
    ) -> Result<NatEntry> {
        let protocol = NaptProtocol::from_u8(header.protocol)
            .ok_or_else(|| Error::UnsupportedForNat(format!("IP protocol {}", header.protocol)))?;
        let field = locate_port_field(protocol, direction, payload)?;
        let port = read_u16(payload, field.port_offset);

        let entry = match direction {
            NatDirection::Outgoing => {
                self.table
                    .find_or_create(protocol, header.src_addr, port, self.outside_addr)?
            }
            NatDirection::Incoming => self
                .table
                .get_by_global(protocol, header.dst_addr, port)
                .ok_or(Error::NoNatEntry {
                    addr: IpAddr::V4(header.dst_addr),
                    port,
                })?,
        };

        let (old_addr, new_addr, new_port) = match direction {
            NatDirection::Outgoing => (header.src_addr, entry.global_addr, entry.global_port),
            NatDirection::Incoming => (header.dst_addr, entry.local_addr, entry.local_port),
        };

        rewrite_transport(payload, &field, old_addr, new_addr, port, new_port);

        match direction {
            NatDirection::Outgoing => header.src_addr = new_addr,
            NatDirection::Incoming => header.dst_addr = new_addr,
        }
        header.checksum =
            incremental_update_u32(header.checksum, u32::from(old_addr), u32::from(new_addr));

        Ok(entry)
    }
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

fn locate_port_field(
    protocol: NaptProtocol,
    direction: NatDirection,
    payload: &[u8],
) -> Result<PortField> {
    // Source port on the way out, destination port on the way back
    let port_offset = match direction {
        NatDirection::Outgoing => 0,
        NatDirection::Incoming => 2,
    };

    match protocol {
        NaptProtocol::Tcp => {
            TcpHeader::parse(payload)?;
            Ok(PortField {
                port_offset,
                checksum_offset: tcp::CHECKSUM_OFFSET,
                pseudo_header: true,
                optional_checksum: false,
            })
        }
        NaptProtocol::Udp => {
            UdpHeader::parse(payload)?;
            Ok(PortField {
                port_offset,
                checksum_offset: udp::CHECKSUM_OFFSET,
                pseudo_header: true,
                optional_checksum: true,
            })
        }
        NaptProtocol::Icmp => {
            let icmp = IcmpHeader::parse(payload)?;
            if !IcmpType::is_echo(icmp.icmp_type) {
                return Err(Error::UnsupportedForNat(format!("ICMP type {}", icmp.icmp_type)));
            }
            Ok(PortField {
                port_offset: ICMP_ID_OFFSET,
                checksum_offset: ICMP_CHECKSUM_OFFSET,
                pseudo_header: false,
                optional_checksum: false,
            })
        }
    }
}

fn rewrite_transport(
    payload: &mut [u8],
    field: &PortField,
    old_addr: Ipv4Addr,
    new_addr: Ipv4Addr,
    old_port: u16,
    new_port: u16,
) {
    write_u16(payload, field.port_offset, new_port);

    let old_checksum = read_u16(payload, field.checksum_offset);
    if field.optional_checksum && old_checksum == 0 {
        return;
    }

    let mut checksum = incremental_update(old_checksum, old_port, new_port);
    if field.pseudo_header {
        checksum = incremental_update_u32(checksum, u32::from(old_addr), u32::from(new_addr));
    }
    if field.optional_checksum && checksum == 0 {
        checksum = 0xffff;
    }
    write_u16(payload, field.checksum_offset, checksum);
}
