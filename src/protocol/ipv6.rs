//! IPv6 protocol - RFC 8200

use crate::{Error, Result};
use std::net::Ipv6Addr;

/// IPv6 header size (fixed, unlike IPv4)
pub const HEADER_SIZE: usize = 40;

/// Hop limit for locally originated NDP messages (RFC 4861 requires 255)
pub const NDP_HOP_LIMIT: u8 = 255;

/// Hop limit for other locally originated packets
pub const DEFAULT_HOP_LIMIT: u8 = 64;

/// Well-known prefix for NAT64 (RFC 6052), 64:ff9b::/96
pub const NAT64_PREFIX: [u8; 12] = [0x00, 0x64, 0xff, 0x9b, 0, 0, 0, 0, 0, 0, 0, 0];

/// All-nodes link-local multicast group
pub const ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

/// IPv6 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Header {
    pub version: u8,
    pub traffic_class: u8,
    /// 20-bit flow label
    pub flow_label: u32,
    pub payload_length: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub src_addr: Ipv6Addr,
    pub dst_addr: Ipv6Addr,
}

impl Ipv6Header {
    pub fn new(
        src_addr: Ipv6Addr,
        dst_addr: Ipv6Addr,
        next_header: u8,
        hop_limit: u8,
        payload_len: usize,
    ) -> Self {
        Self {
            version: 6,
            traffic_class: 0,
            flow_label: 0,
            payload_length: payload_len as u16,
            next_header,
            hop_limit,
            src_addr,
            dst_addr,
        }
    }

    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::too_short("IPv6 header", buffer.len(), HEADER_SIZE));
        }

        let first = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
        let mut src = [0u8; 16];
        let mut dst = [0u8; 16];
        src.copy_from_slice(&buffer[8..24]);
        dst.copy_from_slice(&buffer[24..40]);

        Ok(Self {
            version: (first >> 28) as u8,
            traffic_class: (first >> 20) as u8,
            flow_label: first & 0x000F_FFFF,
            payload_length: u16::from_be_bytes([buffer[4], buffer[5]]),
            next_header: buffer[6],
            hop_limit: buffer[7],
            src_addr: Ipv6Addr::from(src),
            dst_addr: Ipv6Addr::from(dst),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != 6 {
            return Err(Error::WrongVersion {
                expected: 6,
                found: self.version,
            });
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let first = ((self.version as u32 & 0x0F) << 28)
            | ((self.traffic_class as u32) << 20)
            | (self.flow_label & 0x000F_FFFF);

        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&first.to_be_bytes());
        buf[4..6].copy_from_slice(&self.payload_length.to_be_bytes());
        buf[6] = self.next_header;
        buf[7] = self.hop_limit;
        buf[8..24].copy_from_slice(&self.src_addr.octets());
        buf[24..40].copy_from_slice(&self.dst_addr.octets());
        buf
    }

    /// Payload bytes of `packet`, trimmed to the payload length.
    pub fn payload<'a>(&self, packet: &'a [u8]) -> &'a [u8] {
        let end = (HEADER_SIZE + self.payload_length as usize).min(packet.len());
        packet.get(HEADER_SIZE..end).unwrap_or(&[])
    }

    pub fn encapsulate(&self, payload: &[u8]) -> Vec<u8> {
        let mut packet = Vec::with_capacity(HEADER_SIZE + payload.len());
        packet.extend_from_slice(&self.to_bytes());
        packet.extend_from_slice(payload);
        packet
    }
}

/// Top 64 bits of an address, the part the IPv6 routing trie indexes.
pub fn routing_prefix(addr: Ipv6Addr) -> u64 {
    (u128::from(addr) >> 64) as u64
}

pub fn is_link_local(addr: Ipv6Addr) -> bool {
    addr.segments()[0] & 0xffc0 == 0xfe80
}

pub fn is_link_scope_multicast(addr: Ipv6Addr) -> bool {
    addr.segments()[0] == 0xff02
}

/// Solicited-node multicast group ff02::1:ffXX:XXXX for `target`.
pub fn solicited_node(target: Ipv6Addr) -> Ipv6Addr {
    let o = target.octets();
    Ipv6Addr::from([
        0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0xff, o[13], o[14], o[15],
    ])
}

/// First `prefix_len` bits of `addr`, the rest zeroed.
pub fn network(addr: Ipv6Addr, prefix_len: u8) -> Ipv6Addr {
    let mask = match prefix_len {
        0 => 0,
        len => u128::MAX << (128 - len.min(128) as u32),
    };
    Ipv6Addr::from(u128::from(addr) & mask)
}

pub fn is_nat64_mapped(addr: Ipv6Addr) -> bool {
    addr.octets()[..12] == NAT64_PREFIX
}

/// IPv4 destination embedded in the low 32 bits of a NAT64 address.
pub fn nat64_embedded_ipv4(addr: Ipv6Addr) -> std::net::Ipv4Addr {
    let o = addr.octets();
    std::net::Ipv4Addr::new(o[12], o[13], o[14], o[15])
}
