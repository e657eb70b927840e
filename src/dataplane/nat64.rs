//! NAT64 for ICMP echo (RFC 6146 subset)
//!
//! IPv6-only hosts reach IPv4 destinations through the well-known prefix
//! 64:ff9b::/96. Only echo messages are translated; sessions are keyed by
//! the ICMP identifier.

use crate::protocol::icmp::{Echo, IcmpType};
use crate::protocol::icmpv6::Icmpv6Message;
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::ipv6::{nat64_embedded_ipv4, Ipv6Header};
use crate::protocol::ip_proto;
use crate::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// One slot per ICMP identifier
pub const NAT64_TABLE_SIZE: usize = 1 << 16;

/// NAT64 session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nat64Entry {
    /// IPv4 destination the v6 host is talking to
    pub ipv4_peer: Ipv4Addr,
    /// The IPv6 host
    pub ipv6_src: Ipv6Addr,
    /// The NAT64-mapped address the host sent to
    pub ipv6_dst: Ipv6Addr,
    pub identifier: u16,
}

/// NAT64 session table
#[derive(Debug)]
pub struct Nat64Table {
    icmp: Vec<Option<Nat64Entry>>,
    len: usize,
}

impl Default for Nat64Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Nat64Table {
    pub fn new() -> Self {
        Self {
            icmp: vec![None; NAT64_TABLE_SIZE],
            len: 0,
        }
    }

    /// Record a session, replacing whatever held the identifier before.
    pub fn insert(&mut self, entry: Nat64Entry) {
        let slot = &mut self.icmp[entry.identifier as usize];
        if slot.is_none() {
            self.len += 1;
        }
        *slot = Some(entry);
    }

    pub fn lookup(&self, ipv4_peer: Ipv4Addr, identifier: u16) -> Option<Nat64Entry> {
        self.icmp[identifier as usize].filter(|e| e.ipv4_peer == ipv4_peer)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A translated IPv4 packet and the session it belongs to
#[derive(Debug)]
pub struct Translated4 {
    pub header: Ipv4Header,
    pub payload: Vec<u8>,
    pub entry: Nat64Entry,
}

/// Translate an ICMPv6 echo sent to a NAT64-mapped address into ICMPv4.
///
/// `src_v4` is the address of the device the IPv4 packet will leave from.
pub fn translate_6to4(header: &Ipv6Header, payload: &[u8], src_v4: Ipv4Addr) -> Result<Translated4> {
    if header.next_header != ip_proto::ICMPV6 {
        return Err(Error::UnsupportedForNat(format!(
            "IPv6 next header {}",
            header.next_header
        )));
    }
    let dst_v4 = nat64_embedded_ipv4(header.dst_addr);
    if header.hop_limit == 0 {
        return Err(Error::TtlExpired(IpAddr::V4(dst_v4)));
    }

    let (icmp_type, echo) = match Icmpv6Message::parse(payload)? {
        Icmpv6Message::EchoRequest(echo) => (IcmpType::EchoRequest, echo),
        Icmpv6Message::EchoReply(echo) => (IcmpType::EchoReply, echo),
        other => {
            return Err(Error::UnsupportedForNat(format!(
                "ICMPv6 type {}",
                other.icmp_type()
            )))
        }
    };

    let message = echo.to_message(icmp_type);
    let mut v4 = Ipv4Header::new(src_v4, dst_v4, ip_proto::ICMP, message.len());
    v4.ttl = header.hop_limit - 1;
    v4.update_checksum();

    Ok(Translated4 {
        header: v4,
        payload: message,
        entry: Nat64Entry {
            ipv4_peer: dst_v4,
            ipv6_src: header.src_addr,
            ipv6_dst: header.dst_addr,
            identifier: echo.identifier,
        },
    })
}

/// Translate an ICMPv4 echo reply back to the IPv6 host of its session.
///
/// Returns the IPv6 header and the checksummed ICMPv6 message.
pub fn translate_4to6(
    header: &Ipv4Header,
    payload: &[u8],
    table: &Nat64Table,
) -> Result<(Ipv6Header, Vec<u8>)> {
    let echo = Echo::parse(payload)?;
    if payload[0] != IcmpType::EchoReply as u8 {
        return Err(Error::UnsupportedForNat(format!("ICMP type {}", payload[0])));
    }

    let entry = table
        .lookup(header.src_addr, echo.identifier)
        .ok_or(Error::NoNatEntry {
            addr: IpAddr::V4(header.src_addr),
            port: echo.identifier,
        })?;
    if header.ttl <= 1 {
        return Err(Error::TtlExpired(IpAddr::V6(entry.ipv6_src)));
    }

    // Reply flows from the mapped address back to the host
    let src = entry.ipv6_dst;
    let dst = entry.ipv6_src;
    let message = Icmpv6Message::EchoReply(echo).to_bytes(src, dst);
    let v6 = Ipv6Header::new(src, dst, ip_proto::ICMPV6, header.ttl - 1, message.len());

    Ok((v6, message))
}
