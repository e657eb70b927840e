//! ICMPv6 protocol - RFC 4443, NDP - RFC 4861

use super::checksum::transport_checksum_v6;
use super::icmp::Echo;
use super::{ip_proto, MacAddr};
use crate::{Error, Result};
use std::net::Ipv6Addr;

/// Type, code and checksum
pub const MIN_HEADER_SIZE: usize = 4;

/// Reserved/flags word plus target address
const NEIGHBOR_BODY_SIZE: usize = 20;
/// Hop limit, flags, router lifetime, reachable time, retrans timer
const RA_BODY_SIZE: usize = 12;
const PREFIX_INFO_LEN: usize = 32;

/// Router lifetime advertised in Router Advertisements, in seconds
pub const RA_ROUTER_LIFETIME: u16 = 1800;
/// Valid lifetime of the advertised prefix, in seconds
pub const RA_VALID_LIFETIME: u32 = 86400;
/// Preferred lifetime of the advertised prefix, in seconds
pub const RA_PREFERRED_LIFETIME: u32 = 14400;

/// ICMPv6 message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Icmpv6Type {
    EchoRequest = 128,
    EchoReply = 129,
    RouterSolicitation = 133,
    RouterAdvertisement = 134,
    NeighborSolicitation = 135,
    NeighborAdvertisement = 136,
}

impl Icmpv6Type {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            128 => Some(Icmpv6Type::EchoRequest),
            129 => Some(Icmpv6Type::EchoReply),
            133 => Some(Icmpv6Type::RouterSolicitation),
            134 => Some(Icmpv6Type::RouterAdvertisement),
            135 => Some(Icmpv6Type::NeighborSolicitation),
            136 => Some(Icmpv6Type::NeighborAdvertisement),
            _ => None,
        }
    }
}

/// NDP option types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NdpOptionType {
    SourceLinkLayerAddress = 1,
    TargetLinkLayerAddress = 2,
    PrefixInformation = 3,
}

/// Prefix Information option body (RFC 4861 4.6.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixInformation {
    pub prefix_len: u8,
    pub on_link: bool,
    pub autonomous: bool,
    pub valid_lifetime: u32,
    pub preferred_lifetime: u32,
    pub prefix: Ipv6Addr,
}

/// NDP option TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdpOption {
    SourceLinkLayer(MacAddr),
    TargetLinkLayer(MacAddr),
    PrefixInformation(PrefixInformation),
}

impl NdpOption {
    /// Decode a sequence of options. Unknown types are skipped; a zero
    /// length or truncated option ends decoding.
    pub fn parse_all(mut options: &[u8]) -> Vec<NdpOption> {
        let mut result = Vec::new();
        while options.len() >= 2 {
            let opt_type = options[0];
            let opt_len = options[1] as usize * 8;
            if opt_len == 0 || opt_len > options.len() {
                break;
            }
            let value = &options[..opt_len];

            match opt_type {
                1 | 2 if opt_len >= 8 => {
                    let mut mac = [0u8; 6];
                    mac.copy_from_slice(&value[2..8]);
                    result.push(if opt_type == 1 {
                        NdpOption::SourceLinkLayer(MacAddr(mac))
                    } else {
                        NdpOption::TargetLinkLayer(MacAddr(mac))
                    });
                }
                3 if opt_len >= PREFIX_INFO_LEN => {
                    let mut prefix = [0u8; 16];
                    prefix.copy_from_slice(&value[16..32]);
                    result.push(NdpOption::PrefixInformation(PrefixInformation {
                        prefix_len: value[2],
                        on_link: value[3] & 0x80 != 0,
                        autonomous: value[3] & 0x40 != 0,
                        valid_lifetime: u32::from_be_bytes([value[4], value[5], value[6], value[7]]),
                        preferred_lifetime: u32::from_be_bytes([
                            value[8], value[9], value[10], value[11],
                        ]),
                        prefix: Ipv6Addr::from(prefix),
                    }));
                }
                _ => {}
            }
            options = &options[opt_len..];
        }
        result
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        match self {
            NdpOption::SourceLinkLayer(mac) | NdpOption::TargetLinkLayer(mac) => {
                let opt_type = match self {
                    NdpOption::SourceLinkLayer(_) => NdpOptionType::SourceLinkLayerAddress,
                    _ => NdpOptionType::TargetLinkLayerAddress,
                };
                buf.extend_from_slice(&[opt_type as u8, 1]);
                buf.extend_from_slice(&mac.0);
            }
            NdpOption::PrefixInformation(info) => {
                let mut flags = 0u8;
                if info.on_link {
                    flags |= 0x80;
                }
                if info.autonomous {
                    flags |= 0x40;
                }
                buf.extend_from_slice(&[
                    NdpOptionType::PrefixInformation as u8,
                    (PREFIX_INFO_LEN / 8) as u8,
                    info.prefix_len,
                    flags,
                ]);
                buf.extend_from_slice(&info.valid_lifetime.to_be_bytes());
                buf.extend_from_slice(&info.preferred_lifetime.to_be_bytes());
                buf.extend_from_slice(&[0u8; 4]);
                buf.extend_from_slice(&info.prefix.octets());
            }
        }
    }
}

fn source_link_layer(options: &[NdpOption]) -> Option<MacAddr> {
    options.iter().find_map(|o| match o {
        NdpOption::SourceLinkLayer(mac) => Some(*mac),
        _ => None,
    })
}

/// Neighbor Solicitation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborSolicitation {
    pub target_addr: Ipv6Addr,
    pub options: Vec<NdpOption>,
}

impl NeighborSolicitation {
    pub fn source_link_addr(&self) -> Option<MacAddr> {
        source_link_layer(&self.options)
    }
}

/// Neighbor Advertisement message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborAdvertisement {
    pub router_flag: bool,
    pub solicited_flag: bool,
    pub override_flag: bool,
    pub target_addr: Ipv6Addr,
    pub options: Vec<NdpOption>,
}

impl NeighborAdvertisement {
    /// Solicited reply for one of our addresses
    pub fn solicited_reply(target_addr: Ipv6Addr, target_link_addr: MacAddr) -> Self {
        Self {
            router_flag: false,
            solicited_flag: true,
            override_flag: true,
            target_addr,
            options: vec![NdpOption::TargetLinkLayer(target_link_addr)],
        }
    }

    pub fn target_link_addr(&self) -> Option<MacAddr> {
        self.options.iter().find_map(|o| match o {
            NdpOption::TargetLinkLayer(mac) => Some(*mac),
            _ => None,
        })
    }
}

/// Default router preference (RFC 4191)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterPreference {
    High,
    Medium,
    Low,
}

impl RouterPreference {
    fn bits(self) -> u8 {
        match self {
            RouterPreference::High => 0b01,
            RouterPreference::Medium => 0b00,
            RouterPreference::Low => 0b11,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b01 => RouterPreference::High,
            0b11 => RouterPreference::Low,
            _ => RouterPreference::Medium,
        }
    }
}

/// Router Advertisement message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterAdvertisement {
    pub cur_hop_limit: u8,
    pub managed: bool,
    pub other_config: bool,
    pub preference: RouterPreference,
    pub router_lifetime: u16,
    pub reachable_time: u32,
    pub retrans_timer: u32,
    pub options: Vec<NdpOption>,
}

impl RouterAdvertisement {
    /// Advertisement announcing one on-link, autonomous prefix.
    pub fn for_prefix(prefix: Ipv6Addr, prefix_len: u8, mac: MacAddr) -> Self {
        Self {
            cur_hop_limit: 64,
            managed: false,
            other_config: false,
            preference: RouterPreference::Medium,
            router_lifetime: RA_ROUTER_LIFETIME,
            reachable_time: 0,
            retrans_timer: 0,
            options: vec![
                NdpOption::PrefixInformation(PrefixInformation {
                    prefix_len,
                    on_link: true,
                    autonomous: true,
                    valid_lifetime: RA_VALID_LIFETIME,
                    preferred_lifetime: RA_PREFERRED_LIFETIME,
                    prefix,
                }),
                NdpOption::SourceLinkLayer(mac),
            ],
        }
    }
}

/// An ICMPv6 message, one variant per kind the router understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Icmpv6Message {
    EchoRequest(Echo),
    EchoReply(Echo),
    RouterSolicitation { options: Vec<NdpOption> },
    RouterAdvertisement(RouterAdvertisement),
    NeighborSolicitation(NeighborSolicitation),
    NeighborAdvertisement(NeighborAdvertisement),
    Other { icmp_type: u8, code: u8, body: Vec<u8> },
}

fn require(buffer: &[u8], need: usize, what: &'static str) -> Result<()> {
    if buffer.len() < need {
        return Err(Error::too_short(what, buffer.len(), need));
    }
    Ok(())
}

fn read_addr(buffer: &[u8]) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&buffer[..16]);
    Ipv6Addr::from(octets)
}

impl Icmpv6Message {
    /// Decode a full ICMPv6 message. The checksum is not verified here.
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        require(buffer, MIN_HEADER_SIZE, "ICMPv6 message")?;
        let body = &buffer[MIN_HEADER_SIZE..];

        let message = match Icmpv6Type::from_u8(buffer[0]) {
            Some(Icmpv6Type::EchoRequest) => Icmpv6Message::EchoRequest(Echo::parse(buffer)?),
            Some(Icmpv6Type::EchoReply) => Icmpv6Message::EchoReply(Echo::parse(buffer)?),
            Some(Icmpv6Type::RouterSolicitation) => {
                require(body, 4, "Router Solicitation")?;
                Icmpv6Message::RouterSolicitation {
                    options: NdpOption::parse_all(&body[4..]),
                }
            }
            Some(Icmpv6Type::RouterAdvertisement) => {
                require(body, RA_BODY_SIZE, "Router Advertisement")?;
                Icmpv6Message::RouterAdvertisement(RouterAdvertisement {
                    cur_hop_limit: body[0],
                    managed: body[1] & 0x80 != 0,
                    other_config: body[1] & 0x40 != 0,
                    preference: RouterPreference::from_bits(body[1] >> 3),
                    router_lifetime: u16::from_be_bytes([body[2], body[3]]),
                    reachable_time: u32::from_be_bytes([body[4], body[5], body[6], body[7]]),
                    retrans_timer: u32::from_be_bytes([body[8], body[9], body[10], body[11]]),
                    options: NdpOption::parse_all(&body[RA_BODY_SIZE..]),
                })
            }
            Some(Icmpv6Type::NeighborSolicitation) => {
                require(body, NEIGHBOR_BODY_SIZE, "Neighbor Solicitation")?;
                Icmpv6Message::NeighborSolicitation(NeighborSolicitation {
                    target_addr: read_addr(&body[4..]),
                    options: NdpOption::parse_all(&body[NEIGHBOR_BODY_SIZE..]),
                })
            }
            Some(Icmpv6Type::NeighborAdvertisement) => {
                require(body, NEIGHBOR_BODY_SIZE, "Neighbor Advertisement")?;
                Icmpv6Message::NeighborAdvertisement(NeighborAdvertisement {
                    router_flag: body[0] & 0x80 != 0,
                    solicited_flag: body[0] & 0x40 != 0,
                    override_flag: body[0] & 0x20 != 0,
                    target_addr: read_addr(&body[4..]),
                    options: NdpOption::parse_all(&body[NEIGHBOR_BODY_SIZE..]),
                })
            }
            None => Icmpv6Message::Other {
                icmp_type: buffer[0],
                code: buffer[1],
                body: body.to_vec(),
            },
        };
        Ok(message)
    }

    pub fn icmp_type(&self) -> u8 {
        match self {
            Icmpv6Message::EchoRequest(_) => Icmpv6Type::EchoRequest as u8,
            Icmpv6Message::EchoReply(_) => Icmpv6Type::EchoReply as u8,
            Icmpv6Message::RouterSolicitation { .. } => Icmpv6Type::RouterSolicitation as u8,
            Icmpv6Message::RouterAdvertisement(_) => Icmpv6Type::RouterAdvertisement as u8,
            Icmpv6Message::NeighborSolicitation(_) => Icmpv6Type::NeighborSolicitation as u8,
            Icmpv6Message::NeighborAdvertisement(_) => Icmpv6Type::NeighborAdvertisement as u8,
            Icmpv6Message::Other { icmp_type, .. } => *icmp_type,
        }
    }

    /// Encode with the checksum field left zero.
    pub fn to_bytes_unchecked(&self) -> Vec<u8> {
        let mut buf = match self {
            Icmpv6Message::EchoRequest(echo) | Icmpv6Message::EchoReply(echo) => {
                return echo.to_bytes_with_type(self.icmp_type());
            }
            Icmpv6Message::Other { icmp_type, code, body } => {
                let mut buf = vec![*icmp_type, *code, 0, 0];
                buf.extend_from_slice(body);
                return buf;
            }
            _ => vec![self.icmp_type(), 0, 0, 0],
        };

        match self {
            Icmpv6Message::RouterSolicitation { options } => {
                buf.extend_from_slice(&[0u8; 4]);
                options.iter().for_each(|o| o.write(&mut buf));
            }
            Icmpv6Message::RouterAdvertisement(ra) => {
                let mut flags = ra.preference.bits() << 3;
                if ra.managed {
                    flags |= 0x80;
                }
                if ra.other_config {
                    flags |= 0x40;
                }
                buf.extend_from_slice(&[ra.cur_hop_limit, flags]);
                buf.extend_from_slice(&ra.router_lifetime.to_be_bytes());
                buf.extend_from_slice(&ra.reachable_time.to_be_bytes());
                buf.extend_from_slice(&ra.retrans_timer.to_be_bytes());
                ra.options.iter().for_each(|o| o.write(&mut buf));
            }
            Icmpv6Message::NeighborSolicitation(ns) => {
                buf.extend_from_slice(&[0u8; 4]);
                buf.extend_from_slice(&ns.target_addr.octets());
                ns.options.iter().for_each(|o| o.write(&mut buf));
            }
            Icmpv6Message::NeighborAdvertisement(na) => {
                let mut flags = 0u8;
                if na.router_flag {
                    flags |= 0x80;
                }
                if na.solicited_flag {
                    flags |= 0x40;
                }
                if na.override_flag {
                    flags |= 0x20;
                }
                buf.extend_from_slice(&[flags, 0, 0, 0]);
                buf.extend_from_slice(&na.target_addr.octets());
                na.options.iter().for_each(|o| o.write(&mut buf));
            }
            _ => {}
        }
        buf
    }

    /// Encode with the checksum computed over the IPv6 pseudo-header.
    pub fn to_bytes(&self, src_addr: Ipv6Addr, dst_addr: Ipv6Addr) -> Vec<u8> {
        let mut buf = self.to_bytes_unchecked();
        set_checksum(&mut buf, src_addr, dst_addr);
        buf
    }
}

/// Fill in the checksum of an encoded ICMPv6 message.
pub fn set_checksum(buffer: &mut [u8], src_addr: Ipv6Addr, dst_addr: Ipv6Addr) {
    buffer[2] = 0;
    buffer[3] = 0;
    let checksum = transport_checksum_v6(src_addr, dst_addr, ip_proto::ICMPV6, buffer);
    buffer[2..4].copy_from_slice(&checksum.to_be_bytes());
}

pub fn validate_checksum(src_addr: Ipv6Addr, dst_addr: Ipv6Addr, message: &[u8]) -> bool {
    transport_checksum_v6(src_addr, dst_addr, ip_proto::ICMPV6, message) == 0
}
