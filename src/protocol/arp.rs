//! ARP (Address Resolution Protocol) - RFC 826

use super::{EtherType, MacAddr};
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// ARP packet size (for Ethernet/IPv4)
pub const ARP_PACKET_SIZE: usize = 28;

/// Hardware type for Ethernet
pub const HTYPE_ETHERNET: u16 = 1;

/// ARP operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl ArpOp {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            _ => None,
        }
    }
}

/// ARP packet
///
/// The address fields are laid out for Ethernet/IPv4. The length fields are
/// kept as received so the handler can reject anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub hardware_type: u16,
    pub protocol_type: u16,
    pub hardware_len: u8,
    pub protocol_len: u8,
    pub operation: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Parse an ARP packet from buffer
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < ARP_PACKET_SIZE {
            return Err(Error::too_short("ARP packet", buffer.len(), ARP_PACKET_SIZE));
        }

        let operation = u16::from_be_bytes([buffer[6], buffer[7]]);
        let operation = ArpOp::from_u16(operation)
            .ok_or_else(|| Error::InvalidPacket(format!("ARP operation {}", operation)))?;

        let mut sender_mac = [0u8; 6];
        let mut target_mac = [0u8; 6];
        sender_mac.copy_from_slice(&buffer[8..14]);
        target_mac.copy_from_slice(&buffer[18..24]);

        Ok(Self {
            hardware_type: u16::from_be_bytes([buffer[0], buffer[1]]),
            protocol_type: u16::from_be_bytes([buffer[2], buffer[3]]),
            hardware_len: buffer[4],
            protocol_len: buffer[5],
            operation,
            sender_mac: MacAddr(sender_mac),
            sender_ip: Ipv4Addr::new(buffer[14], buffer[15], buffer[16], buffer[17]),
            target_mac: MacAddr(target_mac),
            target_ip: Ipv4Addr::new(buffer[24], buffer[25], buffer[26], buffer[27]),
        })
    }

    /// Serialize ARP packet to bytes
    pub fn to_bytes(&self) -> [u8; ARP_PACKET_SIZE] {
        let mut buf = [0u8; ARP_PACKET_SIZE];
        buf[0..2].copy_from_slice(&self.hardware_type.to_be_bytes());
        buf[2..4].copy_from_slice(&self.protocol_type.to_be_bytes());
        buf[4] = self.hardware_len;
        buf[5] = self.protocol_len;
        buf[6..8].copy_from_slice(&(self.operation as u16).to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.octets());
        buf
    }

    /// True when the packet maps IPv4 addresses onto Ethernet addresses
    pub fn is_ethernet_ipv4(&self) -> bool {
        self.hardware_type == HTYPE_ETHERNET
            && self.protocol_type == EtherType::Ipv4 as u16
            && self.hardware_len == 6
            && self.protocol_len == 4
    }

    fn ethernet_ipv4(
        operation: ArpOp,
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            hardware_type: HTYPE_ETHERNET,
            protocol_type: EtherType::Ipv4 as u16,
            hardware_len: 6,
            protocol_len: 4,
            operation,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// Create an ARP request
    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self::ethernet_ipv4(ArpOp::Request, sender_mac, sender_ip, MacAddr::ZERO, target_ip)
    }

    /// Create an ARP reply
    pub fn reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self::ethernet_ipv4(ArpOp::Reply, sender_mac, sender_ip, target_mac, target_ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn make_arp_request() -> [u8; ARP_PACKET_SIZE] {
        let mut buf = [0u8; ARP_PACKET_SIZE];
        // Hardware type: Ethernet (1)
        buf[0..2].copy_from_slice(&1u16.to_be_bytes());
        // Protocol type: IPv4 (0x0800)
        buf[2..4].copy_from_slice(&0x0800u16.to_be_bytes());
        buf[4] = 6;
        buf[5] = 4;
        // Operation: Request (1)
        buf[6..8].copy_from_slice(&1u16.to_be_bytes());
        // Sender MAC: 00:11:22:33:44:55
        buf[8..14].copy_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        // Sender IP: 192.168.1.10
        buf[14..18].copy_from_slice(&[192, 168, 1, 10]);
        // Target IP: 192.168.1.1
        buf[24..28].copy_from_slice(&[192, 168, 1, 1]);
        buf
    }

    #[test]
    fn test_parse_request() {
        let pkt = ArpPacket::parse(&make_arp_request()).unwrap();

        assert_eq!(pkt.operation, ArpOp::Request);
        assert_eq!(pkt.sender_mac, MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));
        assert_eq!(pkt.sender_ip, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(pkt.target_mac, MacAddr::ZERO);
        assert_eq!(pkt.target_ip, Ipv4Addr::new(192, 168, 1, 1));
        assert!(pkt.is_ethernet_ipv4());
    }

    #[test]
    fn test_parse_too_short() {
        let err = ArpPacket::parse(&[0u8; 27]).unwrap_err();
        assert!(matches!(err, Error::TooShort { need: 28, .. }));
    }

    #[test]
    fn test_parse_invalid_operation() {
        let mut data = make_arp_request();
        data[6..8].copy_from_slice(&99u16.to_be_bytes());
        assert!(matches!(ArpPacket::parse(&data), Err(Error::InvalidPacket(_))));
    }

    #[test]
    fn test_length_mismatch_is_kept_for_the_handler() {
        let mut data = make_arp_request();
        data[4] = 8;
        let pkt = ArpPacket::parse(&data).unwrap();
        assert_eq!(pkt.hardware_len, 8);
        assert!(!pkt.is_ethernet_ipv4());
    }

    #[test]
    fn test_request_matches_wire() {
        let pkt = ArpPacket::request(
            MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(192, 168, 1, 1),
        );
        assert_eq!(pkt.to_bytes(), make_arp_request());
    }

    #[test]
    fn test_reply_roundtrip() {
        let pkt = ArpPacket::reply(
            MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
            Ipv4Addr::new(192, 168, 1, 1),
            MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            Ipv4Addr::new(192, 168, 1, 10),
        );
        assert_eq!(ArpPacket::parse(&pkt.to_bytes()).unwrap(), pkt);
    }

    #[test]
    fn test_random_packets_roundtrip() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let pkt = ArpPacket {
                hardware_type: rng.gen(),
                protocol_type: rng.gen(),
                hardware_len: rng.gen(),
                protocol_len: rng.gen(),
                operation: if rng.gen_bool(0.5) { ArpOp::Request } else { ArpOp::Reply },
                sender_mac: MacAddr(rng.gen()),
                sender_ip: Ipv4Addr::from(rng.gen::<u32>()),
                target_mac: MacAddr(rng.gen()),
                target_ip: Ipv4Addr::from(rng.gen::<u32>()),
            };
            assert_eq!(ArpPacket::parse(&pkt.to_bytes()).unwrap(), pkt);
        }
    }
}
