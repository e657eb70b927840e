//! UDP protocol - RFC 768

use super::checksum::transport_checksum_v4;
use super::ip_proto;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// UDP header size (fixed)
pub const HEADER_SIZE: usize = 8;

/// Offset of the checksum field within the header
pub const CHECKSUM_OFFSET: usize = 6;

/// UDP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// Header plus data
    pub length: u16,
    /// 0 means no checksum was computed (allowed over IPv4)
    pub checksum: u16,
}

impl UdpHeader {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::too_short("UDP header", buffer.len(), HEADER_SIZE));
        }

        Ok(Self {
            src_port: u16::from_be_bytes([buffer[0], buffer[1]]),
            dst_port: u16::from_be_bytes([buffer[2], buffer[3]]),
            length: u16::from_be_bytes([buffer[4], buffer[5]]),
            checksum: u16::from_be_bytes([buffer[6], buffer[7]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..6].copy_from_slice(&self.length.to_be_bytes());
        buf[6..8].copy_from_slice(&self.checksum.to_be_bytes());
        buf
    }
}

/// Build a UDP datagram with its checksum filled in.
pub fn build_datagram(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let header = UdpHeader {
        src_port,
        dst_port,
        length: (HEADER_SIZE + payload.len()) as u16,
        checksum: 0,
    };
    let mut datagram = header.to_bytes().to_vec();
    datagram.extend_from_slice(payload);

    // 0 is reserved for "no checksum"
    let sum = match transport_checksum_v4(src_ip, dst_ip, ip_proto::UDP, &datagram) {
        0 => 0xFFFF,
        sum => sum,
    };
    datagram[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
    datagram
}
