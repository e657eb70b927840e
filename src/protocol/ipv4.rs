//! IPv4 protocol - RFC 791

use super::checksum::internet_checksum;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// IPv4 header size; options are not supported
pub const HEADER_SIZE: usize = 20;

/// Default TTL for locally originated packets
pub const DEFAULT_TTL: u8 = 64;

/// Identification used for locally originated packets
pub const LOCAL_IDENTIFICATION: u16 = 0xf80c;

/// Fragment flags, as they sit in the flags/offset word
pub mod flags {
    /// Don't Fragment
    pub const DF: u16 = 0x4000;
    /// More Fragments
    pub const MF: u16 = 0x2000;
}

/// IPv4 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    /// Header length in 32-bit words
    pub ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub identification: u16,
    /// Flags (top 3 bits) and fragment offset
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
}

impl Ipv4Header {
    /// Header for a packet originated by the router
    pub fn new(src_addr: Ipv4Addr, dst_addr: Ipv4Addr, protocol: u8, payload_len: usize) -> Self {
        let mut header = Self {
            version: 4,
            ihl: (HEADER_SIZE / 4) as u8,
            tos: 0,
            total_length: (HEADER_SIZE + payload_len) as u16,
            identification: LOCAL_IDENTIFICATION,
            flags_fragment: flags::DF,
            ttl: DEFAULT_TTL,
            protocol,
            checksum: 0,
            src_addr,
            dst_addr,
        };
        header.update_checksum();
        header
    }

    /// Decode the fixed 20-byte header.
    ///
    /// Version and header length are decoded as-is; see [`Ipv4Header::validate`].
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::too_short("IPv4 header", buffer.len(), HEADER_SIZE));
        }

        Ok(Self {
            version: buffer[0] >> 4,
            ihl: buffer[0] & 0x0F,
            tos: buffer[1],
            total_length: u16::from_be_bytes([buffer[2], buffer[3]]),
            identification: u16::from_be_bytes([buffer[4], buffer[5]]),
            flags_fragment: u16::from_be_bytes([buffer[6], buffer[7]]),
            ttl: buffer[8],
            protocol: buffer[9],
            checksum: u16::from_be_bytes([buffer[10], buffer[11]]),
            src_addr: Ipv4Addr::new(buffer[12], buffer[13], buffer[14], buffer[15]),
            dst_addr: Ipv4Addr::new(buffer[16], buffer[17], buffer[18], buffer[19]),
        })
    }

    /// Reject anything but an option-less IPv4 header.
    pub fn validate(&self) -> Result<()> {
        if self.version != 4 {
            return Err(Error::WrongVersion {
                expected: 4,
                found: self.version,
            });
        }
        if self.header_len() != HEADER_SIZE {
            return Err(Error::UnsupportedOption(self.header_len()));
        }
        Ok(())
    }

    pub fn header_len(&self) -> usize {
        self.ihl as usize * 4
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = (self.version << 4) | (self.ihl & 0x0F);
        buf[1] = self.tos;
        buf[2..4].copy_from_slice(&self.total_length.to_be_bytes());
        buf[4..6].copy_from_slice(&self.identification.to_be_bytes());
        buf[6..8].copy_from_slice(&self.flags_fragment.to_be_bytes());
        buf[8] = self.ttl;
        buf[9] = self.protocol;
        buf[10..12].copy_from_slice(&self.checksum.to_be_bytes());
        buf[12..16].copy_from_slice(&self.src_addr.octets());
        buf[16..20].copy_from_slice(&self.dst_addr.octets());
        buf
    }

    /// Zero the checksum field and recompute it over the header.
    pub fn update_checksum(&mut self) {
        self.checksum = 0;
        self.checksum = internet_checksum(&self.to_bytes());
    }

    pub fn checksum_valid(&self) -> bool {
        internet_checksum(&self.to_bytes()) == 0
    }

    /// Decrement TTL and recompute the checksum.
    ///
    /// Returns false, leaving the header untouched, if the TTL is 1 or less.
    pub fn decrement_ttl(&mut self) -> bool {
        if self.ttl <= 1 {
            return false;
        }
        self.ttl -= 1;
        self.update_checksum();
        true
    }

    /// Payload bytes of `packet`, trimmed to the total length when the
    /// frame carried link-layer padding.
    pub fn payload<'a>(&self, packet: &'a [u8]) -> &'a [u8] {
        let end = (self.total_length as usize).clamp(HEADER_SIZE, packet.len().max(HEADER_SIZE));
        packet.get(HEADER_SIZE..end).unwrap_or(&[])
    }

    /// Serialize header followed by `payload`.
    pub fn encapsulate(&self, payload: &[u8]) -> Vec<u8> {
        let mut packet = Vec::with_capacity(HEADER_SIZE + payload.len());
        packet.extend_from_slice(&self.to_bytes());
        packet.extend_from_slice(payload);
        packet
    }
}

/// Network mask for a prefix length.
pub fn mask_from_prefix_len(prefix_len: u8) -> Ipv4Addr {
    match prefix_len {
        0 => Ipv4Addr::UNSPECIFIED,
        len => Ipv4Addr::from(u32::MAX << (32 - len.min(32) as u32)),
    }
}

/// Prefix length for a contiguous network mask.
pub fn prefix_len_from_mask(mask: Ipv4Addr) -> u8 {
    u32::from(mask).leading_ones() as u8
}
