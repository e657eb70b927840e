//! Ethernet II header

use super::{EtherType, MacAddr};
use crate::{Error, Result};

/// Ethernet header size (no VLAN tag, no FCS)
pub const HEADER_SIZE: usize = 14;
/// Largest frame the capture layer is expected to deliver
pub const MAX_FRAME_SIZE: usize = 1522;

/// Ethernet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst_mac: MacAddr,
    pub src_mac: MacAddr,
    pub ethertype: u16,
}

impl EthernetHeader {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::too_short("Ethernet frame", buffer.len(), HEADER_SIZE));
        }

        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&buffer[0..6]);
        src.copy_from_slice(&buffer[6..12]);

        Ok(Self {
            dst_mac: MacAddr(dst),
            src_mac: MacAddr(src),
            ethertype: u16::from_be_bytes([buffer[12], buffer[13]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..6].copy_from_slice(&self.dst_mac.0);
        buf[6..12].copy_from_slice(&self.src_mac.0);
        buf[12..14].copy_from_slice(&self.ethertype.to_be_bytes());
        buf
    }

    pub fn ethertype(&self) -> Option<EtherType> {
        EtherType::from_u16(self.ethertype)
    }
}

/// Builder for constructing Ethernet frames
pub struct FrameBuilder {
    buffer: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_SIZE),
        }
    }

    pub fn header(mut self, header: &EthernetHeader) -> Self {
        self.buffer.extend_from_slice(&header.to_bytes());
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.buffer.extend_from_slice(payload);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
