//! TCP protocol - RFC 793
//!
//! Only the fixed header is decoded; NAPT rewrites ports and checksums.

use crate::{Error, Result};

/// Minimum TCP header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Offset of the checksum field within the header
pub const CHECKSUM_OFFSET: usize = 16;

/// TCP flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
    pub ece: bool,
    pub cwr: bool,
}

impl TcpFlags {
    /// Parse flags from the 13th byte of TCP header
    pub fn from_byte(byte: u8) -> Self {
        Self {
            fin: (byte & 0x01) != 0,
            syn: (byte & 0x02) != 0,
            rst: (byte & 0x04) != 0,
            psh: (byte & 0x08) != 0,
            ack: (byte & 0x10) != 0,
            urg: (byte & 0x20) != 0,
            ece: (byte & 0x40) != 0,
            cwr: (byte & 0x80) != 0,
        }
    }

    pub fn to_byte(&self) -> u8 {
        [
            self.fin, self.syn, self.rst, self.psh, self.ack, self.urg, self.ece, self.cwr,
        ]
        .iter()
        .enumerate()
        .filter(|(_, set)| **set)
        .fold(0u8, |byte, (bit, _)| byte | (1 << bit))
    }
}

/// TCP header, options excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_num: u32,
    pub ack_num: u32,
    /// Header length in 32-bit words
    pub data_offset: u8,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
    pub urgent_ptr: u16,
}

impl TcpHeader {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::too_short("TCP header", buffer.len(), MIN_HEADER_SIZE));
        }

        Ok(Self {
            src_port: u16::from_be_bytes([buffer[0], buffer[1]]),
            dst_port: u16::from_be_bytes([buffer[2], buffer[3]]),
            seq_num: u32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]),
            ack_num: u32::from_be_bytes([buffer[8], buffer[9], buffer[10], buffer[11]]),
            data_offset: buffer[12] >> 4,
            flags: TcpFlags::from_byte(buffer[13]),
            window: u16::from_be_bytes([buffer[14], buffer[15]]),
            checksum: u16::from_be_bytes([buffer[16], buffer[17]]),
            urgent_ptr: u16::from_be_bytes([buffer[18], buffer[19]]),
        })
    }

    pub fn header_len(&self) -> usize {
        self.data_offset as usize * 4
    }

    pub fn to_bytes(&self) -> [u8; MIN_HEADER_SIZE] {
        let mut buf = [0u8; MIN_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..8].copy_from_slice(&self.seq_num.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ack_num.to_be_bytes());
        buf[12] = self.data_offset << 4;
        buf[13] = self.flags.to_byte();
        buf[14..16].copy_from_slice(&self.window.to_be_bytes());
        buf[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        buf[18..20].copy_from_slice(&self.urgent_ptr.to_be_bytes());
        buf
    }
}
