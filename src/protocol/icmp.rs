//! ICMP (Internet Control Message Protocol) - RFC 792

use super::checksum::internet_checksum;
use crate::{Error, Result};

/// ICMP header size (type, code, checksum, 4 bytes of rest-of-header)
pub const ICMP_HEADER_SIZE: usize = 8;

/// ICMP message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    EchoReply = 0,
    DestinationUnreachable = 3,
    EchoRequest = 8,
    TimeExceeded = 11,
}

impl IcmpType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(IcmpType::EchoReply),
            3 => Some(IcmpType::DestinationUnreachable),
            8 => Some(IcmpType::EchoRequest),
            11 => Some(IcmpType::TimeExceeded),
            _ => None,
        }
    }

    /// Echo Request and Echo Reply carry identifier/sequence
    pub fn is_echo(value: u8) -> bool {
        value == IcmpType::EchoRequest as u8 || value == IcmpType::EchoReply as u8
    }
}

/// ICMP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    /// Type-specific word; identifier and sequence for echo messages
    pub rest_of_header: [u8; 4],
}

impl IcmpHeader {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < ICMP_HEADER_SIZE {
            return Err(Error::too_short("ICMP message", buffer.len(), ICMP_HEADER_SIZE));
        }
        Ok(Self {
            icmp_type: buffer[0],
            code: buffer[1],
            checksum: u16::from_be_bytes([buffer[2], buffer[3]]),
            rest_of_header: [buffer[4], buffer[5], buffer[6], buffer[7]],
        })
    }

    pub fn to_bytes(&self) -> [u8; ICMP_HEADER_SIZE] {
        let mut buf = [0u8; ICMP_HEADER_SIZE];
        buf[0] = self.icmp_type;
        buf[1] = self.code;
        buf[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        buf[4..8].copy_from_slice(&self.rest_of_header);
        buf
    }
}

/// Body of an Echo Request or Echo Reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echo {
    pub identifier: u16,
    pub sequence: u16,
    pub data: Vec<u8>,
}

impl Echo {
    /// Decode the echo fields of a full ICMP message (header included).
    pub fn parse(message: &[u8]) -> Result<Self> {
        let header = IcmpHeader::parse(message)?;
        let r = header.rest_of_header;
        Ok(Self {
            identifier: u16::from_be_bytes([r[0], r[1]]),
            sequence: u16::from_be_bytes([r[2], r[3]]),
            data: message[ICMP_HEADER_SIZE..].to_vec(),
        })
    }

    /// Encode as an ICMP message of `icmp_type` with the checksum filled in.
    pub fn to_message(&self, icmp_type: IcmpType) -> Vec<u8> {
        let mut message = self.to_bytes_with_type(icmp_type as u8);
        let checksum = internet_checksum(&message);
        message[2..4].copy_from_slice(&checksum.to_be_bytes());
        message
    }

    /// Encode with a zero checksum; the caller supplies the type byte.
    pub fn to_bytes_with_type(&self, icmp_type: u8) -> Vec<u8> {
        let mut message = Vec::with_capacity(ICMP_HEADER_SIZE + self.data.len());
        message.extend_from_slice(&[icmp_type, 0, 0, 0]);
        message.extend_from_slice(&self.identifier.to_be_bytes());
        message.extend_from_slice(&self.sequence.to_be_bytes());
        message.extend_from_slice(&self.data);
        message
    }
}

/// Build an ICMP Echo Reply from an Echo Request
pub fn build_echo_reply(request: &[u8]) -> Result<Vec<u8>> {
    let echo = Echo::parse(request)?;
    Ok(echo.to_message(IcmpType::EchoReply))
}
