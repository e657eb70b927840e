use std::io;
use std::net::IpAddr;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("{what} too short: {len} bytes, need {need}")]
    TooShort {
        what: &'static str,
        len: usize,
        need: usize,
    },

    #[error("IPv4 header options are not supported (header length {0})")]
    UnsupportedOption(usize),

    #[error("wrong IP version: expected {expected}, found {found}")]
    WrongVersion { expected: u8, found: u8 },

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("no route to {0}")]
    NoRoute(IpAddr),

    #[error("no link-layer address for {0}, resolution requested")]
    NoResolution(IpAddr),

    #[error("TTL expired for packet to {0}")]
    TtlExpired(IpAddr),

    #[error("NAT table is full")]
    NatTableFull,

    #[error("no NAT entry for {addr}:{port}")]
    NoNatEntry { addr: IpAddr, port: u16 },

    #[error("{0} cannot be translated")]
    UnsupportedForNat(String),
}

impl Error {
    pub(crate) fn too_short(what: &'static str, len: usize, need: usize) -> Self {
        Error::TooShort { what, len, need }
    }

    /// Whether this error only concerns the packet being processed.
    ///
    /// These are logged and the packet is dropped; everything else is
    /// surfaced to the event loop.
    pub fn is_packet_drop(&self) -> bool {
        !matches!(
            self,
            Error::Io(_) | Error::Config(_) | Error::InterfaceNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
