//! Configuration types

use crate::telemetry::LogConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// User-defined configuration (config.toml)
///
/// Interfaces are kept in name order; that order fixes each device's index.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub interfaces: BTreeMap<String, InterfaceConfig>,
    #[serde(default)]
    pub routes: Vec<StaticRoute>,
    #[serde(default)]
    pub nat: Vec<NatConfig>,
    #[serde(default)]
    pub nat64: Option<Nat64Config>,
    #[serde(default)]
    pub resolution: ResolutionConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterfaceConfig {
    /// IPv4 address in CIDR form, e.g. "192.168.1.1/24"
    pub address: Option<String>,
    /// IPv6 addresses in CIDR form, link-local included
    #[serde(default)]
    pub ipv6: Vec<String>,
    /// Overrides the MAC read from the system
    pub mac: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticRoute {
    pub destination: String,
    pub gateway: String,
}

/// NAPT on the inside device, translating to the outside address
#[derive(Debug, Clone, Deserialize)]
pub struct NatConfig {
    pub inside: String,
    /// Device whose IPv4 address becomes the global address
    pub outside: Option<String>,
    /// Explicit global address, used instead of `outside`
    pub outside_address: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Nat64Config {
    pub inside: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolutionConfig {
    /// ARP/NDP entries expire this long after their last update
    pub ttl_secs: Option<u64>,
}

/// A parsed network prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cidr {
    V4(Ipv4Addr, u8),
    V6(Ipv6Addr, u8),
}

impl Cidr {
    pub fn address(&self) -> IpAddr {
        match self {
            Cidr::V4(addr, _) => IpAddr::V4(*addr),
            Cidr::V6(addr, _) => IpAddr::V6(*addr),
        }
    }

    pub fn prefix_len(&self) -> u8 {
        match self {
            Cidr::V4(_, len) | Cidr::V6(_, len) => *len,
        }
    }
}

/// Parse "address/len" for either family.
pub fn parse_cidr(s: &str) -> Result<Cidr> {
    let (addr, len) = s
        .split_once('/')
        .ok_or_else(|| Error::Config(format!("'{}' is missing a prefix length", s)))?;
    let len: u8 = len
        .parse()
        .map_err(|_| Error::Config(format!("'{}' has an invalid prefix length", s)))?;
    let addr: IpAddr = addr
        .parse()
        .map_err(|_| Error::Config(format!("'{}' is not a valid address", s)))?;

    match addr {
        IpAddr::V4(v4) if len <= 32 => Ok(Cidr::V4(v4, len)),
        IpAddr::V6(v6) if len <= 128 => Ok(Cidr::V6(v6, len)),
        _ => Err(Error::Config(format!("'{}' prefix length out of range", s))),
    }
}

pub fn parse_ipv4_cidr(s: &str) -> Result<(Ipv4Addr, u8)> {
    match parse_cidr(s)? {
        Cidr::V4(addr, len) => Ok((addr, len)),
        Cidr::V6(..) => Err(Error::Config(format!("'{}' is not an IPv4 prefix", s))),
    }
}

pub fn parse_ipv6_cidr(s: &str) -> Result<(Ipv6Addr, u8)> {
    match parse_cidr(s)? {
        Cidr::V6(addr, len) => Ok((addr, len)),
        Cidr::V4(..) => Err(Error::Config(format!("'{}' is not an IPv6 prefix", s))),
    }
}
