//! Kestrel - userspace IPv4/IPv6 router
//!
//! Frames are read from AF_PACKET sockets and processed entirely in
//! userspace: Ethernet, ARP, IPv4/IPv6, NDP, ICMP/ICMPv6, longest-prefix
//! routing, NAPT and NAT64.

pub mod capture;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
