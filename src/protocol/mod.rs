//! Network protocol implementations
//!
//! Headers are decoded into owned values with `parse` and written back
//! with `to_bytes`.

pub mod arp;
pub mod checksum;
pub mod ethernet;
pub mod icmp;
pub mod icmpv6;
pub mod ipv4;
pub mod ipv6;
pub mod tcp;
pub mod types;
pub mod udp;

pub use types::*;
