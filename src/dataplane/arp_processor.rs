//! ARP packet processor
//!
//! Answers requests for our own address and learns sender mappings into
//! the shared ARP cache.

use super::{ArpCache, DeviceId};
use crate::protocol::arp::{ArpOp, ArpPacket};
use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Result of processing an ARP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpAction {
    /// No action needed
    None,
    /// Send an ARP reply
    Reply(ArpPacket),
    /// Cache was updated, nothing to send
    TableUpdated,
}

/// Process an incoming ARP packet received on `device`
///
/// # Arguments
/// * `packet` - The parsed ARP packet
/// * `cache` - The ARP cache to update
/// * `device` - Device the packet arrived on
/// * `local_ip` - Our IPv4 address on that device, if it has one
/// * `local_mac` - Our MAC address on that device
///
/// Anything other than Ethernet/IPv4 ARP is rejected with
/// [`Error::InvalidPacket`].
pub fn process_arp(
    packet: &ArpPacket,
    cache: &mut ArpCache,
    device: DeviceId,
    local_ip: Option<Ipv4Addr>,
    local_mac: MacAddr,
) -> Result<ArpAction> {
    if !packet.is_ethernet_ipv4() {
        return Err(Error::InvalidPacket(format!(
            "ARP htype {} ptype {:#06x} hlen {} plen {}",
            packet.hardware_type, packet.protocol_type, packet.hardware_len, packet.protocol_len
        )));
    }

    // Devices without IPv4 neither answer nor learn
    let Some(local_ip) = local_ip else {
        return Ok(ArpAction::None);
    };

    // Probes carry an unspecified sender and must not be cached
    let learned = !packet.sender_ip.is_unspecified();
    if learned {
        cache.upsert(packet.sender_ip, packet.sender_mac, device);
    }

    match packet.operation {
        ArpOp::Request if packet.target_ip == local_ip => Ok(ArpAction::Reply(ArpPacket::reply(
            local_mac,
            local_ip,
            packet.sender_mac,
            packet.sender_ip,
        ))),
        _ if learned => Ok(ArpAction::TableUpdated),
        _ => Ok(ArpAction::None),
    }
}
