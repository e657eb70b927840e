//! NDP packet processor
//!
//! Neighbor Solicitation/Advertisement and Router Solicitation handling.
//! The caller encodes and transmits whatever action comes back.

use super::{DeviceId, Ipv6Config, NeighborCache};
use crate::protocol::icmpv6::{
    NdpOption, NeighborAdvertisement, NeighborSolicitation, RouterAdvertisement,
};
use crate::protocol::ipv6::{network, ALL_NODES};
use crate::protocol::MacAddr;
use std::net::Ipv6Addr;

/// Result of processing an NDP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdpAction {
    /// No action needed
    None,
    /// Send a Neighbor Advertisement to `dst`
    SendNeighborAdvertisement {
        dst: Ipv6Addr,
        na: NeighborAdvertisement,
    },
    /// Send a Router Advertisement to `dst`
    SendRouterAdvertisement {
        dst: Ipv6Addr,
        ra: RouterAdvertisement,
    },
    /// Cache was updated, nothing to send
    TableUpdated,
}

/// Reply destination: the solicitor, or all-nodes for an unspecified source
fn reply_destination(src_ip: Ipv6Addr) -> Ipv6Addr {
    if src_ip.is_unspecified() {
        ALL_NODES
    } else {
        src_ip
    }
}

fn learn_solicitor(
    src_ip: Ipv6Addr,
    link_addr: Option<MacAddr>,
    cache: &mut NeighborCache,
    device: DeviceId,
) -> bool {
    // DAD probes come from :: and must not be cached
    match link_addr {
        Some(mac) if !src_ip.is_unspecified() => {
            cache.upsert(src_ip, mac, device);
            true
        }
        _ => false,
    }
}

/// Process an incoming Neighbor Solicitation
///
/// # Arguments
/// * `ns` - The parsed Neighbor Solicitation
/// * `src_ip` - Source IPv6 address from the IPv6 header
/// * `cache` - The neighbor cache to update
/// * `device` - Device the solicitation arrived on
/// * `local` - Our IPv6 addresses on this device
/// * `local_mac` - Our MAC address on this device
pub fn process_neighbor_solicitation(
    ns: &NeighborSolicitation,
    src_ip: Ipv6Addr,
    cache: &mut NeighborCache,
    device: DeviceId,
    local: Option<&Ipv6Config>,
    local_mac: MacAddr,
) -> NdpAction {
    let learned = learn_solicitor(src_ip, ns.source_link_addr(), cache, device);

    if local.is_some_and(|cfg| cfg.has_address(&ns.target_addr)) {
        return NdpAction::SendNeighborAdvertisement {
            dst: reply_destination(src_ip),
            na: NeighborAdvertisement::solicited_reply(ns.target_addr, local_mac),
        };
    }

    if learned {
        NdpAction::TableUpdated
    } else {
        NdpAction::None
    }
}

/// Process an incoming Neighbor Advertisement
///
/// The advertised target is cached from its Target Link-Layer option;
/// advertisements without one carry nothing to learn.
pub fn process_neighbor_advertisement(
    na: &NeighborAdvertisement,
    cache: &mut NeighborCache,
    device: DeviceId,
) -> NdpAction {
    match na.target_link_addr() {
        Some(mac) if !na.target_addr.is_unspecified() => {
            cache.upsert(na.target_addr, mac, device);
            NdpAction::TableUpdated
        }
        _ => NdpAction::None,
    }
}

/// Process an incoming Router Solicitation
///
/// Answers with a Router Advertisement for the device's first global
/// prefix. A device without a global address stays silent.
pub fn process_router_solicitation(
    options: &[NdpOption],
    src_ip: Ipv6Addr,
    cache: &mut NeighborCache,
    device: DeviceId,
    local: Option<&Ipv6Config>,
    local_mac: MacAddr,
) -> NdpAction {
    let link_addr = options.iter().find_map(|o| match o {
        NdpOption::SourceLinkLayer(mac) => Some(*mac),
        _ => None,
    });
    let learned = learn_solicitor(src_ip, link_addr, cache, device);

    match local.and_then(Ipv6Config::global) {
        Some(prefix) => NdpAction::SendRouterAdvertisement {
            dst: reply_destination(src_ip),
            ra: RouterAdvertisement::for_prefix(
                network(prefix.address, prefix.prefix_len),
                prefix.prefix_len,
                local_mac,
            ),
        },
        None if learned => NdpAction::TableUpdated,
        None => NdpAction::None,
    }
}
