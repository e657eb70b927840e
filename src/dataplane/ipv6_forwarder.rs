//! IPv6 forwarding engine
//!
//! Mirrors the IPv4 path: local delivery for our addresses and link-scope
//! multicast, NAT64 for 64:ff9b::/96 on a NAT64 device, otherwise route on
//! the top 64 bits, decrement the hop limit and resolve through NDP.

use super::{translate_6to4, DeviceId, RouteEntry, RouterState, Transmit};
use crate::protocol::ethernet::EthernetHeader;
use crate::protocol::icmpv6::{Icmpv6Message, NdpOption, NeighborSolicitation};
use crate::protocol::ipv6::{
    is_link_local, is_link_scope_multicast, is_nat64_mapped, nat64_embedded_ipv4, solicited_node,
    Ipv6Header, DEFAULT_HOP_LIMIT, NDP_HOP_LIMIT,
};
use crate::protocol::{ip_proto, EtherType, MacAddr};
use crate::{Error, Result};
use std::net::{IpAddr, Ipv6Addr};
use tracing::{debug, trace};

impl RouterState {
    pub(super) fn handle_ipv6(
        &mut self,
        id: DeviceId,
        eth: &EthernetHeader,
        packet: &[u8],
        tx: &mut dyn Transmit,
    ) -> Result<()> {
        let header = Ipv6Header::parse(packet)?;
        header.validate()?;
        let payload = header.payload(packet);
        let dst = header.dst_addr;

        let device = self.device(id)?;
        let has_link_local = device
            .ipv6
            .as_ref()
            .is_some_and(|cfg| cfg.link_local().is_some());
        let to_us = device.has_ipv6_addr(&dst) || (is_link_scope_multicast(dst) && has_link_local);

        if to_us {
            return match header.next_header {
                ip_proto::ICMPV6 => self.handle_icmpv6(id, eth, &header, payload, tx),
                other => {
                    trace!(next_header = other, src = %header.src_addr, "unhandled IPv6 payload for us");
                    Ok(())
                }
            };
        }

        if is_nat64_mapped(dst) && device.nat64.is_some() {
            return self.nat64_outbound(id, &header, payload, tx);
        }

        if dst.is_multicast() || is_link_local(dst) {
            trace!(%dst, "link-scope or multicast not forwarded");
            return Ok(());
        }

        self.forward_ipv6(header, payload, tx)
    }

    fn forward_ipv6(&self, mut header: Ipv6Header, payload: &[u8], tx: &mut dyn Transmit) -> Result<()> {
        let dst = header.dst_addr;
        let route = self
            .routes_v6
            .lookup(dst)
            .ok_or(Error::NoRoute(IpAddr::V6(dst)))?;

        if header.hop_limit == 0 {
            return Err(Error::TtlExpired(IpAddr::V6(dst)));
        }
        header.hop_limit -= 1;

        self.ipv6_output(route, dst, &header.encapsulate(payload), tx)?;
        self.metrics.packets_forwarded.inc();
        Ok(())
    }

    /// Resolve `dst` along `route` through the neighbor cache and send.
    ///
    /// A miss sends a Neighbor Solicitation and drops the packet with
    /// [`Error::NoResolution`].
    pub(super) fn ipv6_output(
        &self,
        route: RouteEntry<Ipv6Addr>,
        dst: Ipv6Addr,
        packet: &[u8],
        tx: &mut dyn Transmit,
    ) -> Result<()> {
        let (connected, next_hop) = match route {
            RouteEntry::Connected(dev) => (Some(dev), dst),
            RouteEntry::ViaNextHop(gateway) => (None, gateway),
        };

        if let Some(neighbor) = self.ndp.lookup(&next_hop) {
            let egress = connected.unwrap_or(neighbor.device);
            return self.send_ethernet(tx, egress, neighbor.mac, EtherType::Ipv6, packet);
        }

        let egress = match connected {
            Some(dev) => dev,
            None => match self.routes_v6.lookup(next_hop) {
                Some(RouteEntry::Connected(dev)) => dev,
                _ => {
                    debug!(%next_hop, "next hop is not on a connected network");
                    return Err(Error::NoRoute(IpAddr::V6(next_hop)));
                }
            },
        };

        self.send_neighbor_solicitation(tx, egress, next_hop)?;
        Err(Error::NoResolution(IpAddr::V6(next_hop)))
    }

    /// Originate an IPv6 packet. Link-local destinations leave through `id`.
    pub fn ipv6_encapsulate_output(
        &self,
        id: DeviceId,
        dst: Ipv6Addr,
        src: Ipv6Addr,
        payload: &[u8],
        next_header: u8,
        tx: &mut dyn Transmit,
    ) -> Result<()> {
        let header = Ipv6Header::new(src, dst, next_header, DEFAULT_HOP_LIMIT, payload.len());
        let route = if is_link_local(dst) {
            RouteEntry::Connected(id)
        } else {
            self.routes_v6
                .lookup(dst)
                .ok_or(Error::NoRoute(IpAddr::V6(dst)))?
        };
        self.ipv6_output(route, dst, &header.encapsulate(payload), tx)
    }

    /// Multicast a Neighbor Solicitation for `target` to its
    /// solicited-node group.
    pub fn send_neighbor_solicitation(
        &self,
        tx: &mut dyn Transmit,
        id: DeviceId,
        target: Ipv6Addr,
    ) -> Result<()> {
        let device = self.device(id)?;
        let src = device
            .ipv6
            .as_ref()
            .and_then(|cfg| cfg.source_for(target))
            .ok_or(Error::NoResolution(IpAddr::V6(target)))?;
        let dst = solicited_node(target);

        let message = Icmpv6Message::NeighborSolicitation(NeighborSolicitation {
            target_addr: target,
            options: vec![NdpOption::SourceLinkLayer(device.mac)],
        })
        .to_bytes(src, dst);
        let header = Ipv6Header::new(src, dst, ip_proto::ICMPV6, NDP_HOP_LIMIT, message.len());

        debug!(device = %device.name, %target, "sending neighbor solicitation");
        self.send_ethernet(
            tx,
            id,
            MacAddr::solicited_node(target),
            EtherType::Ipv6,
            &header.encapsulate(&message),
        )?;
        self.metrics.neighbor_solicitations_sent.inc();
        Ok(())
    }

    /// Translate an ICMPv6 echo toward a NAT64-mapped address and send it
    /// as IPv4 from the egress device's address.
    fn nat64_outbound(
        &mut self,
        id: DeviceId,
        header: &Ipv6Header,
        payload: &[u8],
        tx: &mut dyn Transmit,
    ) -> Result<()> {
        let dst_v4 = nat64_embedded_ipv4(header.dst_addr);
        let route = self
            .routes_v4
            .lookup(dst_v4)
            .ok_or(Error::NoRoute(IpAddr::V4(dst_v4)))?;
        let egress = match route {
            RouteEntry::Connected(dev) => dev,
            RouteEntry::ViaNextHop(gateway) => match self.routes_v4.lookup(gateway) {
                Some(RouteEntry::Connected(dev)) => dev,
                _ => return Err(Error::NoRoute(IpAddr::V4(gateway))),
            },
        };
        let src_v4 = self
            .device(egress)?
            .ipv4_addr()
            .ok_or(Error::NoRoute(IpAddr::V4(dst_v4)))?;

        let translated = translate_6to4(header, payload, src_v4)?;
        if let Some(table) = self.device_mut(id)?.nat64.as_mut() {
            table.insert(translated.entry);
        }
        self.metrics.nat64_translations.inc();
        trace!(
            v6_src = %header.src_addr,
            v4_dst = %dst_v4,
            id = translated.entry.identifier,
            "NAT64 outbound"
        );

        let packet = translated.header.encapsulate(&translated.payload);
        self.ipv4_output(route, dst_v4, &packet, tx)
    }
}
