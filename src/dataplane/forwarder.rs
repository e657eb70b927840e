//! IPv4 forwarding engine
//!
//! Validate, learn the sender, then either deliver locally (ICMP, inbound
//! NAPT) or translate outgoing NAPT, route, decrement TTL and resolve the
//! next hop. A resolution miss sends one ARP request and drops the packet.

use super::{DeviceId, NatDirection, RouteEntry, RouterState, Transmit};
use crate::protocol::ethernet::EthernetHeader;
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::{ip_proto, EtherType};
use crate::{Error, Result};
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, trace};

fn is_napt_protocol(protocol: u8) -> bool {
    protocol == ip_proto::TCP || protocol == ip_proto::UDP
}

impl RouterState {
    pub(super) fn handle_ipv4(
        &mut self,
        id: DeviceId,
        eth: &EthernetHeader,
        packet: &[u8],
        tx: &mut dyn Transmit,
    ) -> Result<()> {
        let mut header = Ipv4Header::parse(packet)?;
        header.validate()?;
        let payload = header.payload(packet);

        if !header.src_addr.is_unspecified() && !self.arp.contains(&header.src_addr) {
            trace!(ip = %header.src_addr, mac = %eth.src_mac, "learned sender from IPv4");
            self.arp.upsert(header.src_addr, eth.src_mac, id);
            self.metrics.set_arp_table_size(self.arp.len());
        }

        if self.is_local_ipv4(header.dst_addr) {
            return self.ipv4_local_delivery(id, header, payload, tx);
        }

        let mut payload = payload.to_vec();
        if is_napt_protocol(header.protocol) {
            let translated = match self.device_mut(id)?.nat.as_mut() {
                Some(nat) => Some(nat.translate(NatDirection::Outgoing, &mut header, &mut payload)?),
                None => None,
            };
            if let Some(entry) = translated {
                self.metrics.nat_translations.inc();
                trace!(
                    local = %format_args!("{}:{}", entry.local_addr, entry.local_port),
                    global = %format_args!("{}:{}", entry.global_addr, entry.global_port),
                    "NAPT outgoing"
                );
            }
        }

        self.forward_ipv4(header, &payload, tx)
    }

    /// Limited broadcast, any device's address or directed broadcast, or a
    /// NAPT outside address.
    pub(super) fn is_local_ipv4(&self, dst: Ipv4Addr) -> bool {
        dst == Ipv4Addr::BROADCAST
            || self.devices.iter().any(|d| {
                d.ipv4.is_some_and(|cfg| cfg.address == dst || cfg.broadcast() == dst)
                    || d.nat.as_ref().is_some_and(|n| n.outside_addr == dst)
            })
    }

    fn ipv4_local_delivery(
        &mut self,
        id: DeviceId,
        mut header: Ipv4Header,
        payload: &[u8],
        tx: &mut dyn Transmit,
    ) -> Result<()> {
        if is_napt_protocol(header.protocol) {
            let owner = self
                .devices
                .iter()
                .position(|d| d.nat.as_ref().is_some_and(|n| n.outside_addr == header.dst_addr));

            if let Some(owner) = owner {
                let mut payload = payload.to_vec();
                let entry = self.devices[owner]
                    .nat
                    .as_mut()
                    .ok_or(Error::NoRoute(IpAddr::V4(header.dst_addr)))?
                    .translate(NatDirection::Incoming, &mut header, &mut payload)?;
                self.metrics.nat_translations.inc();
                trace!(
                    local = %format_args!("{}:{}", entry.local_addr, entry.local_port),
                    "NAPT incoming"
                );

                let route = self
                    .routes_v4
                    .lookup(header.dst_addr)
                    .ok_or(Error::NoRoute(IpAddr::V4(header.dst_addr)))?;
                return self.ipv4_output(route, header.dst_addr, &header.encapsulate(&payload), tx);
            }
        }

        match header.protocol {
            ip_proto::ICMP => self.handle_icmp(id, &header, payload, tx),
            ip_proto::TCP | ip_proto::UDP => {
                trace!(
                    protocol = header.protocol,
                    src = %header.src_addr,
                    dst = %header.dst_addr,
                    len = payload.len(),
                    "transport payload for us"
                );
                Ok(())
            }
            other => {
                trace!(protocol = other, "unhandled IP protocol");
                Ok(())
            }
        }
    }

    /// Route, decrement TTL and send a transit packet.
    fn forward_ipv4(
        &self,
        mut header: Ipv4Header,
        payload: &[u8],
        tx: &mut dyn Transmit,
    ) -> Result<()> {
        let dst = header.dst_addr;
        let route = self
            .routes_v4
            .lookup(dst)
            .ok_or(Error::NoRoute(IpAddr::V4(dst)))?;

        if !header.decrement_ttl() {
            return Err(Error::TtlExpired(IpAddr::V4(dst)));
        }

        self.ipv4_output(route, dst, &header.encapsulate(payload), tx)?;
        self.metrics.packets_forwarded.inc();
        Ok(())
    }

    /// Resolve the link-layer destination for `dst` along `route` and send.
    ///
    /// On a cache miss an ARP request goes out and the packet is dropped
    /// with [`Error::NoResolution`].
    pub(super) fn ipv4_output(
        &self,
        route: RouteEntry<Ipv4Addr>,
        dst: Ipv4Addr,
        packet: &[u8],
        tx: &mut dyn Transmit,
    ) -> Result<()> {
        let (connected, next_hop) = match route {
            RouteEntry::Connected(dev) => (Some(dev), dst),
            RouteEntry::ViaNextHop(gateway) => (None, gateway),
        };

        if let Some(neighbor) = self.arp.lookup(&next_hop) {
            let egress = connected.unwrap_or(neighbor.device);
            return self.send_ethernet(tx, egress, neighbor.mac, EtherType::Ipv4, packet);
        }

        // Only ask for a gateway that is itself on a connected network
        let egress = match connected {
            Some(dev) => dev,
            None => match self.routes_v4.lookup(next_hop) {
                Some(RouteEntry::Connected(dev)) => dev,
                _ => {
                    debug!(%next_hop, "next hop is not on a connected network");
                    return Err(Error::NoRoute(IpAddr::V4(next_hop)));
                }
            },
        };

        self.send_arp_request(tx, egress, next_hop)?;
        Err(Error::NoResolution(IpAddr::V4(next_hop)))
    }

    /// Originate an IPv4 packet carrying `payload` to `dst`.
    ///
    /// The header gets identification 0xf80c, DF and TTL 64.
    pub fn ipv4_encapsulate_output(
        &self,
        id: DeviceId,
        dst: Ipv4Addr,
        src: Ipv4Addr,
        payload: &[u8],
        protocol: u8,
        tx: &mut dyn Transmit,
    ) -> Result<()> {
        let header = Ipv4Header::new(src, dst, protocol, payload.len());
        let route = self
            .routes_v4
            .lookup(dst)
            .ok_or(Error::NoRoute(IpAddr::V4(dst)))?;
        trace!(%id, %src, %dst, protocol, "originating IPv4 packet");
        self.ipv4_output(route, dst, &header.encapsulate(payload), tx)
    }
}
