//! Router state and Ethernet dispatch
//!
//! `RouterState` owns every table the data plane touches: devices, the
//! ARP and NDP caches, both routing tables and (through the devices) the
//! NAT tables. The event loop owns one instance and hands each received
//! frame to [`RouterState::process_frame`] together with a transmit
//! capability; handlers run to completion before the next frame.

use super::{
    process_arp, ArpAction, ArpCache, DeviceId, Ipv4RoutingTable, Ipv6RoutingTable, NatDevice,
    Nat64Table, NeighborCache, NetDevice, RouteEntry, Transmit,
};
use crate::config::{parse_cidr, parse_ipv4_cidr, parse_ipv6_cidr, Cidr, Config};
use crate::protocol::arp::ArpPacket;
use crate::protocol::ethernet::{self, EthernetHeader, FrameBuilder};
use crate::protocol::ipv6::{is_link_local, network};
use crate::protocol::{EtherType, MacAddr};
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// All mutable router state, owned by the event loop
pub struct RouterState {
    pub(super) devices: Vec<NetDevice>,
    pub(super) arp: ArpCache,
    pub(super) ndp: NeighborCache,
    pub(super) routes_v4: Ipv4RoutingTable,
    pub(super) routes_v6: Ipv6RoutingTable,
    pub(super) metrics: Arc<MetricsRegistry>,
}

impl RouterState {
    /// Create the router and install a Connected route for every
    /// configured network.
    pub fn new(devices: Vec<NetDevice>) -> Self {
        let metrics = Arc::new(MetricsRegistry::new(devices.iter().map(|d| d.name.clone())));
        Self::with_metrics(devices, metrics)
    }

    pub fn with_metrics(devices: Vec<NetDevice>, metrics: Arc<MetricsRegistry>) -> Self {
        let mut state = Self {
            devices,
            arp: ArpCache::new(),
            ndp: NeighborCache::new(),
            routes_v4: Ipv4RoutingTable::new(),
            routes_v6: Ipv6RoutingTable::new(),
            metrics,
        };
        state.install_connected_routes();
        state
    }

    /// Expire ARP and NDP entries `ttl` after their last update.
    pub fn with_resolution_ttl(mut self, ttl: Duration) -> Self {
        self.arp = ArpCache::with_ttl(ttl);
        self.ndp = NeighborCache::with_ttl(ttl);
        self
    }

    /// Build the router from configuration.
    ///
    /// `mac_for` supplies the MAC of interfaces the config does not pin.
    pub fn from_config<F>(config: &Config, mut mac_for: F) -> Result<Self>
    where
        F: FnMut(&str) -> Result<MacAddr>,
    {
        let mut devices = Vec::with_capacity(config.interfaces.len());
        for (name, iface) in &config.interfaces {
            let mac = match &iface.mac {
                Some(mac) => mac
                    .parse()
                    .map_err(|e| Error::Config(format!("interfaces.{}.mac: {}", name, e)))?,
                None => mac_for(name)?,
            };

            let mut device = NetDevice::new(name.clone(), mac);
            if let Some(address) = &iface.address {
                let (addr, len) = parse_ipv4_cidr(address)?;
                device = device.with_ipv4(addr, len);
            }
            for address in &iface.ipv6 {
                let (addr, len) = parse_ipv6_cidr(address)?;
                device = device.with_ipv6(addr, len);
            }
            devices.push(device);
        }

        let index_of = |devices: &[NetDevice], name: &str| {
            devices
                .iter()
                .position(|d| d.name == name)
                .ok_or_else(|| Error::InterfaceNotFound {
                    name: name.to_string(),
                })
        };

        for nat in &config.nat {
            let outside_addr = match (nat.outside_address, &nat.outside) {
                (Some(addr), _) => addr,
                (None, Some(outside)) => devices[index_of(&devices, outside)?]
                    .ipv4_addr()
                    .ok_or_else(|| {
                        Error::Config(format!("NAT outside device {} has no IPv4 address", outside))
                    })?,
                (None, None) => {
                    return Err(Error::Config(format!(
                        "NAT on {} needs an outside device or address",
                        nat.inside
                    )))
                }
            };
            let inside = index_of(&devices, &nat.inside)?;
            info!(inside = %nat.inside, %outside_addr, "NAPT enabled");
            devices[inside].nat = Some(NatDevice::new(outside_addr));
        }

        if let Some(nat64) = &config.nat64 {
            let inside = index_of(&devices, &nat64.inside)?;
            info!(inside = %nat64.inside, "NAT64 enabled");
            devices[inside].nat64 = Some(Nat64Table::new());
        }

        let mut state = Self::new(devices);
        if let Some(secs) = config.resolution.ttl_secs {
            state = state.with_resolution_ttl(Duration::from_secs(secs));
        }

        for route in &config.routes {
            let gateway: IpAddr = route.gateway.parse().map_err(|_| {
                Error::Config(format!("route gateway '{}' is not an address", route.gateway))
            })?;
            match (parse_cidr(&route.destination)?, gateway) {
                (Cidr::V4(dest, len), IpAddr::V4(gw)) => {
                    state.add_route_v4(dest, len, RouteEntry::ViaNextHop(gw))
                }
                (Cidr::V6(dest, len), IpAddr::V6(gw)) => {
                    state.add_route_v6(dest, len, RouteEntry::ViaNextHop(gw))
                }
                _ => {
                    return Err(Error::Config(format!(
                        "route {} via {} mixes address families",
                        route.destination, route.gateway
                    )))
                }
            }
        }

        Ok(state)
    }

    fn install_connected_routes(&mut self) {
        for (index, device) in self.devices.iter().enumerate() {
            let id = DeviceId(index);
            if let Some(v4) = device.ipv4 {
                self.routes_v4
                    .add(v4.network(), v4.prefix_len, RouteEntry::Connected(id));
                debug!(device = %device.name, network = %v4.network(), len = v4.prefix_len, "connected route");
            }
            if let Some(v6) = &device.ipv6 {
                for prefix in v6.addresses.iter().filter(|p| !is_link_local(p.address)) {
                    let net = network(prefix.address, prefix.prefix_len);
                    self.routes_v6
                        .add(net, prefix.prefix_len, RouteEntry::Connected(id));
                    debug!(device = %device.name, network = %net, len = prefix.prefix_len, "connected route");
                }
            }
        }
        self.metrics
            .set_route_count(self.routes_v4.len() + self.routes_v6.len());
    }

    pub fn add_route_v4(&mut self, destination: Ipv4Addr, prefix_len: u8, entry: RouteEntry<Ipv4Addr>) {
        info!(%destination, prefix_len, ?entry, "IPv4 route");
        self.routes_v4.add(destination, prefix_len, entry);
        self.metrics
            .set_route_count(self.routes_v4.len() + self.routes_v6.len());
    }

    pub fn add_route_v6(&mut self, destination: Ipv6Addr, prefix_len: u8, entry: RouteEntry<Ipv6Addr>) {
        info!(%destination, prefix_len, ?entry, "IPv6 route");
        self.routes_v6.add(destination, prefix_len, entry);
        self.metrics
            .set_route_count(self.routes_v4.len() + self.routes_v6.len());
    }

    pub fn devices(&self) -> &[NetDevice] {
        &self.devices
    }

    pub fn device(&self, id: DeviceId) -> Result<&NetDevice> {
        self.devices
            .get(id.0)
            .ok_or_else(|| Error::InterfaceNotFound {
                name: id.to_string(),
            })
    }

    pub(super) fn device_mut(&mut self, id: DeviceId) -> Result<&mut NetDevice> {
        self.devices
            .get_mut(id.0)
            .ok_or_else(|| Error::InterfaceNotFound {
                name: id.to_string(),
            })
    }

    pub fn device_id(&self, name: &str) -> Option<DeviceId> {
        self.devices.iter().position(|d| d.name == name).map(DeviceId)
    }

    pub fn arp(&self) -> &ArpCache {
        &self.arp
    }

    pub fn arp_mut(&mut self) -> &mut ArpCache {
        &mut self.arp
    }

    pub fn ndp(&self) -> &NeighborCache {
        &self.ndp
    }

    pub fn ndp_mut(&mut self) -> &mut NeighborCache {
        &mut self.ndp
    }

    pub fn routes_v4(&self) -> &Ipv4RoutingTable {
        &self.routes_v4
    }

    pub fn routes_v6(&self) -> &Ipv6RoutingTable {
        &self.routes_v6
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Drop expired ARP/NDP entries. A no-op without a configured TTL.
    pub fn evict_expired(&mut self) -> usize {
        let evicted = self.arp.evict_expired() + self.ndp.evict_expired();
        if evicted > 0 {
            debug!(evicted, "resolution entries expired");
        }
        self.metrics.set_arp_table_size(self.arp.len());
        self.metrics.set_ndp_table_size(self.ndp.len());
        evicted
    }

    /// Handle one frame received on `device`.
    ///
    /// Per-packet failures are logged and the packet is dropped; only
    /// transmit and device lookup failures reach the caller.
    pub fn process_frame(
        &mut self,
        device: DeviceId,
        frame: &[u8],
        tx: &mut dyn Transmit,
    ) -> Result<()> {
        self.metrics.record_rx(device, frame.len());

        match self.dispatch_frame(device, frame, tx) {
            Err(e) if e.is_packet_drop() => {
                self.metrics.packets_dropped.inc();
                debug!(%device, error = %e, "packet dropped");
                Ok(())
            }
            result => result,
        }
    }

    fn dispatch_frame(&mut self, id: DeviceId, frame: &[u8], tx: &mut dyn Transmit) -> Result<()> {
        let header = EthernetHeader::parse(frame)?;
        let device = self.device(id)?;

        // 33:33 covers all-nodes and solicited-node groups for NDP
        let accepted = header.dst_mac == device.mac
            || header.dst_mac.is_broadcast()
            || header.dst_mac.is_ipv6_multicast();
        if !accepted {
            trace!(device = %device.name, dst = %header.dst_mac, "frame not for us");
            return Ok(());
        }

        let payload = &frame[ethernet::HEADER_SIZE..];
        match header.ethertype() {
            Some(EtherType::Arp) => self.handle_arp(id, payload, tx),
            Some(EtherType::Ipv4) => self.handle_ipv4(id, &header, payload, tx),
            Some(EtherType::Ipv6) => self.handle_ipv6(id, &header, payload, tx),
            None => {
                trace!(device = %device.name, ethertype = header.ethertype, "unhandled ethertype");
                Ok(())
            }
        }
    }

    fn handle_arp(&mut self, id: DeviceId, payload: &[u8], tx: &mut dyn Transmit) -> Result<()> {
        let packet = ArpPacket::parse(payload)?;
        let device = self.device(id)?;
        let (local_ip, local_mac) = (device.ipv4_addr(), device.mac);

        let action = process_arp(&packet, &mut self.arp, id, local_ip, local_mac)?;
        self.metrics.set_arp_table_size(self.arp.len());

        match action {
            ArpAction::Reply(reply) => {
                debug!(%id, target = %reply.target_ip, "sending ARP reply");
                self.send_ethernet(tx, id, reply.target_mac, EtherType::Arp, &reply.to_bytes())?;
                self.metrics.arp_replies_sent.inc();
            }
            ArpAction::TableUpdated => {
                trace!(ip = %packet.sender_ip, mac = %packet.sender_mac, "ARP entry learned");
            }
            ArpAction::None => {}
        }
        Ok(())
    }

    /// Broadcast an ARP request for `target` out of `device`.
    pub fn send_arp_request(
        &self,
        tx: &mut dyn Transmit,
        id: DeviceId,
        target: Ipv4Addr,
    ) -> Result<()> {
        let device = self.device(id)?;
        let sender_ip = device
            .ipv4_addr()
            .ok_or(Error::NoResolution(IpAddr::V4(target)))?;
        let request = ArpPacket::request(device.mac, sender_ip, target);

        debug!(device = %device.name, %target, "sending ARP request");
        self.send_ethernet(tx, id, MacAddr::BROADCAST, EtherType::Arp, &request.to_bytes())?;
        self.metrics.arp_requests_sent.inc();
        Ok(())
    }

    /// Prepend an Ethernet header and hand the frame to the transmitter.
    pub fn send_ethernet(
        &self,
        tx: &mut dyn Transmit,
        id: DeviceId,
        dst_mac: MacAddr,
        ethertype: EtherType,
        payload: &[u8],
    ) -> Result<()> {
        let device = self.device(id)?;
        let frame = FrameBuilder::new()
            .header(&EthernetHeader {
                dst_mac,
                src_mac: device.mac,
                ethertype: ethertype as u16,
            })
            .payload(payload)
            .build();
        let len = frame.len();

        if let Err(e) = tx.transmit(id, frame) {
            warn!(device = %device.name, error = %e, "transmit failed");
            self.metrics.record_tx_error(id);
            return Err(e);
        }
        self.metrics.record_tx(id, len);
        Ok(())
    }
}
