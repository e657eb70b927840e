//! ICMP and ICMPv6 addressed to the router
//!
//! Echo requests are answered on both families. ICMPv6 also carries NDP,
//! whose replies go out with hop limit 255. An ICMPv4 echo reply arriving
//! while NAT64 is enabled is translated back to the IPv6 host.

use super::{
    process_neighbor_advertisement, process_neighbor_solicitation, process_router_solicitation,
    translate_4to6, DeviceId, NdpAction, RouterState, Transmit,
};
use crate::protocol::ethernet::EthernetHeader;
use crate::protocol::icmp::{build_echo_reply, Echo, IcmpHeader, IcmpType};
use crate::protocol::icmpv6::{validate_checksum, Icmpv6Message};
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::ipv6::{Ipv6Header, NDP_HOP_LIMIT};
use crate::protocol::{ip_proto, EtherType, MacAddr};
use crate::{Error, Result};
use std::net::{IpAddr, Ipv6Addr};
use tracing::{debug, error, trace};

impl RouterState {
    pub(super) fn handle_icmp(
        &mut self,
        id: DeviceId,
        header: &Ipv4Header,
        payload: &[u8],
        tx: &mut dyn Transmit,
    ) -> Result<()> {
        let icmp = IcmpHeader::parse(payload)?;

        match IcmpType::from_u8(icmp.icmp_type) {
            Some(IcmpType::EchoRequest) => {
                let reply = build_echo_reply(payload)?;
                let src = if self.devices.iter().any(|d| d.ipv4_addr() == Some(header.dst_addr)) {
                    header.dst_addr
                } else {
                    self.device(id)?
                        .ipv4_addr()
                        .ok_or(Error::NoRoute(IpAddr::V4(header.src_addr)))?
                };

                debug!(dst = %header.src_addr, %src, "ICMP echo reply");
                self.ipv4_encapsulate_output(id, header.src_addr, src, &reply, ip_proto::ICMP, tx)?;
                self.metrics.icmp_echo_replies.inc();
                Ok(())
            }
            Some(IcmpType::EchoReply) if self.devices.iter().any(|d| d.nat64.is_some()) => {
                self.nat64_inbound(header, payload, tx)
            }
            Some(IcmpType::EchoReply) => {
                debug!(src = %header.src_addr, "ICMP echo reply received");
                Ok(())
            }
            _ => {
                debug!(
                    icmp_type = icmp.icmp_type,
                    code = icmp.code,
                    src = %header.src_addr,
                    "unhandled ICMP message"
                );
                Ok(())
            }
        }
    }

    /// Send an ICMPv4 echo reply back to the IPv6 host that started the
    /// session.
    fn nat64_inbound(&mut self, header: &Ipv4Header, payload: &[u8], tx: &mut dyn Transmit) -> Result<()> {
        let echo = Echo::parse(payload)?;
        let table = self
            .devices
            .iter()
            .filter_map(|d| d.nat64.as_ref())
            .find(|t| t.lookup(header.src_addr, echo.identifier).is_some());

        let Some(table) = table else {
            error!(
                src = %header.src_addr,
                id = echo.identifier,
                "no NAT64 session for echo reply"
            );
            return Err(Error::NoNatEntry {
                addr: IpAddr::V4(header.src_addr),
                port: echo.identifier,
            });
        };

        let (v6, message) = translate_4to6(header, payload, table)?;
        self.metrics.nat64_translations.inc();
        trace!(v4_src = %header.src_addr, v6_dst = %v6.dst_addr, "NAT64 inbound");

        let route = self
            .routes_v6
            .lookup(v6.dst_addr)
            .ok_or(Error::NoRoute(IpAddr::V6(v6.dst_addr)))?;
        self.ipv6_output(route, v6.dst_addr, &v6.encapsulate(&message), tx)
    }

    pub(super) fn handle_icmpv6(
        &mut self,
        id: DeviceId,
        eth: &EthernetHeader,
        header: &Ipv6Header,
        payload: &[u8],
        tx: &mut dyn Transmit,
    ) -> Result<()> {
        if !validate_checksum(header.src_addr, header.dst_addr, payload) {
            return Err(Error::InvalidPacket("ICMPv6 checksum mismatch".into()));
        }

        let src = header.src_addr;
        let device = self.device(id)?;
        let (local, local_mac) = (device.ipv6.clone(), device.mac);

        let action = match Icmpv6Message::parse(payload)? {
            Icmpv6Message::NeighborSolicitation(ns) => {
                process_neighbor_solicitation(&ns, src, &mut self.ndp, id, local.as_ref(), local_mac)
            }
            Icmpv6Message::NeighborAdvertisement(na) => {
                process_neighbor_advertisement(&na, &mut self.ndp, id)
            }
            Icmpv6Message::RouterSolicitation { options } => {
                process_router_solicitation(&options, src, &mut self.ndp, id, local.as_ref(), local_mac)
            }
            Icmpv6Message::EchoRequest(echo) => {
                let reply_src = if local.as_ref().is_some_and(|c| c.has_address(&header.dst_addr)) {
                    header.dst_addr
                } else {
                    local
                        .as_ref()
                        .and_then(|c| c.source_for(src))
                        .ok_or(Error::NoRoute(IpAddr::V6(src)))?
                };
                let reply = Icmpv6Message::EchoReply(echo).to_bytes(reply_src, src);

                debug!(dst = %src, src = %reply_src, "ICMPv6 echo reply");
                self.ipv6_encapsulate_output(id, src, reply_src, &reply, ip_proto::ICMPV6, tx)?;
                self.metrics.icmp_echo_replies.inc();
                return Ok(());
            }
            Icmpv6Message::EchoReply(_) => {
                debug!(%src, "ICMPv6 echo reply received");
                return Ok(());
            }
            Icmpv6Message::RouterAdvertisement(_) => {
                trace!(%src, "ignoring router advertisement");
                return Ok(());
            }
            Icmpv6Message::Other { icmp_type, code, .. } => {
                debug!(icmp_type, code, %src, "unhandled ICMPv6 message");
                return Ok(());
            }
        };
        self.metrics.set_ndp_table_size(self.ndp.len());

        match action {
            NdpAction::SendNeighborAdvertisement { dst, na } => {
                let na_src = local
                    .as_ref()
                    .and_then(|c| c.source_for(dst))
                    .unwrap_or(na.target_addr);
                debug!(%id, target = %na.target_addr, %dst, "sending neighbor advertisement");
                self.send_ndp(tx, id, eth.src_mac, na_src, dst, &Icmpv6Message::NeighborAdvertisement(na))?;
                self.metrics.neighbor_advertisements_sent.inc();
            }
            NdpAction::SendRouterAdvertisement { dst, ra } => {
                let ra_src = local
                    .as_ref()
                    .and_then(|c| c.link_local().or_else(|| c.source_for(dst)))
                    .ok_or(Error::NoRoute(IpAddr::V6(dst)))?;
                debug!(%id, %dst, "sending router advertisement");
                self.send_ndp(tx, id, eth.src_mac, ra_src, dst, &Icmpv6Message::RouterAdvertisement(ra))?;
                self.metrics.router_advertisements_sent.inc();
            }
            NdpAction::TableUpdated => {
                trace!(%src, "neighbor cache updated");
            }
            NdpAction::None => {}
        }
        Ok(())
    }

    /// Send an NDP message on `id` with hop limit 255.
    ///
    /// Multicast destinations map to their 33:33 group MAC; unicast ones use
    /// the neighbor cache and fall back to the soliciting frame's source.
    fn send_ndp(
        &self,
        tx: &mut dyn Transmit,
        id: DeviceId,
        fallback_mac: MacAddr,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        message: &Icmpv6Message,
    ) -> Result<()> {
        let bytes = message.to_bytes(src, dst);
        let header = Ipv6Header::new(src, dst, ip_proto::ICMPV6, NDP_HOP_LIMIT, bytes.len());
        let dst_mac = if dst.is_multicast() {
            MacAddr::for_ipv6_multicast(dst)
        } else {
            self.ndp.lookup(&dst).map_or(fallback_mac, |n| n.mac)
        };
        self.send_ethernet(tx, id, dst_mac, EtherType::Ipv6, &header.encapsulate(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use crate::dataplane::{DeviceId, NetDevice, RouterState, TxQueue};
    use crate::protocol::ethernet::{self, EthernetHeader, FrameBuilder};
    use crate::protocol::icmp::{Echo, IcmpType};
    use crate::protocol::icmpv6::{Icmpv6Message, NdpOption, NeighborSolicitation};
    use crate::protocol::ipv4::Ipv4Header;
    use crate::protocol::ipv6::{self, Ipv6Header};
    use crate::protocol::{ip_proto, EtherType, MacAddr};
    use std::net::{Ipv4Addr, Ipv6Addr};

    const ROUTER_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);
    const HOST_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x10]);

    fn v6(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    fn make_router() -> RouterState {
        RouterState::new(vec![NetDevice::new("eth0", ROUTER_MAC)
            .with_ipv4(Ipv4Addr::new(192, 168, 1, 1), 24)
            .with_ipv6(v6("fe80::1"), 64)
            .with_ipv6(v6("2001:db8:1::1"), 64)])
    }

    fn frame(dst_mac: MacAddr, ethertype: EtherType, packet: &[u8]) -> Vec<u8> {
        FrameBuilder::new()
            .header(&EthernetHeader {
                dst_mac,
                src_mac: HOST_MAC,
                ethertype: ethertype as u16,
            })
            .payload(packet)
            .build()
    }

    fn icmpv6_frame(src: Ipv6Addr, dst: Ipv6Addr, hop_limit: u8, message: &Icmpv6Message) -> Vec<u8> {
        let bytes = message.to_bytes(src, dst);
        let header = Ipv6Header::new(src, dst, ip_proto::ICMPV6, hop_limit, bytes.len());
        let dst_mac = if dst.is_multicast() {
            MacAddr::for_ipv6_multicast(dst)
        } else {
            ROUTER_MAC
        };
        frame(dst_mac, EtherType::Ipv6, &header.encapsulate(&bytes))
    }

    fn echo() -> Echo {
        Echo {
            identifier: 0x1234,
            sequence: 1,
            data: b"ping".to_vec(),
        }
    }

    #[test]
    fn test_icmp_echo_request_answered() {
        let mut router = make_router();
        let host = Ipv4Addr::new(192, 168, 1, 10);
        let message = echo().to_message(IcmpType::EchoRequest);
        let ip = Ipv4Header::new(host, Ipv4Addr::new(192, 168, 1, 1), ip_proto::ICMP, message.len());
        let mut tx = TxQueue::new();

        router
            .process_frame(DeviceId(0), &frame(ROUTER_MAC, EtherType::Ipv4, &ip.encapsulate(&message)), &mut tx)
            .unwrap();

        assert_eq!(tx.len(), 1);
        let (_, out) = &tx.frames()[0];
        assert_eq!(EthernetHeader::parse(out).unwrap().dst_mac, HOST_MAC);
        let reply_ip = Ipv4Header::parse(&out[ethernet::HEADER_SIZE..]).unwrap();
        assert_eq!(reply_ip.src_addr, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(reply_ip.dst_addr, host);
        let reply = reply_ip.payload(&out[ethernet::HEADER_SIZE..]);
        assert_eq!(reply[0], IcmpType::EchoReply as u8);
        assert_eq!(Echo::parse(reply).unwrap(), echo());
        assert_eq!(router.metrics().icmp_echo_replies.get(), 1);
    }

    #[test]
    fn test_neighbor_solicitation_answered() {
        let mut router = make_router();
        let host = v6("2001:db8:1::10");
        let target = v6("2001:db8:1::1");
        let ns = Icmpv6Message::NeighborSolicitation(NeighborSolicitation {
            target_addr: target,
            options: vec![NdpOption::SourceLinkLayer(HOST_MAC)],
        });
        let mut tx = TxQueue::new();

        router
            .process_frame(DeviceId(0), &icmpv6_frame(host, ipv6::solicited_node(target), 255, &ns), &mut tx)
            .unwrap();

        assert_eq!(router.ndp().lookup(&host).unwrap().mac, HOST_MAC);
        assert_eq!(tx.len(), 1);
        let (_, out) = &tx.frames()[0];
        assert_eq!(EthernetHeader::parse(out).unwrap().dst_mac, HOST_MAC);

        let packet = &out[ethernet::HEADER_SIZE..];
        let ip = Ipv6Header::parse(packet).unwrap();
        assert_eq!(ip.hop_limit, 255);
        assert_eq!(ip.dst_addr, host);
        assert_eq!(ip.src_addr, target);
        match Icmpv6Message::parse(ip.payload(packet)).unwrap() {
            Icmpv6Message::NeighborAdvertisement(na) => {
                assert_eq!(na.target_addr, target);
                assert!(na.solicited_flag);
                assert_eq!(na.target_link_addr(), Some(ROUTER_MAC));
            }
            other => panic!("expected NA, got {:?}", other),
        }
        assert_eq!(router.metrics().neighbor_advertisements_sent.get(), 1);
    }

    #[test]
    fn test_router_solicitation_answered() {
        let mut router = make_router();
        let rs = Icmpv6Message::RouterSolicitation {
            options: vec![NdpOption::SourceLinkLayer(HOST_MAC)],
        };
        let mut tx = TxQueue::new();

        router
            .process_frame(
                DeviceId(0),
                &icmpv6_frame(v6("fe80::10"), v6("ff02::2"), 255, &rs),
                &mut tx,
            )
            .unwrap();

        assert_eq!(tx.len(), 1);
        let packet = &tx.frames()[0].1[ethernet::HEADER_SIZE..];
        let ip = Ipv6Header::parse(packet).unwrap();
        assert_eq!(ip.src_addr, v6("fe80::1"));
        match Icmpv6Message::parse(ip.payload(packet)).unwrap() {
            Icmpv6Message::RouterAdvertisement(_) => {}
            other => panic!("expected RA, got {:?}", other),
        }
        assert_eq!(router.metrics().router_advertisements_sent.get(), 1);
    }

    #[test]
    fn test_icmpv6_echo_answered() {
        let mut router = make_router();
        let host = v6("2001:db8:1::10");
        router.ndp_mut().upsert(host, HOST_MAC, DeviceId(0));
        let request = Icmpv6Message::EchoRequest(echo());
        let mut tx = TxQueue::new();

        router
            .process_frame(DeviceId(0), &icmpv6_frame(host, v6("2001:db8:1::1"), 64, &request), &mut tx)
            .unwrap();

        assert_eq!(tx.len(), 1);
        let packet = &tx.frames()[0].1[ethernet::HEADER_SIZE..];
        let ip = Ipv6Header::parse(packet).unwrap();
        assert_eq!(ip.dst_addr, host);
        assert_eq!(
            Icmpv6Message::parse(ip.payload(packet)).unwrap(),
            Icmpv6Message::EchoReply(echo())
        );
    }

    #[test]
    fn test_bad_icmpv6_checksum_dropped() {
        let mut router = make_router();
        let host = v6("2001:db8:1::10");
        let mut bytes = Icmpv6Message::EchoRequest(echo()).to_bytes(host, v6("2001:db8:1::1"));
        bytes[2] ^= 0xff;
        let header = Ipv6Header::new(host, v6("2001:db8:1::1"), ip_proto::ICMPV6, 64, bytes.len());
        let mut tx = TxQueue::new();

        router
            .process_frame(DeviceId(0), &frame(ROUTER_MAC, EtherType::Ipv6, &header.encapsulate(&bytes)), &mut tx)
            .unwrap();

        assert!(tx.is_empty());
        assert_eq!(router.metrics().packets_dropped.get(), 1);
    }
}
