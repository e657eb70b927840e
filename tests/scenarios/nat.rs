//! NAPT round trip
//!
//! Topology:
//! ```text
//! host (192.168.2.2) -- inside 192.168.2.1 -- router -- outside 203.0.113.1 -- server (203.0.113.2)
//! ```

use crate::common::*;
use kestrel::dataplane::{DeviceId, NAT_GLOBAL_PORT_MIN};
use kestrel::protocol::checksum::transport_checksum_v4;
use kestrel::protocol::ipv4::Ipv4Header;
use kestrel::protocol::udp::{build_datagram, UdpHeader};
use kestrel::protocol::ip_proto;

const CONFIG: &str = r#"
[interfaces.inside]
address = "192.168.2.1/24"

[interfaces.outside]
address = "203.0.113.1/24"

[[nat]]
inside = "inside"
outside = "outside"
"#;

const INSIDE: DeviceId = DeviceId(0);
const OUTSIDE: DeviceId = DeviceId(1);

fn udp(src: std::net::Ipv4Addr, sport: u16, dst: std::net::Ipv4Addr, dport: u16) -> (Ipv4Header, Vec<u8>) {
    let datagram = build_datagram(src, dst, sport, dport, b"query");
    (Ipv4Header::new(src, dst, ip_proto::UDP, datagram.len()), datagram)
}

fn assert_udp_checksum(header: &Ipv4Header, datagram: &[u8]) {
    assert_eq!(
        transport_checksum_v4(header.src_addr, header.dst_addr, ip_proto::UDP, datagram),
        0,
        "UDP checksum"
    );
}

#[test]
fn test_udp_round_trip() {
    let host = v4(192, 168, 2, 2);
    let server = v4(203, 0, 113, 2);
    let global = v4(203, 0, 113, 1);

    let mut router = router_from_toml(CONFIG);
    router.arp_mut().upsert(server, PEER_MAC, OUTSIDE);

    // host -> server leaves with the outside address and a pool port
    let (header, datagram) = udp(host, 11111, server, 53);
    let tx = exchange(&mut router, INSIDE, &ipv4_frame(router_mac(0), HOST_MAC, &header, &datagram));

    let (device, eth, packet) = single(&tx);
    assert_eq!(device, OUTSIDE);
    assert_eq!(eth.dst_mac, PEER_MAC);
    let (out, out_datagram) = parse_ipv4(&packet);
    assert_eq!(out.src_addr, global);
    assert_eq!(out.dst_addr, server);
    assert_eq!(out.ttl, 63);
    let out_udp = UdpHeader::parse(&out_datagram).unwrap();
    assert_eq!(out_udp.src_port, NAT_GLOBAL_PORT_MIN);
    assert_eq!(out_udp.dst_port, 53);
    assert_udp_checksum(&out, &out_datagram);

    // server -> global:port is restored to host:11111
    let (reply, reply_datagram) = udp(server, 53, global, out_udp.src_port);
    let tx = exchange(&mut router, OUTSIDE, &ipv4_frame(router_mac(1), PEER_MAC, &reply, &reply_datagram));

    let (device, eth, packet) = single(&tx);
    assert_eq!(device, INSIDE);
    assert_eq!(eth.dst_mac, HOST_MAC);
    let (back, back_datagram) = parse_ipv4(&packet);
    assert_eq!(back.src_addr, server);
    assert_eq!(back.dst_addr, host);
    let back_udp = UdpHeader::parse(&back_datagram).unwrap();
    assert_eq!(back_udp.src_port, 53);
    assert_eq!(back_udp.dst_port, 11111);
    assert_udp_checksum(&back, &back_datagram);

    assert_eq!(router.metrics().nat_translations.get(), 2);
}

#[test]
fn test_same_flow_reuses_mapping() {
    let server = v4(203, 0, 113, 2);
    let mut router = router_from_toml(CONFIG);
    router.arp_mut().upsert(server, PEER_MAC, OUTSIDE);

    let mut ports = Vec::new();
    for (host, port) in [(v4(192, 168, 2, 2), 11111), (v4(192, 168, 2, 2), 11111), (v4(192, 168, 2, 3), 11111)] {
        let (header, datagram) = udp(host, port, server, 53);
        let tx = exchange(&mut router, INSIDE, &ipv4_frame(router_mac(0), HOST_MAC, &header, &datagram));
        let (_, _, packet) = single(&tx);
        let (_, out_datagram) = parse_ipv4(&packet);
        ports.push(UdpHeader::parse(&out_datagram).unwrap().src_port);
    }

    assert_eq!(ports[0], ports[1]);
    assert_ne!(ports[0], ports[2]);
}

#[test]
fn test_unknown_inbound_port_dropped() {
    let mut router = router_from_toml(CONFIG);
    let (header, datagram) = udp(v4(203, 0, 113, 2), 53, v4(203, 0, 113, 1), 30000);

    let tx = exchange(&mut router, OUTSIDE, &ipv4_frame(router_mac(1), PEER_MAC, &header, &datagram));

    assert!(tx.is_empty());
    assert_eq!(router.metrics().packets_dropped.get(), 1);
}

#[test]
fn test_explicit_outside_address_round_trip() {
    const EXPLICIT: &str = r#"
[interfaces.inside]
address = "192.168.2.1/24"

[interfaces.outside]
address = "203.0.113.5/24"

[[nat]]
inside = "inside"
outside = "outside"
outside_address = "203.0.113.1"
"#;
    let host = v4(192, 168, 2, 2);
    let server = v4(203, 0, 113, 2);
    let global = v4(203, 0, 113, 1);

    let mut router = router_from_toml(EXPLICIT);
    router.arp_mut().upsert(server, PEER_MAC, OUTSIDE);

    let (header, datagram) = udp(host, 11111, server, 53);
    let tx = exchange(&mut router, INSIDE, &ipv4_frame(router_mac(0), HOST_MAC, &header, &datagram));
    let (device, _, packet) = single(&tx);
    assert_eq!(device, OUTSIDE);
    let (out, out_datagram) = parse_ipv4(&packet);
    assert_eq!(out.src_addr, global);
    let out_udp = UdpHeader::parse(&out_datagram).unwrap();

    // the global address lives on no interface but still terminates here
    let (reply, reply_datagram) = udp(server, 53, global, out_udp.src_port);
    let tx = exchange(&mut router, OUTSIDE, &ipv4_frame(router_mac(1), PEER_MAC, &reply, &reply_datagram));

    let (device, eth, packet) = single(&tx);
    assert_eq!(device, INSIDE);
    assert_eq!(eth.dst_mac, HOST_MAC);
    let (back, back_datagram) = parse_ipv4(&packet);
    assert_eq!(back.dst_addr, host);
    let back_udp = UdpHeader::parse(&back_datagram).unwrap();
    assert_eq!(back_udp.dst_port, 11111);
    assert_udp_checksum(&back, &back_datagram);
}
