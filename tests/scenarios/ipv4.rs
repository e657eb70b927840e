//! ARP, IPv4 forwarding and ICMP echo
//!
//! Topology:
//! ```text
//! host (192.168.1.2) -- lan 192.168.1.1 -- router -- wan 192.168.0.1 -- router2 (192.168.0.2)
//!                                                                         |
//!                                                                   192.168.2.0/24
//! ```

use crate::common::*;
use kestrel::dataplane::{DeviceId, RouteEntry};
use kestrel::protocol::arp::{ArpOp, ArpPacket};
use kestrel::protocol::icmp::{Echo, IcmpType};
use kestrel::protocol::ipv4::Ipv4Header;
use kestrel::protocol::{ip_proto, EtherType, MacAddr};

const CONFIG: &str = r#"
[interfaces.lan]
address = "192.168.1.1/24"

[interfaces.wan]
address = "192.168.0.1/24"

[[routes]]
destination = "192.168.2.0/24"
gateway = "192.168.0.2"
"#;

const LAN: DeviceId = DeviceId(0);
const WAN: DeviceId = DeviceId(1);

fn arp_frame(packet: &ArpPacket, dst_mac: MacAddr) -> Vec<u8> {
    frame(dst_mac, packet.sender_mac, EtherType::Arp, &packet.to_bytes())
}

fn udp_packet(src: std::net::Ipv4Addr, dst: std::net::Ipv4Addr, ttl: u8) -> (Ipv4Header, Vec<u8>) {
    let payload = kestrel::protocol::udp::build_datagram(src, dst, 40000, 7, b"hello");
    let mut header = Ipv4Header::new(src, dst, ip_proto::UDP, payload.len());
    header.ttl = ttl;
    header.update_checksum();
    (header, payload)
}

#[test]
fn test_arp_request_for_router_answered() {
    let mut router = router_from_toml(CONFIG);
    let request = ArpPacket::request(HOST_MAC, v4(192, 168, 1, 2), v4(192, 168, 1, 1));

    let tx = exchange(&mut router, LAN, &arp_frame(&request, MacAddr::BROADCAST));

    let (device, eth, payload) = single(&tx);
    assert_eq!(device, LAN);
    assert_eq!(eth.dst_mac, HOST_MAC);
    assert_eq!(eth.src_mac, router_mac(0));

    let reply = ArpPacket::parse(&payload).unwrap();
    assert_eq!(reply.operation, ArpOp::Reply);
    assert_eq!(reply.sender_mac, router_mac(0));
    assert_eq!(reply.sender_ip, v4(192, 168, 1, 1));
    assert_eq!(reply.target_mac, HOST_MAC);
    assert_eq!(reply.target_ip, v4(192, 168, 1, 2));

    assert_eq!(router.arp().lookup(&v4(192, 168, 1, 2)).unwrap().mac, HOST_MAC);
}

#[test]
fn test_forward_resolves_next_hop_then_delivers() {
    let mut router = router_from_toml(CONFIG);
    let (header, payload) = udp_packet(v4(192, 168, 1, 2), v4(192, 168, 2, 5), 64);
    let packet = ipv4_frame(router_mac(0), HOST_MAC, &header, &payload);

    // Gateway unknown: an ARP request goes out and the packet is dropped
    let tx = exchange(&mut router, LAN, &packet);
    let (device, eth, arp) = single(&tx);
    assert_eq!(device, WAN);
    assert!(eth.dst_mac.is_broadcast());
    let request = ArpPacket::parse(&arp).unwrap();
    assert_eq!(request.operation, ArpOp::Request);
    assert_eq!(request.sender_ip, v4(192, 168, 0, 1));
    assert_eq!(request.target_ip, v4(192, 168, 0, 2));
    assert_eq!(router.metrics().packets_dropped.get(), 1);

    // The gateway answers, and the retransmitted packet is forwarded
    let reply = ArpPacket::reply(PEER_MAC, v4(192, 168, 0, 2), router_mac(1), v4(192, 168, 0, 1));
    assert!(exchange(&mut router, WAN, &arp_frame(&reply, router_mac(1))).is_empty());

    let tx = exchange(&mut router, LAN, &packet);
    let (device, eth, forwarded) = single(&tx);
    assert_eq!(device, WAN);
    assert_eq!(eth.dst_mac, PEER_MAC);
    assert_eq!(eth.src_mac, router_mac(1));

    let (out, out_payload) = parse_ipv4(&forwarded);
    assert_eq!(out.ttl, 63);
    assert_eq!(out.src_addr, v4(192, 168, 1, 2));
    assert_eq!(out.dst_addr, v4(192, 168, 2, 5));
    assert_eq!(out_payload, payload);
    assert_eq!(router.metrics().packets_forwarded.get(), 1);
}

#[test]
fn test_expiring_ttl_dropped() {
    let mut router = router_from_toml(CONFIG);
    router.arp_mut().upsert(v4(192, 168, 0, 2), PEER_MAC, WAN);
    let (header, payload) = udp_packet(v4(192, 168, 1, 2), v4(192, 168, 2, 5), 1);

    let tx = exchange(&mut router, LAN, &ipv4_frame(router_mac(0), HOST_MAC, &header, &payload));

    assert!(tx.is_empty());
    assert_eq!(router.metrics().packets_dropped.get(), 1);
}

#[test]
fn test_longest_prefix_wins() {
    let mut router = router_from_toml(CONFIG);
    router.add_route_v4(v4(192, 168, 2, 128), 25, RouteEntry::Connected(LAN));
    router.arp_mut().upsert(v4(192, 168, 0, 2), PEER_MAC, WAN);
    router.arp_mut().upsert(v4(192, 168, 2, 200), HOST_MAC, LAN);

    let (header, payload) = udp_packet(v4(192, 168, 0, 2), v4(192, 168, 2, 200), 64);
    let tx = exchange(&mut router, WAN, &ipv4_frame(router_mac(1), PEER_MAC, &header, &payload));
    assert_eq!(single(&tx).0, LAN);

    let (header, payload) = udp_packet(v4(192, 168, 1, 2), v4(192, 168, 2, 100), 64);
    let tx = exchange(&mut router, LAN, &ipv4_frame(router_mac(0), HOST_MAC, &header, &payload));
    assert_eq!(single(&tx).0, WAN);
}

#[test]
fn test_ping_router_interface() {
    let mut router = router_from_toml(CONFIG);
    let echo = Echo {
        identifier: 7,
        sequence: 3,
        data: b"abcdefgh".to_vec(),
    };
    let message = echo.to_message(IcmpType::EchoRequest);
    let header = Ipv4Header::new(v4(192, 168, 1, 2), v4(192, 168, 0, 1), ip_proto::ICMP, message.len());

    let tx = exchange(&mut router, LAN, &ipv4_frame(router_mac(0), HOST_MAC, &header, &message));

    let (device, eth, packet) = single(&tx);
    assert_eq!(device, LAN);
    assert_eq!(eth.dst_mac, HOST_MAC);
    let (reply, body) = parse_ipv4(&packet);
    // Replies come from the address that was pinged
    assert_eq!(reply.src_addr, v4(192, 168, 0, 1));
    assert_eq!(reply.dst_addr, v4(192, 168, 1, 2));
    assert_eq!(reply.identification, 0xf80c);
    assert_eq!(reply.ttl, 64);
    assert_eq!(body[0], IcmpType::EchoReply as u8);
    assert_eq!(Echo::parse(&body).unwrap(), echo);
    assert_eq!(router.metrics().icmp_echo_replies.get(), 1);
}
