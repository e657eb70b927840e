//! NAT64 ping from an IPv6-only host to an IPv4 server
//!
//! Topology:
//! ```text
//! host (2001:db8:1::10) -- lan 2001:db8:1::1 -- router -- wan 203.0.113.1 -- server (203.0.113.2)
//!                           [nat64 on lan]
//! ```

use crate::common::*;
use kestrel::dataplane::DeviceId;
use kestrel::protocol::icmp::{Echo, IcmpType};
use kestrel::protocol::icmpv6::Icmpv6Message;
use kestrel::protocol::ipv4::Ipv4Header;
use kestrel::protocol::ip_proto;

const CONFIG: &str = r#"
[interfaces.lan]
ipv6 = ["fe80::1/64", "2001:db8:1::1/64"]

[interfaces.wan]
address = "203.0.113.1/24"

[nat64]
inside = "lan"
"#;

const LAN: DeviceId = DeviceId(0);
const WAN: DeviceId = DeviceId(1);

fn echo() -> Echo {
    Echo {
        identifier: 0x4242,
        sequence: 1,
        data: b"nat64 ping".to_vec(),
    }
}

#[test]
fn test_echo_round_trip() {
    let host = v6("2001:db8:1::10");
    let mapped = v6("64:ff9b::cb00:7102");
    let server = v4(203, 0, 113, 2);

    let mut router = router_from_toml(CONFIG);
    router.arp_mut().upsert(server, PEER_MAC, WAN);
    router.ndp_mut().upsert(host, HOST_MAC, LAN);

    let request = Icmpv6Message::EchoRequest(echo());
    let tx = exchange(
        &mut router,
        LAN,
        &icmpv6_frame(router_mac(0), HOST_MAC, host, mapped, 64, &request),
    );

    let (device, eth, packet) = single(&tx);
    assert_eq!(device, WAN);
    assert_eq!(eth.dst_mac, PEER_MAC);
    let (out, body) = parse_ipv4(&packet);
    assert_eq!(out.src_addr, v4(203, 0, 113, 1));
    assert_eq!(out.dst_addr, server);
    assert_eq!(out.protocol, ip_proto::ICMP);
    assert_eq!(out.ttl, 63);
    assert_eq!(body[0], IcmpType::EchoRequest as u8);
    assert_eq!(Echo::parse(&body).unwrap(), echo());

    // The server answers the translated request
    let reply = echo().to_message(IcmpType::EchoReply);
    let header = Ipv4Header::new(server, v4(203, 0, 113, 1), ip_proto::ICMP, reply.len());
    let tx = exchange(&mut router, WAN, &ipv4_frame(router_mac(1), PEER_MAC, &header, &reply));

    let (device, eth, packet) = single(&tx);
    assert_eq!(device, LAN);
    assert_eq!(eth.dst_mac, HOST_MAC);
    let (v6_header, message) = parse_icmpv6(&packet);
    assert_eq!(v6_header.src_addr, mapped);
    assert_eq!(v6_header.dst_addr, host);
    assert_eq!(message, Icmpv6Message::EchoReply(echo()));

    assert_eq!(router.metrics().nat64_translations.get(), 2);
}

#[test]
fn test_reply_without_session_dropped() {
    let server = v4(203, 0, 113, 2);
    let mut router = router_from_toml(CONFIG);

    let reply = echo().to_message(IcmpType::EchoReply);
    let header = Ipv4Header::new(server, v4(203, 0, 113, 1), ip_proto::ICMP, reply.len());
    let tx = exchange(&mut router, WAN, &ipv4_frame(router_mac(1), PEER_MAC, &header, &reply));

    assert!(tx.is_empty());
    assert_eq!(router.metrics().packets_dropped.get(), 1);
}
