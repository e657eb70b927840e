//! NDP and IPv6 forwarding
//!
//! Topology:
//! ```text
//! host (2001:db8:1::10) -- lan 2001:db8:1::1 -- router -- wan 2001:db8:2::1 -- peer (2001:db8:2::2)
//! ```

use crate::common::*;
use kestrel::dataplane::DeviceId;
use kestrel::protocol::icmpv6::{Icmpv6Message, NdpOption, NeighborAdvertisement, NeighborSolicitation};
use kestrel::protocol::ipv6::{solicited_node, Ipv6Header, ALL_NODES};
use kestrel::protocol::{ip_proto, EtherType, MacAddr};

const CONFIG: &str = r#"
[interfaces.lan]
ipv6 = ["fe80::1/64", "2001:db8:1::1/64"]

[interfaces.wan]
ipv6 = ["fe80::2/64", "2001:db8:2::1/64"]
"#;

const LAN: DeviceId = DeviceId(0);
const WAN: DeviceId = DeviceId(1);

#[test]
fn test_neighbor_solicitation_answered() {
    let mut router = router_from_toml(CONFIG);
    let host = v6("2001:db8:1::10");
    let target = v6("2001:db8:1::1");
    let group = solicited_node(target);
    let ns = Icmpv6Message::NeighborSolicitation(NeighborSolicitation {
        target_addr: target,
        options: vec![NdpOption::SourceLinkLayer(HOST_MAC)],
    });

    let tx = exchange(
        &mut router,
        LAN,
        &icmpv6_frame(MacAddr::for_ipv6_multicast(group), HOST_MAC, host, group, 255, &ns),
    );

    let (device, eth, packet) = single(&tx);
    assert_eq!(device, LAN);
    assert_eq!(eth.dst_mac, HOST_MAC);
    let (header, message) = parse_icmpv6(&packet);
    assert_eq!(header.hop_limit, 255);
    assert_eq!(header.dst_addr, host);
    match message {
        Icmpv6Message::NeighborAdvertisement(na) => {
            assert_eq!(na.target_addr, target);
            assert!(na.solicited_flag);
            assert!(na.override_flag);
            assert_eq!(na.target_link_addr(), Some(router_mac(0)));
        }
        other => panic!("expected NA, got {:?}", other),
    }
    assert_eq!(router.ndp().lookup(&host).unwrap().mac, HOST_MAC);
}

#[test]
fn test_solicitation_for_other_target_ignored() {
    let mut router = router_from_toml(CONFIG);
    let target = v6("2001:db8:1::99");
    let group = solicited_node(target);
    let ns = Icmpv6Message::NeighborSolicitation(NeighborSolicitation {
        target_addr: target,
        options: vec![NdpOption::SourceLinkLayer(HOST_MAC)],
    });

    let tx = exchange(
        &mut router,
        LAN,
        &icmpv6_frame(MacAddr::for_ipv6_multicast(group), HOST_MAC, v6("2001:db8:1::10"), group, 255, &ns),
    );

    assert!(tx.is_empty());
}

#[test]
fn test_router_solicitation_gets_prefix() {
    let mut router = router_from_toml(CONFIG);
    let rs = Icmpv6Message::RouterSolicitation { options: Vec::new() };
    let all_routers = v6("ff02::2");

    // Unspecified source: the advertisement goes to all nodes
    let tx = exchange(
        &mut router,
        LAN,
        &icmpv6_frame(MacAddr::for_ipv6_multicast(all_routers), HOST_MAC, v6("::"), all_routers, 255, &rs),
    );

    let (device, eth, packet) = single(&tx);
    assert_eq!(device, LAN);
    assert_eq!(eth.dst_mac, MacAddr::for_ipv6_multicast(ALL_NODES));
    let (header, message) = parse_icmpv6(&packet);
    assert_eq!(header.src_addr, v6("fe80::1"));
    assert_eq!(header.dst_addr, ALL_NODES);
    assert_eq!(header.hop_limit, 255);
    match message {
        Icmpv6Message::RouterAdvertisement(ra) => {
            let prefix = ra.options.iter().find_map(|o| match o {
                NdpOption::PrefixInformation(p) => Some(*p),
                _ => None,
            });
            let prefix = prefix.expect("prefix information option");
            assert_eq!(prefix.prefix, v6("2001:db8:1::"));
            assert_eq!(prefix.prefix_len, 64);
        }
        other => panic!("expected RA, got {:?}", other),
    }
}

#[test]
fn test_forward_after_neighbor_advertisement() {
    let mut router = router_from_toml(CONFIG);
    let peer = v6("2001:db8:2::2");
    let payload = [0xabu8; 16];
    let header = Ipv6Header::new(v6("2001:db8:1::10"), peer, 253, 64, payload.len());
    let packet = frame(router_mac(0), HOST_MAC, EtherType::Ipv6, &header.encapsulate(&payload));

    // Unknown neighbor: a solicitation goes out on wan
    let tx = exchange(&mut router, LAN, &packet);
    let (device, eth, ns_packet) = single(&tx);
    assert_eq!(device, WAN);
    assert_eq!(eth.dst_mac, MacAddr::solicited_node(peer));
    match parse_icmpv6(&ns_packet).1 {
        Icmpv6Message::NeighborSolicitation(ns) => assert_eq!(ns.target_addr, peer),
        other => panic!("expected NS, got {:?}", other),
    }

    // The peer advertises itself
    let na = Icmpv6Message::NeighborAdvertisement(NeighborAdvertisement::solicited_reply(peer, PEER_MAC));
    let tx = exchange(
        &mut router,
        WAN,
        &icmpv6_frame(router_mac(1), PEER_MAC, peer, v6("2001:db8:2::1"), 255, &na),
    );
    assert!(tx.is_empty());

    let tx = exchange(&mut router, LAN, &packet);
    let (device, eth, forwarded) = single(&tx);
    assert_eq!(device, WAN);
    assert_eq!(eth.dst_mac, PEER_MAC);
    let out = Ipv6Header::parse(&forwarded).unwrap();
    assert_eq!(out.hop_limit, 63);
    assert_eq!(out.next_header, 253);
    assert_eq!(out.payload(&forwarded), &payload);
}

#[test]
fn test_ping6_router() {
    let mut router = router_from_toml(CONFIG);
    let host = v6("fe80::10");
    router.ndp_mut().upsert(host, HOST_MAC, LAN);
    let echo = kestrel::protocol::icmp::Echo {
        identifier: 1,
        sequence: 9,
        data: vec![1, 2, 3],
    };
    let request = Icmpv6Message::EchoRequest(echo.clone());

    let tx = exchange(
        &mut router,
        LAN,
        &icmpv6_frame(router_mac(0), HOST_MAC, host, v6("fe80::1"), 64, &request),
    );

    let (device, eth, packet) = single(&tx);
    assert_eq!(device, LAN);
    assert_eq!(eth.dst_mac, HOST_MAC);
    let (header, message) = parse_icmpv6(&packet);
    assert_eq!(header.next_header, ip_proto::ICMPV6);
    assert_eq!(header.src_addr, v6("fe80::1"));
    assert_eq!(message, Icmpv6Message::EchoReply(echo));
}
