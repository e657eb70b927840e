//! Frame builders and assertions shared by the scenarios

use kestrel::config::Config;
use kestrel::dataplane::{DeviceId, RouterState, TxQueue};
use kestrel::protocol::ethernet::{self, EthernetHeader, FrameBuilder};
use kestrel::protocol::icmpv6::Icmpv6Message;
use kestrel::protocol::ipv4::Ipv4Header;
use kestrel::protocol::ipv6::Ipv6Header;
use kestrel::protocol::{ip_proto, EtherType, MacAddr};
use std::net::{Ipv4Addr, Ipv6Addr};

pub const HOST_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x10]);
pub const PEER_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x20]);

/// Build a router from TOML, assigning 02:00:00:00:00:0N to the Nth
/// interface (1-based, name order) unless the config pins a MAC.
pub fn router_from_toml(toml: &str) -> RouterState {
    let config: Config = toml::from_str(toml).unwrap();
    let validation = kestrel::config::validate(&config);
    assert!(!validation.has_errors(), "{:?}", validation.errors);

    let names: Vec<String> = config.interfaces.keys().cloned().collect();
    RouterState::from_config(&config, |name| {
        let index = names.iter().position(|n| n == name).unwrap();
        Ok(router_mac(index))
    })
    .unwrap()
}

pub fn router_mac(index: usize) -> MacAddr {
    MacAddr([0x02, 0, 0, 0, 0, index as u8 + 1])
}

pub fn frame(dst_mac: MacAddr, src_mac: MacAddr, ethertype: EtherType, payload: &[u8]) -> Vec<u8> {
    FrameBuilder::new()
        .header(&EthernetHeader {
            dst_mac,
            src_mac,
            ethertype: ethertype as u16,
        })
        .payload(payload)
        .build()
}

pub fn ipv4_frame(dst_mac: MacAddr, src_mac: MacAddr, header: &Ipv4Header, payload: &[u8]) -> Vec<u8> {
    frame(dst_mac, src_mac, EtherType::Ipv4, &header.encapsulate(payload))
}

pub fn icmpv6_frame(
    dst_mac: MacAddr,
    src_mac: MacAddr,
    src: Ipv6Addr,
    dst: Ipv6Addr,
    hop_limit: u8,
    message: &Icmpv6Message,
) -> Vec<u8> {
    let bytes = message.to_bytes(src, dst);
    let header = Ipv6Header::new(src, dst, ip_proto::ICMPV6, hop_limit, bytes.len());
    frame(dst_mac, src_mac, EtherType::Ipv6, &header.encapsulate(&bytes))
}

/// Feed one frame and return what the router transmitted.
pub fn exchange(router: &mut RouterState, device: DeviceId, frame: &[u8]) -> TxQueue {
    let mut tx = TxQueue::new();
    router.process_frame(device, frame, &mut tx).unwrap();
    tx
}

/// The single frame in `tx`, split into device, Ethernet header and payload
pub fn single(tx: &TxQueue) -> (DeviceId, EthernetHeader, Vec<u8>) {
    assert_eq!(tx.len(), 1, "expected exactly one frame");
    let (device, frame) = &tx.frames()[0];
    (
        *device,
        EthernetHeader::parse(frame).unwrap(),
        frame[ethernet::HEADER_SIZE..].to_vec(),
    )
}

pub fn parse_ipv4(packet: &[u8]) -> (Ipv4Header, Vec<u8>) {
    let header = Ipv4Header::parse(packet).unwrap();
    assert!(header.checksum_valid(), "IPv4 header checksum");
    let payload = header.payload(packet).to_vec();
    (header, payload)
}

pub fn parse_icmpv6(packet: &[u8]) -> (Ipv6Header, Icmpv6Message) {
    let header = Ipv6Header::parse(packet).unwrap();
    let message = Icmpv6Message::parse(header.payload(packet)).unwrap();
    (header, message)
}

pub fn v4(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
    Ipv4Addr::new(a, b, c, d)
}

pub fn v6(s: &str) -> Ipv6Addr {
    s.parse().unwrap()
}
