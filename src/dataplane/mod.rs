//! Data plane components
//!
//! Handles packet processing: parsing, forwarding decisions, address
//! resolution, NAT and transmission.

mod arp_processor;
mod device;
mod forwarder;
mod icmp_handler;
mod ipv6_forwarder;
mod napt;
mod nat64;
mod ndp_processor;
mod neighbor_table;
mod router;
mod routing;

pub use arp_processor::{process_arp, ArpAction};
pub use device::{DeviceId, Ipv4Config, Ipv6Config, Ipv6Prefix, NetDevice, Transmit, TxQueue};
pub use napt::{
    NaptProtocol, NaptTable, NatDevice, NatDirection, NatEntry, NAT_GLOBAL_PORT_MAX,
    NAT_GLOBAL_PORT_MIN,
};
pub use nat64::{translate_4to6, translate_6to4, Nat64Entry, Nat64Table, Translated4};
pub use ndp_processor::{
    process_neighbor_advertisement, process_neighbor_solicitation, process_router_solicitation,
    NdpAction,
};
pub use neighbor_table::{ArpCache, Neighbor, NeighborCache, ResolutionCache};
pub use router::RouterState;
pub use routing::{Ipv4RoutingTable, Ipv6RoutingTable, PrefixBits, RadixTrie, RouteEntry};
