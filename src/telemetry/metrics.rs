//! Metrics collection for packet statistics.
//!
//! Atomic counters for router-wide events plus one [`InterfaceStats`] per
//! device. The device set is fixed at startup, so the per-device table is
//! a plain slice indexed by [`DeviceId`].

use crate::dataplane::DeviceId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-interface statistics.
#[derive(Debug, Default)]
pub struct InterfaceStats {
    pub name: String,
    /// Number of frames received.
    pub rx_packets: Counter,
    /// Number of bytes received.
    pub rx_bytes: Counter,
    /// Number of frames transmitted.
    pub tx_packets: Counter,
    /// Number of bytes transmitted.
    pub tx_bytes: Counter,
    /// Number of transmit errors.
    pub tx_errors: Counter,
}

impl InterfaceStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Records a received frame.
    pub fn record_rx(&self, bytes: usize) {
        self.rx_packets.inc();
        self.rx_bytes.add(bytes as u64);
    }

    /// Records a transmitted frame.
    pub fn record_tx(&self, bytes: usize) {
        self.tx_packets.inc();
        self.tx_bytes.add(bytes as u64);
    }

    pub fn record_tx_error(&self) {
        self.tx_errors.inc();
    }
}

/// Metrics registry for the router.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    interfaces: Vec<InterfaceStats>,

    // Address resolution
    pub arp_requests_sent: Counter,
    pub arp_replies_sent: Counter,
    pub neighbor_solicitations_sent: Counter,
    pub neighbor_advertisements_sent: Counter,
    pub router_advertisements_sent: Counter,

    // Forwarding
    /// Number of packets successfully forwarded.
    pub packets_forwarded: Counter,
    /// Number of packets dropped (no route, TTL expired, NAT failure, ...).
    pub packets_dropped: Counter,

    /// Number of ICMP and ICMPv6 echo replies sent.
    pub icmp_echo_replies: Counter,

    // Translation
    pub nat_translations: Counter,
    pub nat64_translations: Counter,

    // Table size gauges
    pub arp_table_size: AtomicU64,
    pub ndp_table_size: AtomicU64,
    pub route_count: AtomicU64,
}

impl MetricsRegistry {
    /// Creates a registry with one stats block per device, in device order.
    pub fn new<I, S>(device_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            interfaces: device_names.into_iter().map(InterfaceStats::new).collect(),
            ..Self::default()
        }
    }

    pub fn interface(&self, device: DeviceId) -> Option<&InterfaceStats> {
        self.interfaces.get(device.0)
    }

    /// Records a received frame on a device.
    pub fn record_rx(&self, device: DeviceId, bytes: usize) {
        if let Some(stats) = self.interface(device) {
            stats.record_rx(bytes);
        }
    }

    /// Records a transmitted frame on a device.
    pub fn record_tx(&self, device: DeviceId, bytes: usize) {
        if let Some(stats) = self.interface(device) {
            stats.record_tx(bytes);
        }
    }

    pub fn record_tx_error(&self, device: DeviceId) {
        if let Some(stats) = self.interface(device) {
            stats.record_tx_error();
        }
    }

    pub fn set_arp_table_size(&self, size: usize) {
        self.arp_table_size.store(size as u64, Ordering::Relaxed);
    }

    pub fn set_ndp_table_size(&self, size: usize) {
        self.ndp_table_size.store(size as u64, Ordering::Relaxed);
    }

    pub fn set_route_count(&self, count: usize) {
        self.route_count.store(count as u64, Ordering::Relaxed);
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("arp_requests_sent".into(), self.arp_requests_sent.get()),
            ("arp_replies_sent".into(), self.arp_replies_sent.get()),
            (
                "neighbor_solicitations_sent".into(),
                self.neighbor_solicitations_sent.get(),
            ),
            (
                "neighbor_advertisements_sent".into(),
                self.neighbor_advertisements_sent.get(),
            ),
            (
                "router_advertisements_sent".into(),
                self.router_advertisements_sent.get(),
            ),
            ("packets_forwarded".into(), self.packets_forwarded.get()),
            ("packets_dropped".into(), self.packets_dropped.get()),
            ("icmp_echo_replies".into(), self.icmp_echo_replies.get()),
            ("nat_translations".into(), self.nat_translations.get()),
            ("nat64_translations".into(), self.nat64_translations.get()),
            (
                "arp_table_size".into(),
                self.arp_table_size.load(Ordering::Relaxed),
            ),
            (
                "ndp_table_size".into(),
                self.ndp_table_size.load(Ordering::Relaxed),
            ),
            ("route_count".into(), self.route_count.load(Ordering::Relaxed)),
        ];

        for stats in &self.interfaces {
            let name = &stats.name;
            result.push((format!("{}_rx_packets", name), stats.rx_packets.get()));
            result.push((format!("{}_rx_bytes", name), stats.rx_bytes.get()));
            result.push((format!("{}_tx_packets", name), stats.tx_packets.get()));
            result.push((format!("{}_tx_bytes", name), stats.tx_bytes.get()));
            result.push((format!("{}_tx_errors", name), stats.tx_errors.get()));
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(export: &[(String, u64)], key: &str) -> Option<u64> {
        export.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.add(4);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_interface_stats() {
        let stats = InterfaceStats::new("eth0");
        stats.record_rx(100);
        stats.record_rx(60);
        stats.record_tx(42);
        stats.record_tx_error();

        assert_eq!(stats.rx_packets.get(), 2);
        assert_eq!(stats.rx_bytes.get(), 160);
        assert_eq!(stats.tx_packets.get(), 1);
        assert_eq!(stats.tx_bytes.get(), 42);
        assert_eq!(stats.tx_errors.get(), 1);
    }

    #[test]
    fn test_registry_per_device() {
        let registry = MetricsRegistry::new(["eth0", "eth1"]);
        registry.record_rx(DeviceId(1), 64);
        registry.record_tx(DeviceId(0), 98);
        // Unknown devices are ignored
        registry.record_rx(DeviceId(7), 64);

        let export = registry.export();
        assert_eq!(lookup(&export, "eth1_rx_packets"), Some(1));
        assert_eq!(lookup(&export, "eth0_tx_bytes"), Some(98));
        assert_eq!(lookup(&export, "eth0_rx_packets"), Some(0));
    }

    #[test]
    fn test_export_counters() {
        let registry = MetricsRegistry::new(Vec::<String>::new());
        registry.packets_forwarded.add(3);
        registry.nat64_translations.inc();
        registry.set_route_count(4);

        let export = registry.export();
        assert_eq!(lookup(&export, "packets_forwarded"), Some(3));
        assert_eq!(lookup(&export, "nat64_translations"), Some(1));
        assert_eq!(lookup(&export, "route_count"), Some(4));
        assert_eq!(lookup(&export, "packets_dropped"), Some(0));
    }
}
