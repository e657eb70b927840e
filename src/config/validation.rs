//! Configuration validation

use super::{parse_cidr, parse_ipv4_cidr, parse_ipv6_cidr, Cidr, Config};
use crate::protocol::MacAddr;
use std::collections::HashSet;
use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_interfaces(config, &mut result);
    validate_routes(config, &mut result);
    validate_nat(config, &mut result);
    validate_nat64(config, &mut result);

    result
}

fn validate_interfaces(config: &Config, result: &mut ValidationResult) {
    if config.interfaces.is_empty() {
        result.error("no interfaces defined");
    }

    for (name, iface) in &config.interfaces {
        if let Some(address) = &iface.address {
            if let Err(e) = parse_ipv4_cidr(address) {
                result.error(format!("interfaces.{}.address: {}", name, e));
            }
        }

        for address in &iface.ipv6 {
            if let Err(e) = parse_ipv6_cidr(address) {
                result.error(format!("interfaces.{}.ipv6: {}", name, e));
            }
        }

        if let Some(mac) = &iface.mac {
            if let Err(e) = mac.parse::<MacAddr>() {
                result.error(format!("interfaces.{}.mac: {}", name, e));
            }
        }

        if iface.address.is_none() && iface.ipv6.is_empty() {
            result.warn(format!(
                "interfaces.{}: no addresses configured, only frames will be received",
                name
            ));
        }
    }
}

/// Whether some interface has a connected network covering `gateway`
fn has_connected_network(config: &Config, gateway: IpAddr) -> bool {
    config.interfaces.values().any(|iface| match gateway {
        IpAddr::V4(gw) => iface
            .address
            .as_deref()
            .and_then(|a| parse_ipv4_cidr(a).ok())
            .is_some_and(|(addr, len)| {
                crate::dataplane::Ipv4Config::new(addr, len).contains(gw)
            }),
        IpAddr::V6(gw) => iface
            .ipv6
            .iter()
            .filter_map(|a| parse_ipv6_cidr(a).ok())
            .any(|(addr, len)| {
                crate::protocol::ipv6::network(addr, len) == crate::protocol::ipv6::network(gw, len)
            }),
    })
}

fn validate_routes(config: &Config, result: &mut ValidationResult) {
    let mut seen = HashSet::new();

    for (i, route) in config.routes.iter().enumerate() {
        let destination = match parse_cidr(&route.destination) {
            Ok(d) => d,
            Err(e) => {
                result.error(format!("routes[{}].destination: {}", i, e));
                continue;
            }
        };
        let gateway: IpAddr = match route.gateway.parse() {
            Ok(g) => g,
            Err(_) => {
                result.error(format!(
                    "routes[{}].gateway: '{}' is not a valid address",
                    i, route.gateway
                ));
                continue;
            }
        };

        if destination.address().is_ipv4() != gateway.is_ipv4() {
            result.error(format!(
                "routes[{}]: destination {} and gateway {} are different families",
                i, route.destination, gateway
            ));
            continue;
        }

        if !has_connected_network(config, gateway) {
            result.warn(format!(
                "routes[{}]: gateway {} is not on any connected network",
                i, gateway
            ));
        }

        if let Cidr::V6(_, len) = destination {
            if len > 64 {
                result.warn(format!(
                    "routes[{}]: IPv6 routes match on the first 64 bits, /{} is treated as /64",
                    i, len
                ));
            }
        }

        if !seen.insert(destination) {
            result.warn(format!(
                "routes[{}]: duplicate destination {}, the later route wins",
                i, route.destination
            ));
        }
    }
}

fn interface_has_ipv4(config: &Config, name: &str) -> bool {
    config
        .interfaces
        .get(name)
        .and_then(|iface| iface.address.as_deref())
        .is_some_and(|a| parse_ipv4_cidr(a).is_ok())
}

fn validate_nat(config: &Config, result: &mut ValidationResult) {
    for (i, nat) in config.nat.iter().enumerate() {
        if !config.interfaces.contains_key(&nat.inside) {
            result.error(format!("nat[{}].inside: interface '{}' not defined", i, nat.inside));
        }

        match (&nat.outside, nat.outside_address) {
            (_, Some(_)) => {}
            (Some(outside), None) => {
                if !config.interfaces.contains_key(outside) {
                    result.error(format!("nat[{}].outside: interface '{}' not defined", i, outside));
                } else if !interface_has_ipv4(config, outside) {
                    result.error(format!(
                        "nat[{}].outside: interface '{}' has no IPv4 address",
                        i, outside
                    ));
                }
            }
            (None, None) => {
                result.error(format!(
                    "nat[{}]: either outside or outside_address is required",
                    i
                ));
            }
        }
    }

    let mut inside = HashSet::new();
    for nat in &config.nat {
        if !inside.insert(nat.inside.as_str()) {
            result.error(format!("nat: interface '{}' configured twice", nat.inside));
        }
    }
}

fn validate_nat64(config: &Config, result: &mut ValidationResult) {
    let Some(nat64) = &config.nat64 else {
        return;
    };

    match config.interfaces.get(&nat64.inside) {
        None => result.error(format!(
            "nat64.inside: interface '{}' not defined",
            nat64.inside
        )),
        Some(iface) if iface.ipv6.is_empty() => result.warn(format!(
            "nat64.inside: interface '{}' has no IPv6 address",
            nat64.inside
        )),
        Some(_) => {}
    }

    if !config.interfaces.keys().any(|name| interface_has_ipv4(config, name)) {
        result.error("nat64: no interface has an IPv4 address to translate to");
    }
}
