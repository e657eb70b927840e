//! Packet capture backends
//!
//! AF_PACKET raw sockets, plus interface discovery through sysfs.

mod af_packet;

pub use af_packet::AfPacketSocket;

use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::future::Future;
use std::path::Path;

/// Interfaces never used as router ports
pub const IGNORED_INTERFACES: [&str; 5] = ["lo", "bond0", "dummy0", "tunl0", "sit0"];

const SYS_CLASS_NET: &str = "/sys/class/net";

/// Frame I/O for one device
///
/// Both halves take `&self` so a receive task and the transmit path can
/// share one socket.
pub trait Capture: Send + Sync {
    /// Receive a frame into `buf`, returning its length
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Send a complete frame
    fn send(&self, buf: &[u8]) -> impl Future<Output = Result<usize>> + Send;
}

pub fn is_ignored(name: &str) -> bool {
    IGNORED_INTERFACES.contains(&name)
}

/// Names under /sys/class/net, minus the ignored ones, sorted.
pub fn list_interfaces() -> Result<Vec<String>> {
    list_interfaces_in(Path::new(SYS_CLASS_NET))
}

fn list_interfaces_in(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if !is_ignored(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// MAC address of `name` as reported by sysfs.
pub fn read_mac(name: &str) -> Result<MacAddr> {
    read_mac_in(Path::new(SYS_CLASS_NET), name)
}

fn read_mac_in(dir: &Path, name: &str) -> Result<MacAddr> {
    let path = dir.join(name).join("address");
    let content = std::fs::read_to_string(&path).map_err(|_| Error::InterfaceNotFound {
        name: name.to_string(),
    })?;
    content
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}
