//! Point-in-time snapshots of the kernel routing table.
//!
//! Reachability resolution needs to know whether the test process can route
//! packets straight to a container's bridge address. On Linux the kernel
//! exposes the routing table as `/proc/net/route`; a snapshot parses that
//! into [`RouteEntry`] rows with a network-membership test.
//!
//! A snapshot is taken fresh for every resolution and never refreshed. An
//! unreadable or absent source (non-Linux host, sandbox) is reported as
//! "unavailable" rather than as an error; callers treat that as "assume
//! direct reachability".

use std::net::{IpAddr, Ipv4Addr};

use tracing::warn;

/// An IPv4 network expressed as a base address and netmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Network {
    address: Ipv4Addr,
    mask: Ipv4Addr,
}

impl Ipv4Network {
    /// Creates a network from an address and mask. Host bits in the address
    /// are cleared.
    pub fn new(address: Ipv4Addr, mask: Ipv4Addr) -> Self {
        let masked = u32::from(address) & u32::from(mask);
        Self {
            address: Ipv4Addr::from(masked),
            mask,
        }
    }

    /// The base address of the network.
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// The netmask.
    pub fn mask(&self) -> Ipv4Addr {
        self.mask
    }

    /// Returns true if `addr` falls inside this network.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & u32::from(self.mask) == u32::from(self.address)
    }
}

impl std::fmt::Display for Ipv4Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, u32::from(self.mask).count_ones())
    }
}

/// One row of the routing table.
///
/// A default route (destination `0.0.0.0`) carries a gateway and no network;
/// every other row carries a network computed from destination and mask, and
/// no gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Route destination.
    pub destination: Ipv4Addr,
    /// Gateway, set only on the default route.
    pub gateway: Option<Ipv4Addr>,
    /// Netmask, unset on the default route.
    pub mask: Option<Ipv4Addr>,
    /// Destination network, unset on the default route.
    pub network: Option<Ipv4Network>,
    /// Route metric, kept verbatim.
    pub metric: String,
    /// Interface name.
    pub interface: String,
}

impl RouteEntry {
    /// Returns true if this is the default route.
    pub fn is_default_gateway(&self) -> bool {
        self.gateway.is_some()
    }

    /// Returns true if the destination is a loopback address.
    pub fn is_loopback(&self) -> bool {
        self.destination.is_loopback()
    }

    /// Returns true if `addr` is routable through this entry's network.
    ///
    /// Loopback entries and loopback probe addresses never count as a usable
    /// network path, regardless of numeric containment.
    pub fn in_network(&self, addr: IpAddr) -> bool {
        let Some(network) = self.network else {
            return false;
        };

        let IpAddr::V4(addr) = addr else {
            return false;
        };

        if addr.is_loopback() || self.is_loopback() {
            return false;
        }

        network.contains(addr)
    }
}

/// An immutable, ordered snapshot of the kernel routing table.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: Vec<RouteEntry>,
}

impl RoutingTable {
    /// Reads the current routing state from `/proc/net/route`.
    ///
    /// Returns `None` when the source is unreadable or malformed. This is a
    /// degraded-information signal, not an error: the caller should assume
    /// direct reachability. The heuristic is IPv4-only and Linux-only; on
    /// any other target this always returns `None`.
    pub fn capture() -> Option<Self> {
        #[cfg(target_os = "linux")]
        {
            match std::fs::read_to_string("/proc/net/route") {
                Ok(text) => Self::parse(&text),
                Err(e) => {
                    warn!(error = %e, "failed to obtain routing table");
                    None
                }
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }

    /// Parses routing-table text: one header line, then whitespace-separated
    /// rows of `interface destination gateway flags refcnt use metric mask
    /// mtu window irtt` with addresses as 8-hex-digit little-endian
    /// integers.
    ///
    /// Returns `None` if any row fails to parse.
    pub fn parse(text: &str) -> Option<Self> {
        let mut entries = Vec::new();

        for line in text.lines().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            match parse_route_line(line) {
                Some(entry) => entries.push(entry),
                None => {
                    warn!(line, "failed to parse routing table row");
                    return None;
                }
            }
        }

        Some(Self { entries })
    }

    /// The snapshot's entries, in table order.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Returns the first entry whose network contains `addr`.
    pub fn find_route(&self, addr: IpAddr) -> Option<&RouteEntry> {
        self.entries.iter().find(|entry| entry.in_network(addr))
    }
}

/// Decodes an 8-hex-digit little-endian integer into an address.
fn decode_le_hex(field: &str) -> Option<Ipv4Addr> {
    let value = u32::from_str_radix(field, 16).ok()?;
    Some(Ipv4Addr::from(value.to_le_bytes()))
}

fn parse_route_line(line: &str) -> Option<RouteEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 8 {
        return None;
    }

    let interface = fields[0].to_string();
    let destination = decode_le_hex(fields[1])?;
    let metric = fields[6].to_string();

    if destination == Ipv4Addr::UNSPECIFIED {
        let gateway = decode_le_hex(fields[2])?;
        Some(RouteEntry {
            destination,
            gateway: Some(gateway),
            mask: None,
            network: None,
            metric,
            interface,
        })
    } else {
        let mask = decode_le_hex(fields[7])?;
        Some(RouteEntry {
            destination,
            gateway: None,
            mask: Some(mask),
            network: Some(Ipv4Network::new(destination, mask)),
            metric,
            interface,
        })
    }
}
