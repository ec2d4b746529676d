//! Subnet arithmetic over 32-bit address values.
//!
//! Everything here is a pure function of its inputs: no storage, no
//! policy. The pool registry and the analysis front both build on these
//! primitives.

use std::net::Ipv4Addr;

use serde::Serialize;

use super::mask::prefix_to_mask;
use super::parse::AddrError;

/// Derived description of the network containing an address.
///
/// Never persisted; recomputed from `(ip, prefix_length)` whenever it is
/// needed so it can never drift from its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    /// Prefix length the computation was made for
    pub prefix_length: u8,
    /// Mask with `prefix_length` leading one-bits
    pub subnet_mask: Ipv4Addr,
    /// The address with all host bits cleared
    pub network_address: Ipv4Addr,
    /// The address with all host bits set
    pub broadcast_address: Ipv4Addr,
    /// First address a host may use
    pub first_usable: Ipv4Addr,
    /// Last address a host may use
    pub last_usable: Ipv4Addr,
    /// `2^(32 - prefix_length)`; a /0 network spans all 2^32 addresses
    pub total_hosts: u64,
    /// Total minus the network and broadcast addresses below /31
    pub usable_hosts: u64,
}

/// Compute the enclosing network of an address at a prefix length.
///
/// The network address is `ip AND mask`, the broadcast `network OR NOT
/// mask`. For prefixes up to /30 the first and last usable hosts sit one
/// inside those boundaries. `/31` (point-to-point) and `/32` (single
/// host) have no network/broadcast pair to exclude, so the usable range
/// is the whole network and `usable_hosts == total_hosts`.
///
/// # Arguments
/// * `ip` - Any address inside the network of interest
/// * `prefix_length` - CIDR prefix length, 0 through 32
pub fn compute_network_info(ip: Ipv4Addr, prefix_length: u8) -> Result<NetworkInfo, AddrError> {
    let subnet_mask = prefix_to_mask(prefix_length)?;
    let mask = u32::from(subnet_mask);

    let network = u32::from(ip) & mask;
    let broadcast = network | !mask;
    let total_hosts = 1u64 << (32 - u32::from(prefix_length));

    let (first, last, usable_hosts) = if prefix_length >= 31 {
        (network, broadcast, total_hosts)
    } else {
        (network + 1, broadcast - 1, total_hosts - 2)
    };

    Ok(NetworkInfo {
        prefix_length,
        subnet_mask,
        network_address: Ipv4Addr::from(network),
        broadcast_address: Ipv4Addr::from(broadcast),
        first_usable: Ipv4Addr::from(first),
        last_usable: Ipv4Addr::from(last),
        total_hosts,
        usable_hosts,
    })
}

/// Inclusive range check over the unsigned 32-bit values of the addresses.
///
/// String or octet-wise comparison misorders boundaries whose octets have
/// different widths (`.9` sorts after `.10`); every range test in the
/// engine goes through here instead.
pub fn is_in_range(ip: Ipv4Addr, start: Ipv4Addr, end: Ipv4Addr) -> bool {
    let value = u32::from(ip);
    u32::from(start) <= value && value <= u32::from(end)
}
