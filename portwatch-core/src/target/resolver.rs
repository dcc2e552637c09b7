//! Expansion of stored target strings into the addresses they denote.
//!
//! Grammar: a string without `/` must be a single IPv4 or IPv6 address;
//! anything else must be CIDR notation. A CIDR block is enumerated in
//! ascending order over its masked network. When the block holds more than
//! two addresses the network and broadcast addresses are dropped; `/31` and
//! `/32` (and their IPv6 equivalents `/127`, `/128`) are returned whole.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::IpNetwork;

use crate::error::{Result, ScanError};

/// Lazily enumerated addresses of one target, in ascending numeric order.
///
/// Large blocks are never materialized; the worker pool pulls addresses one
/// at a time.
#[derive(Debug, Clone)]
pub struct TargetAddresses {
    family: Family,
    next: u128,
    last: u128,
    exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

impl TargetAddresses {
    fn single(addr: IpAddr) -> Self {
        let (family, value) = split(addr);
        Self {
            family,
            next: value,
            last: value,
            exhausted: false,
        }
    }

    fn range(family: Family, first: u128, last: u128) -> Self {
        Self {
            family,
            next: first,
            last,
            exhausted: first > last,
        }
    }

    /// Number of addresses left to yield.
    pub fn remaining(&self) -> u128 {
        if self.exhausted {
            0
        } else {
            // A full IPv6 space overflows u128 by one; saturate.
            (self.last - self.next).saturating_add(1)
        }
    }
}

impl Iterator for TargetAddresses {
    type Item = IpAddr;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let current = self.next;
        if current == self.last {
            self.exhausted = true;
        } else {
            self.next += 1;
        }
        Some(join(self.family, current))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        match usize::try_from(remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

/// Resolve a stored target string into the addresses it denotes.
pub fn resolve(target: &str) -> Result<TargetAddresses> {
    if !target.contains('/') {
        let addr: IpAddr = target
            .parse()
            .map_err(|_| ScanError::InvalidTarget(format!("invalid IP address: {target}")))?;
        return Ok(TargetAddresses::single(addr));
    }

    let network = parse_cidr(target)?;

    let (family, base) = split(network.network());
    let max_prefix: u32 = match family {
        Family::V4 => 32,
        Family::V6 => 128,
    };
    let host_bits = max_prefix - u32::from(network.prefix());

    let span = if host_bits >= 128 {
        u128::MAX
    } else {
        (1u128 << host_bits) - 1
    };
    let mut first = base;
    let mut last = base + span;

    // host_bits >= 2 means more than two addresses in the block.
    if host_bits >= 2 {
        first += 1;
        last -= 1;
    }

    Ok(TargetAddresses::range(family, first, last))
}

/// True when `target` parses under the resolver grammar.
pub fn is_valid(target: &str) -> bool {
    resolve(target).is_ok()
}

// ipnetwork tolerates abbreviated IPv4 forms such as `10.0/16`; the address
// half goes through the std parser so only full addresses are accepted.
fn parse_cidr(target: &str) -> Result<IpNetwork> {
    let invalid = |reason: String| ScanError::InvalidTarget(format!("invalid CIDR {target}: {reason}"));

    let (addr_part, prefix_part) = target
        .split_once('/')
        .ok_or_else(|| invalid("missing prefix".to_string()))?;
    let addr: IpAddr = addr_part
        .parse()
        .map_err(|err: std::net::AddrParseError| invalid(err.to_string()))?;
    let prefix: u8 = prefix_part
        .parse()
        .map_err(|err: std::num::ParseIntError| invalid(err.to_string()))?;

    IpNetwork::new(addr, prefix).map_err(|err| invalid(err.to_string()))
}

fn split(addr: IpAddr) -> (Family, u128) {
    match addr {
        IpAddr::V4(v4) => (Family::V4, u128::from(u32::from(v4))),
        IpAddr::V6(v6) => (Family::V6, u128::from(v6)),
    }
}

fn join(family: Family, value: u128) -> IpAddr {
    match family {
        // Values for V4 never exceed u32::MAX by construction.
        Family::V4 => IpAddr::V4(Ipv4Addr::from(value as u32)),
        Family::V6 => IpAddr::V6(Ipv6Addr::from(value)),
    }
}
