// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reverse zone classification.
//!
//! Maps an address to the reverse zone it is published in, given a subnet
//! boundary, and re-derives that zone from an already-reversed record name.
//!
//! | Family | Boundaries | Labels kept |
//! |--------|------------|-------------|
//! | IPv4   | 8, 16, 24  | 1, 2, 3 octets |
//! | IPv6   | 32, 48, 64 | 8, 12, 16 nibbles |
//!
//! ```rust
//! use tailscale_bind_ddns::dns::reverse::{zone_for_address, zone_for_record_name, reverse_name};
//! use tailscale_bind_ddns::dns_errors::AddressFamily;
//!
//! let zone = zone_for_address("100.64.1.1", AddressFamily::V4, 16).unwrap();
//! assert_eq!(zone, "64.100.in-addr.arpa");
//!
//! let ptr = reverse_name("100.64.1.1".parse().unwrap());
//! assert_eq!(ptr, "1.1.64.100.in-addr.arpa.");
//! assert_eq!(zone_for_record_name(&ptr, 16).unwrap(), zone);
//! ```
//!
//! Every function here is pure.

use crate::constants::{
    IPV4_BOUNDARY_SIZES, IPV4_REVERSE_SUFFIX, IPV6_BOUNDARY_SIZES, IPV6_REVERSE_SUFFIX,
};
use crate::dns_errors::{AddressFamily, ClassificationError};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const IPV4_LABELS: usize = 4;
const IPV6_LABELS: usize = 32;

/// Legal subnet boundary sizes for a family.
#[must_use]
pub fn legal_boundaries(family: AddressFamily) -> &'static [u8] {
    match family {
        AddressFamily::V4 => &IPV4_BOUNDARY_SIZES,
        AddressFamily::V6 => &IPV6_BOUNDARY_SIZES,
    }
}

/// Check that `size` is a legal boundary for `family`.
///
/// # Errors
///
/// Returns `UnsupportedBoundary` if it is not.
pub fn validate_boundary(family: AddressFamily, size: u8) -> Result<(), ClassificationError> {
    if legal_boundaries(family).contains(&size) {
        Ok(())
    } else {
        Err(ClassificationError::UnsupportedBoundary { family, size })
    }
}

/// Number of reversed labels that make up the network part of a zone.
fn network_labels(family: AddressFamily, size: u8) -> Result<usize, ClassificationError> {
    validate_boundary(family, size)?;
    Ok(match family {
        AddressFamily::V4 => usize::from(size / 8),
        AddressFamily::V6 => usize::from(size / 4),
    })
}

fn suffix(family: AddressFamily) -> &'static str {
    match family {
        AddressFamily::V4 => IPV4_REVERSE_SUFFIX,
        AddressFamily::V6 => IPV6_REVERSE_SUFFIX,
    }
}

/// Labels of an address in reversed order, least significant first.
fn reversed_labels(address: IpAddr) -> Vec<String> {
    match address {
        IpAddr::V4(v4) => v4.octets().iter().rev().map(u8::to_string).collect(),
        IpAddr::V6(v6) => v6
            .octets()
            .iter()
            .rev()
            .flat_map(|byte| [byte & 0x0f, byte >> 4])
            .map(|nibble| format!("{nibble:x}"))
            .collect(),
    }
}

fn parse_address(address: &str, family: AddressFamily) -> Result<IpAddr, ClassificationError> {
    let invalid = || ClassificationError::InvalidAddress {
        address: address.to_string(),
        family,
    };

    match family {
        AddressFamily::V4 => address
            .parse::<Ipv4Addr>()
            .map(IpAddr::V4)
            .map_err(|_| invalid()),
        AddressFamily::V6 => address
            .parse::<Ipv6Addr>()
            .map(IpAddr::V6)
            .map_err(|_| invalid()),
    }
}

/// Fully reversed owner name of a PTR record, with a trailing dot.
///
/// `100.64.1.1` becomes `1.1.64.100.in-addr.arpa.`; IPv6 addresses are
/// expanded to all 32 nibbles.
#[must_use]
pub fn reverse_name(address: IpAddr) -> String {
    let family = match address {
        IpAddr::V4(_) => AddressFamily::V4,
        IpAddr::V6(_) => AddressFamily::V6,
    };
    format!("{}.{}.", reversed_labels(address).join("."), suffix(family))
}

/// Reverse zone an address belongs to under the given boundary.
///
/// The result has no trailing dot (e.g., `64.100.in-addr.arpa`).
///
/// # Errors
///
/// - `InvalidAddress` if `address` does not parse as a `family` address
/// - `UnsupportedBoundary` if `boundary` is not legal for `family`
pub fn zone_for_address(
    address: &str,
    family: AddressFamily,
    boundary: u8,
) -> Result<String, ClassificationError> {
    let parsed = parse_address(address, family)?;
    let keep = network_labels(family, boundary)?;

    let labels = reversed_labels(parsed);
    let network = &labels[labels.len() - keep..];

    Ok(format!("{}.{}", network.join("."), suffix(family)))
}

/// Reverse zone of an already-reversed record name under the given boundary.
///
/// Accepts names with or without a trailing dot. The family is taken from the
/// name's suffix.
///
/// # Errors
///
/// - `InvalidAddress` if the name is not a complete reverse name
/// - `UnsupportedBoundary` if `boundary` is not legal for the name's family
pub fn zone_for_record_name(
    reverse_record_name: &str,
    boundary: u8,
) -> Result<String, ClassificationError> {
    let name = reverse_record_name.trim_end_matches('.').to_ascii_lowercase();

    let (family, host_part) = if let Some(rest) = name.strip_suffix(IPV4_REVERSE_SUFFIX) {
        (AddressFamily::V4, rest)
    } else if let Some(rest) = name.strip_suffix(IPV6_REVERSE_SUFFIX) {
        (AddressFamily::V6, rest)
    } else {
        let family = if IPV6_BOUNDARY_SIZES.contains(&boundary) {
            AddressFamily::V6
        } else {
            AddressFamily::V4
        };
        return Err(ClassificationError::InvalidAddress {
            address: reverse_record_name.to_string(),
            family,
        });
    };

    let invalid = || ClassificationError::InvalidAddress {
        address: reverse_record_name.to_string(),
        family,
    };

    let host_part = host_part.strip_suffix('.').ok_or_else(invalid)?;
    let labels: Vec<&str> = host_part.split('.').collect();

    let well_formed = match family {
        AddressFamily::V4 => {
            labels.len() == IPV4_LABELS && labels.iter().all(|l| l.parse::<u8>().is_ok())
        }
        AddressFamily::V6 => {
            labels.len() == IPV6_LABELS
                && labels
                    .iter()
                    .all(|l| l.len() == 1 && l.chars().all(|c| c.is_ascii_hexdigit()))
        }
    };
    if !well_formed {
        return Err(invalid());
    }

    let keep = network_labels(family, boundary)?;
    let network = &labels[labels.len() - keep..];

    Ok(format!("{}.{}", network.join("."), suffix(family)))
}

#[cfg(test)]
#[path = "reverse_tests.rs"]
mod reverse_tests;
