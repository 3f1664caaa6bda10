// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CIDR subnets used to gate reverse record publication.

use crate::dns_errors::AddressFamily;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// A CIDR string that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid CIDR '{input}': {reason}")]
pub struct SubnetParseError {
    /// The rejected input
    pub input: String,
    /// Why it was rejected
    pub reason: String,
}

/// An IPv4 or IPv6 network in CIDR notation.
///
/// Host bits of the parsed address are cleared, so `100.64.1.1/10` and
/// `100.64.0.0/10` describe the same network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    network: IpAddr,
    prefix_len: u8,
}

impl Subnet {
    /// Build a subnet from an address and prefix length.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix is longer than the address.
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, SubnetParseError> {
        let max = max_prefix(address);
        if prefix_len > max {
            return Err(SubnetParseError {
                input: format!("{address}/{prefix_len}"),
                reason: format!("prefix length must be at most {max}"),
            });
        }

        let network = match address {
            IpAddr::V4(v4) => IpAddr::V4((u32::from(v4) & v4_mask(prefix_len)).into()),
            IpAddr::V6(v6) => IpAddr::V6((u128::from(v6) & v6_mask(prefix_len)).into()),
        };

        Ok(Self {
            network,
            prefix_len,
        })
    }

    /// Network address with host bits cleared.
    #[must_use]
    pub fn network(&self) -> IpAddr {
        self.network
    }

    /// Prefix length in bits.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Address family of the network.
    #[must_use]
    pub fn family(&self) -> AddressFamily {
        match self.network {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Returns true if `address` falls inside this network.
    ///
    /// Addresses of the other family are never contained.
    #[must_use]
    pub fn contains(&self, address: IpAddr) -> bool {
        match (self.network, address) {
            (IpAddr::V4(network), IpAddr::V4(candidate)) => {
                u32::from(candidate) & v4_mask(self.prefix_len) == u32::from(network)
            }
            (IpAddr::V6(network), IpAddr::V6(candidate)) => {
                u128::from(candidate) & v6_mask(self.prefix_len) == u128::from(network)
            }
            _ => false,
        }
    }
}

impl FromStr for Subnet {
    type Err = SubnetParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parse_error = |reason: &str| SubnetParseError {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (address, prefix) = input
            .trim()
            .split_once('/')
            .ok_or_else(|| parse_error("expected <address>/<prefix>"))?;

        let address = IpAddr::from_str(address).map_err(|_| parse_error("invalid address"))?;
        let prefix_len = prefix
            .parse::<u8>()
            .map_err(|_| parse_error("invalid prefix length"))?;

        Self::new(address, prefix_len).map_err(|e| SubnetParseError {
            input: input.to_string(),
            reason: e.reason,
        })
    }
}

impl std::fmt::Display for Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

fn max_prefix(address: IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn v4_mask(prefix_len: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0)
}

fn v6_mask(prefix_len: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix_len)).unwrap_or(0)
}

#[cfg(test)]
#[path = "subnet_tests.rs"]
mod subnet_tests;
