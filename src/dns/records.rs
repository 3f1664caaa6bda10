// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Record synthesis: turns a Tailscale roster into the records that should exist.
//!
//! Every cycle starts from scratch. Online endpoints produce one A record per
//! IPv4 address, one AAAA record per IPv6 address and, when reverse records are
//! enabled for the family, one PTR record pointing back at the forward name.
//! Offline endpoints produce nothing.
//!
//! # Example
//!
//! ```rust
//! use tailscale_bind_ddns::config::ReverseConfig;
//! use tailscale_bind_ddns::discovery::Endpoint;
//! use tailscale_bind_ddns::dns::records::{synthesize, RecordKind};
//!
//! let endpoint = Endpoint {
//!     id: "m1".to_string(),
//!     name: String::new(),
//!     ipv4: Some("100.64.1.1".parse().unwrap()),
//!     ipv6: None,
//!     online: true,
//!     last_seen: None,
//! };
//!
//! let records = synthesize(&[endpoint], "example.com", 300, &ReverseConfig::disabled());
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].kind, RecordKind::A);
//! assert_eq!(records[0].name, "m1");
//! ```

use crate::config::{ReverseConfig, ReverseZoneConfig};
use crate::constants::{MAX_DNS_LABEL_LEN, PLACEHOLDER_HOSTNAME};
use crate::discovery::Endpoint;
use crate::dns::reverse::{reverse_name, zone_for_address};
use crate::dns_errors::{AddressFamily, ClassificationError, SyncError};
use crate::metrics;
use hickory_client::rr::RecordType;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use tracing::{debug, warn};

/// Type of a synthesized record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RecordKind {
    /// Forward IPv4 record
    A,
    /// Forward IPv6 record
    #[serde(rename = "AAAA")]
    Aaaa,
    /// Reverse pointer record
    #[serde(rename = "PTR")]
    Ptr,
}

impl RecordKind {
    /// Record type mnemonic.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Ptr => "PTR",
        }
    }

    /// Matching hickory record type.
    #[must_use]
    pub fn record_type(self) -> RecordType {
        match self {
            Self::A => RecordType::A,
            Self::Aaaa => RecordType::AAAA,
            Self::Ptr => RecordType::PTR,
        }
    }

    /// Returns true for PTR records.
    #[must_use]
    pub fn is_reverse(self) -> bool {
        matches!(self, Self::Ptr)
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that should exist on the authoritative server.
///
/// Forward records carry a name relative to `zone`; PTR records carry the
/// fully-qualified reversed address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesiredRecord {
    /// Record type
    pub kind: RecordKind,
    /// Owner name (relative for A/AAAA, fully-qualified for PTR)
    pub name: String,
    /// Address for A/AAAA, hostname for PTR
    pub value: String,
    /// Time to live in seconds
    pub ttl: u32,
    /// Zone this record is published into, without trailing dot
    pub zone: String,
}

impl DesiredRecord {
    /// Fully-qualified owner name with trailing dot.
    #[must_use]
    pub fn fqdn(&self) -> String {
        if self.kind.is_reverse() {
            absolute(&self.name)
        } else {
            absolute(&format!("{}.{}", self.name, self.zone))
        }
    }
}

/// Append the root label if missing.
pub(crate) fn absolute(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Sanitize a machine name into a single DNS label.
///
/// Keeps only the part before the first dot, replaces anything other than
/// ASCII letters, digits, hyphens and dots with a hyphen, collapses hyphen
/// runs, trims hyphens and dots from both ends and lower-cases the result.
/// The result is cut to 63 octets, the DNS label limit, and trimmed again.
/// An empty result becomes `machine`.
#[must_use]
pub fn sanitize_dns_name(name: &str) -> String {
    let hostname = name.split('.').next().unwrap_or_default();

    let mut sanitized = String::with_capacity(hostname.len());
    for c in hostname.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            c
        } else {
            '-'
        };
        if c == '-' && sanitized.ends_with('-') {
            continue;
        }
        sanitized.push(c);
    }

    let is_edge = |c: char| c == '-' || c == '.';
    let mut trimmed = sanitized.trim_matches(is_edge);
    // Only ASCII is left, so any byte offset is a char boundary.
    if trimmed.len() > MAX_DNS_LABEL_LEN {
        trimmed = trimmed[..MAX_DNS_LABEL_LEN].trim_end_matches(is_edge);
    }
    if trimmed.is_empty() {
        return PLACEHOLDER_HOSTNAME.to_string();
    }

    trimmed.to_ascii_lowercase()
}

/// Build the full desired record set for a roster.
///
/// Reverse records whose address falls outside the family's validation subnet,
/// or cannot be classified, are skipped with a warning; they never fail the
/// call. The order of the returned records is not significant.
#[must_use]
pub fn synthesize(
    endpoints: &[Endpoint],
    forward_zone: &str,
    ttl: u32,
    reverse: &ReverseConfig,
) -> Vec<DesiredRecord> {
    let forward_zone = forward_zone.trim_end_matches('.');
    let mut records = Vec::new();

    for endpoint in endpoints.iter().filter(|e| e.online) {
        let owner = sanitize_dns_name(endpoint.display_name());
        let hostname = format!("{owner}.{forward_zone}");

        let addresses = [
            (RecordKind::A, endpoint.ipv4.map(IpAddr::V4)),
            (RecordKind::Aaaa, endpoint.ipv6.map(IpAddr::V6)),
        ];

        for (kind, address) in addresses {
            let Some(address) = address else {
                continue;
            };

            debug!(
                endpoint_id = %endpoint.id,
                endpoint_name = %endpoint.name,
                record = %owner,
                kind = %kind,
                address = %address,
                "Converted machine to forward record"
            );
            records.push(DesiredRecord {
                kind,
                name: owner.clone(),
                value: address.to_string(),
                ttl,
                zone: forward_zone.to_string(),
            });

            let family = family_of(address);
            let family_config = reverse.for_family(family);
            if !family_config.enabled {
                continue;
            }

            match reverse_record(address, &hostname, ttl, family_config) {
                Ok(record) => {
                    debug!(
                        record = %record.name,
                        target = %record.value,
                        zone = %record.zone,
                        "Created PTR record"
                    );
                    records.push(record);
                }
                Err(e) => {
                    warn!(
                        endpoint_id = %endpoint.id,
                        address = %address,
                        reason = SyncError::from(e.clone()).status_reason(),
                        "Skipping PTR record: {}",
                        e
                    );
                    metrics::record_skipped(&e);
                }
            }
        }
    }

    for record in &records {
        metrics::record_synthesized(record.kind);
    }

    debug!(
        endpoints = endpoints.len(),
        records = records.len(),
        "Synthesized DNS records from roster"
    );
    records
}

fn family_of(address: IpAddr) -> AddressFamily {
    match address {
        IpAddr::V4(_) => AddressFamily::V4,
        IpAddr::V6(_) => AddressFamily::V6,
    }
}

/// Build the PTR record for one address, if its family config allows it.
fn reverse_record(
    address: IpAddr,
    hostname: &str,
    ttl: u32,
    config: &ReverseZoneConfig,
) -> Result<DesiredRecord, ClassificationError> {
    let family = family_of(address);

    let contained = config.subnet.is_some_and(|subnet| subnet.contains(address));
    if !contained {
        return Err(ClassificationError::OutsideSubnet {
            address: address.to_string(),
            subnet: config
                .subnet
                .map_or_else(|| "<unset>".to_string(), |s| s.to_string()),
        });
    }

    let zone = zone_for_address(&address.to_string(), family, config.boundary)?;

    Ok(DesiredRecord {
        kind: RecordKind::Ptr,
        name: reverse_name(address),
        value: hostname.to_string(),
        ttl,
        zone,
    })
}

/// SHA-256 digest of a record set, independent of record order.
///
/// Logged with each cycle so operators can see whether consecutive cycles
/// asserted the same set.
#[must_use]
pub fn record_set_digest(records: &[DesiredRecord]) -> String {
    let mut sorted: Vec<&DesiredRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        (a.kind, &a.name, &a.zone, &a.value).cmp(&(b.kind, &b.name, &b.zone, &b.value))
    });

    let json = serde_json::to_string(&sorted).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod records_tests;
