// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Partitioning of a record set into per-zone batches.
//!
//! Forward records go to the static forward zone. PTR records go to the zone
//! re-derived from their owner name with the family's boundary, which must
//! agree with the zone resolved during synthesis. A record whose zone cannot
//! be resolved is dropped with a warning and never merged into another zone.

use crate::config::ReverseConfig;
use crate::dns::records::DesiredRecord;
use crate::dns::reverse::zone_for_record_name;
use crate::dns_errors::AddressFamily;
use crate::metrics;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Records destined for one zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneBatch {
    /// Zone name without trailing dot
    pub zone: String,
    /// Records in the order they were synthesized
    pub records: Vec<DesiredRecord>,
}

/// Group records by the zone they must be published into.
///
/// Batches come back sorted by zone name so a cycle always visits zones in the
/// same order. Every batch is non-empty.
#[must_use]
pub fn group_by_zone(
    records: &[DesiredRecord],
    forward_zone: &str,
    reverse: &ReverseConfig,
) -> Vec<ZoneBatch> {
    let forward_zone = forward_zone.trim_end_matches('.');
    let mut by_zone: BTreeMap<String, Vec<DesiredRecord>> = BTreeMap::new();

    for record in records {
        match resolve_zone(record, forward_zone, reverse) {
            Some(zone) => by_zone.entry(zone).or_default().push(record.clone()),
            None => metrics::record_unroutable(record.kind),
        }
    }

    let batches: Vec<ZoneBatch> = by_zone
        .into_iter()
        .map(|(zone, records)| ZoneBatch { zone, records })
        .collect();

    debug!(
        records = records.len(),
        zones = batches.len(),
        "Grouped records by zone"
    );
    batches
}

/// Zone a record is routed to, or `None` if it cannot be placed.
fn resolve_zone(
    record: &DesiredRecord,
    forward_zone: &str,
    reverse: &ReverseConfig,
) -> Option<String> {
    let record_zone = record.zone.trim_end_matches('.');

    if !record.kind.is_reverse() {
        if record_zone.eq_ignore_ascii_case(forward_zone) {
            return Some(forward_zone.to_string());
        }
        warn!(
            record = %record.name,
            kind = %record.kind,
            zone = %record.zone,
            forward_zone = %forward_zone,
            "Dropping forward record outside the forward zone"
        );
        return None;
    }

    let Some(family) = reverse_family(&record.name) else {
        warn!(
            record = %record.name,
            "Dropping PTR record with a name outside the reverse trees"
        );
        return None;
    };

    let family_config = reverse.for_family(family);
    if !family_config.enabled {
        warn!(
            record = %record.name,
            family = %family,
            "Dropping PTR record for a family with reverse records disabled"
        );
        return None;
    }

    match zone_for_record_name(&record.name, family_config.boundary) {
        Ok(zone) if zone.eq_ignore_ascii_case(record_zone) => Some(zone),
        Ok(zone) => {
            warn!(
                record = %record.name,
                derived_zone = %zone,
                zone = %record.zone,
                "Dropping PTR record whose zone does not match its name"
            );
            None
        }
        Err(e) => {
            warn!(
                record = %record.name,
                "Dropping PTR record: {}",
                e
            );
            None
        }
    }
}

fn reverse_family(name: &str) -> Option<AddressFamily> {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    if name.ends_with(".in-addr.arpa") {
        Some(AddressFamily::V4)
    } else if name.ends_with(".ip6.arpa") {
        Some(AddressFamily::V6)
    } else {
        None
    }
}

#[cfg(test)]
#[path = "zones_tests.rs"]
mod zones_tests;
