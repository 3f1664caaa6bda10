// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(clippy::must_use_candidate)]

//! RFC 2136 update transactions.
//!
//! A transaction targets exactly one zone. For every record it carries a
//! delete-RRset operation followed by an insert, so applying the same desired
//! set twice leaves the zone unchanged and a changed value replaces the old
//! one instead of being appended next to it.
//!
//! # Example
//!
//! ```rust
//! use tailscale_bind_ddns::dns::records::{DesiredRecord, RecordKind};
//! use tailscale_bind_ddns::dns::transaction::build_transaction;
//!
//! let record = DesiredRecord {
//!     kind: RecordKind::A,
//!     name: "laptop".to_string(),
//!     value: "100.64.1.1".to_string(),
//!     ttl: 300,
//!     zone: "example.com".to_string(),
//! };
//!
//! let transaction = build_transaction("example.com", &[record]).unwrap();
//! assert_eq!(transaction.operations.len(), 2);
//!
//! let commands = transaction.to_nsupdate();
//! assert!(commands.contains("update delete laptop.example.com. A"));
//! assert!(commands.contains("update add laptop.example.com. 300 A 100.64.1.1"));
//! ```

use crate::dns::records::{absolute, DesiredRecord, RecordKind};
use crate::dns_errors::TransportError;
use hickory_client::op::{Message, MessageType, OpCode, Query};
use hickory_client::rr::{rdata, DNSClass, Name, RData, Record, RecordType};
use std::fmt::Write as _;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// One record-level operation inside an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOperation {
    /// Remove every record of `kind` at `name`
    DeleteRrset {
        /// Fully-qualified owner name
        name: String,
        /// Record type of the RRset
        kind: RecordKind,
    },
    /// Add one record
    Insert {
        /// Fully-qualified owner name
        name: String,
        /// Record type
        kind: RecordKind,
        /// Time to live in seconds
        ttl: u32,
        /// Address or hostname
        value: String,
    },
}

impl std::fmt::Display for UpdateOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeleteRrset { name, kind } => write!(f, "update delete {name} {kind}"),
            Self::Insert {
                name,
                kind,
                ttl,
                value,
            } => write!(f, "update add {name} {ttl} {kind} {value}"),
        }
    }
}

/// An ordered batch of operations applied atomically to one zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTransaction {
    /// Zone the update is addressed to, without trailing dot
    pub zone: String,
    /// Operations in record order, delete before insert
    pub operations: Vec<UpdateOperation>,
}

/// Build the transaction for one zone batch.
///
/// Returns `None` for an empty batch; an update with no operations is never
/// sent.
pub fn build_transaction(zone: &str, records: &[DesiredRecord]) -> Option<UpdateTransaction> {
    if records.is_empty() {
        return None;
    }

    let mut operations = Vec::with_capacity(records.len() * 2);
    for record in records {
        let name = record.fqdn();
        operations.push(UpdateOperation::DeleteRrset {
            name: name.clone(),
            kind: record.kind,
        });
        operations.push(UpdateOperation::Insert {
            name,
            kind: record.kind,
            ttl: record.ttl,
            value: record.value.clone(),
        });
    }

    Some(UpdateTransaction {
        zone: zone.trim_end_matches('.').to_string(),
        operations,
    })
}

impl UpdateTransaction {
    /// Number of records this transaction asserts.
    pub fn record_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, UpdateOperation::Insert { .. }))
            .count()
    }

    /// Render the transaction as `nsupdate` commands.
    pub fn to_nsupdate(&self) -> String {
        let mut commands = format!("zone {}\n", absolute(&self.zone));
        for operation in &self.operations {
            let _ = writeln!(commands, "{operation}");
        }
        commands.push_str("send\n");
        commands
    }

    /// Encode the transaction as an unsigned UPDATE message.
    ///
    /// The zone section names the zone with class IN and type SOA. Deletes use
    /// class ANY with TTL 0 and no data; inserts use class IN.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` if the zone, an owner name or a PTR target is not
    /// a valid DNS name, or if an address does not parse.
    pub fn to_message(&self) -> Result<Message, TransportError> {
        let zone = self.parse_name(&absolute(&self.zone))?;

        let mut query = Query::query(zone, RecordType::SOA);
        query.set_query_class(DNSClass::IN);

        let mut message = Message::new();
        message
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Update)
            .set_recursion_desired(false);
        // Zone section shares the question slot; updates share the authority slot.
        message.add_query(query);

        for operation in &self.operations {
            message.add_name_server(self.encode(operation)?);
        }

        Ok(message)
    }

    fn encode(&self, operation: &UpdateOperation) -> Result<Record, TransportError> {
        match operation {
            UpdateOperation::DeleteRrset { name, kind } => {
                let mut record = Record::with(self.parse_name(name)?, kind.record_type(), 0);
                record.set_dns_class(DNSClass::ANY);
                Ok(record)
            }
            UpdateOperation::Insert {
                name,
                kind,
                ttl,
                value,
            } => {
                let owner = self.parse_name(name)?;
                let data = match kind {
                    RecordKind::A => RData::A(self.parse_address::<Ipv4Addr>(value)?.into()),
                    RecordKind::Aaaa => RData::AAAA(self.parse_address::<Ipv6Addr>(value)?.into()),
                    RecordKind::Ptr => RData::PTR(rdata::PTR(self.parse_name(&absolute(value))?)),
                };
                let mut record = Record::from_rdata(owner, *ttl, data);
                record.set_dns_class(DNSClass::IN);
                Ok(record)
            }
        }
    }

    fn parse_name(&self, name: &str) -> Result<Name, TransportError> {
        Name::from_str(name).map_err(|e| TransportError::InvalidName {
            name: name.to_string(),
            zone: self.zone.clone(),
            reason: e.to_string(),
        })
    }

    fn parse_address<T: FromStr>(&self, value: &str) -> Result<T, TransportError> {
        value.parse::<T>().map_err(|_| TransportError::InvalidName {
            name: value.to_string(),
            zone: self.zone.clone(),
            reason: "not a valid address".to_string(),
        })
    }
}

#[cfg(test)]
#[path = "transaction_tests.rs"]
mod transaction_tests;
