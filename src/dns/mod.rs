// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS record synthesis and dynamic update engine.
//!
//! Records flow through this module one way:
//!
//! 1. [`records::synthesize`] turns a roster into forward and PTR records
//! 2. [`zones::group_by_zone`] partitions them into per-zone batches
//! 3. [`transaction::build_transaction`] turns each batch into delete + insert pairs
//! 4. [`transport::ZoneUpdater::send`] signs the transaction and delivers it
//!
//! Reverse zones are computed by [`reverse`], gated by the CIDR checks in
//! [`subnet`].

pub mod records;
pub mod reverse;
pub mod subnet;
pub mod transaction;
pub mod transport;
pub mod tsig;
pub mod zones;

pub use records::{DesiredRecord, RecordKind};
pub use subnet::Subnet;
pub use transaction::{build_transaction, UpdateOperation, UpdateTransaction};
pub use transport::{DnsUpdater, ServerTarget, ZoneUpdater};
pub use tsig::Credential;
pub use zones::{group_by_zone, ZoneBatch};
