// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Endpoint discovery.
//!
//! The engine only needs a list of endpoints once per poll interval; where it
//! comes from is behind [`EndpointSource`]. [`TailscaleClient`] reads devices
//! from the Tailscale control plane API.

pub mod tailscale;

pub use tailscale::{TailscaleAuth, TailscaleClient};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::dns_errors::SyncError;

/// One member of the network.
///
/// A roster snapshot replaces the previous one wholesale; endpoints are never
/// updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Stable, non-empty identifier
    pub id: String,
    /// Display name, possibly empty or fully-qualified
    pub name: String,
    /// First IPv4 address, if any
    pub ipv4: Option<Ipv4Addr>,
    /// First IPv6 address, if any
    pub ipv6: Option<Ipv6Addr>,
    /// Whether the endpoint should have records
    pub online: bool,
    /// Last time the control plane saw the endpoint
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Endpoint {
    /// Name to derive records from: the display name, or the id when empty.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Source of roster snapshots.
#[async_trait]
pub trait EndpointSource: Send {
    /// Fetch the endpoints that are currently online.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the roster cannot be fetched. The caller
    /// logs it and tries again on the next tick.
    async fn list_online_endpoints(&mut self) -> Result<Vec<Endpoint>, SyncError>;
}
