// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status report printed by the `status` command.
//!
//! The report is built from the validated configuration only; it never
//! contacts Tailscale or the nameserver and never includes secrets.

use serde::Serialize;
use std::fmt;

use crate::config::{Config, ReverseZoneConfig};
use crate::duration::format_duration;

/// Reverse record settings for one family, as shown in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReverseStatus {
    /// PTR records are published for this family
    pub enabled: bool,
    /// Configured reverse zone
    pub zone: Option<String>,
    /// Validation subnet in CIDR notation
    pub subnet: Option<String>,
    /// Zone boundary in bits
    pub boundary: u8,
}

impl From<&ReverseZoneConfig> for ReverseStatus {
    fn from(config: &ReverseZoneConfig) -> Self {
        Self {
            enabled: config.enabled,
            zone: config.zone.clone(),
            subnet: config.subnet.map(|s| s.to_string()),
            boundary: config.boundary,
        }
    }
}

/// Effective configuration of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Tailnet being synchronized
    pub tailscale_tailnet: String,
    /// `api-key` or `oauth`
    pub tailscale_auth: &'static str,
    /// Roster fetch interval, e.g. `30s`
    pub poll_interval: String,
    /// Nameserver as `host:port`
    pub bind_server: String,
    /// Forward zone
    pub bind_zone: String,
    /// TSIG key name
    pub key_name: String,
    /// TSIG algorithm
    pub algorithm: String,
    /// Record TTL in seconds
    pub ttl: u32,
    /// Update interval, e.g. `1m`
    pub update_interval: String,
    /// Updates are logged, not sent
    pub dry_run: bool,
    /// Default log level
    pub log_level: String,
    /// Prometheus endpoint, if enabled
    pub metrics_addr: Option<String>,
    /// IPv4 PTR settings
    pub ptr_ipv4: ReverseStatus,
    /// IPv6 PTR settings
    pub ptr_ipv6: ReverseStatus,
}

impl StatusReport {
    /// Build a report from validated configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let sync = &config.sync;
        Self {
            tailscale_tailnet: config.tailscale.tailnet.clone(),
            tailscale_auth: config.tailscale.auth.method(),
            poll_interval: format_duration(sync.poll_interval),
            bind_server: sync.target.to_string(),
            bind_zone: sync.forward_zone.clone(),
            key_name: sync.credential.key_name.clone(),
            algorithm: sync.credential.algorithm.clone(),
            ttl: sync.ttl,
            update_interval: format_duration(sync.update_interval),
            dry_run: sync.dry_run,
            log_level: config.general.log_level.clone(),
            metrics_addr: config.general.metrics_addr.map(|a| a.to_string()),
            ptr_ipv4: ReverseStatus::from(&sync.reverse.ipv4),
            ptr_ipv6: ReverseStatus::from(&sync.reverse.ipv6),
        }
    }
}

fn write_reverse(f: &mut fmt::Formatter<'_>, family: &str, status: &ReverseStatus) -> fmt::Result {
    if !status.enabled {
        return writeln!(f, "  ptr_{family}: disabled");
    }
    writeln!(
        f,
        "  ptr_{family}: zone={} subnet={} boundary=/{}",
        status.zone.as_deref().unwrap_or("-"),
        status.subnet.as_deref().unwrap_or("-"),
        status.boundary
    )
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Application Status:")?;
        writeln!(f, "  tailscale_tailnet: {}", self.tailscale_tailnet)?;
        writeln!(f, "  tailscale_auth: {}", self.tailscale_auth)?;
        writeln!(f, "  poll_interval: {}", self.poll_interval)?;
        writeln!(f, "  bind_server: {}", self.bind_server)?;
        writeln!(f, "  bind_zone: {}", self.bind_zone)?;
        writeln!(f, "  key_name: {}", self.key_name)?;
        writeln!(f, "  algorithm: {}", self.algorithm)?;
        writeln!(f, "  ttl: {}", self.ttl)?;
        writeln!(f, "  update_interval: {}", self.update_interval)?;
        writeln!(f, "  dry_run: {}", self.dry_run)?;
        writeln!(f, "  log_level: {}", self.log_level)?;
        writeln!(
            f,
            "  metrics_addr: {}",
            self.metrics_addr.as_deref().unwrap_or("disabled")
        )?;
        write_reverse(f, "ipv4", &self.ptr_ipv4)?;
        write_reverse(f, "ipv6", &self.ptr_ipv6)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
