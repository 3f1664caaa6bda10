// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # tailscale-bind-ddns - Tailscale machines in BIND9
//!
//! Keeps forward (A/AAAA) and optional reverse (PTR) records for the online
//! machines of a Tailscale tailnet in an authoritative BIND9 server, using
//! TSIG-signed RFC 2136 dynamic updates.
//!
//! ## Modules
//!
//! - [`discovery`] - Endpoint roster from the Tailscale API
//! - [`dns`] - Record synthesis, zone grouping, update transactions and transport
//! - [`pipeline`] - The three-stage discovery, synthesis and transmission loop
//! - [`config`] - Layered configuration and validation
//! - [`dns_errors`] - Error taxonomy shared by every stage
//! - [`metrics`] - Prometheus metrics and the optional `/metrics` endpoint
//! - [`status`] - Effective configuration report
//! - [`cli`] - Command-line interface
//!
//! ## Example
//!
//! ```rust,no_run
//! use tailscale_bind_ddns::config::ReverseConfig;
//! use tailscale_bind_ddns::discovery::Endpoint;
//! use tailscale_bind_ddns::dns::records::synthesize;
//! use tailscale_bind_ddns::dns::group_by_zone;
//!
//! let endpoints = vec![Endpoint {
//!     id: "n1".to_string(),
//!     name: "laptop.tail1234.ts.net".to_string(),
//!     ipv4: Some("100.64.1.5".parse().unwrap()),
//!     ipv6: None,
//!     online: true,
//!     last_seen: None,
//! }];
//!
//! let reverse = ReverseConfig::disabled();
//! let records = synthesize(&endpoints, "ts.example.com", 300, &reverse);
//! let batches = group_by_zone(&records, "ts.example.com", &reverse);
//! assert_eq!(batches.len(), 1);
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod dns;
pub mod dns_errors;
pub mod duration;
pub mod metrics;
pub mod pipeline;
pub mod status;
