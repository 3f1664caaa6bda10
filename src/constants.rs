// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for tailscale-bind-ddns.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

use std::time::Duration;

// ============================================================================
// DNS Protocol Constants
// ============================================================================

/// Standard DNS port for queries and dynamic updates
pub const DNS_PORT: u16 = 53;

/// Default TTL for synthesized DNS records (5 minutes)
pub const DEFAULT_DNS_RECORD_TTL_SECS: u32 = 300;

/// TSIG fudge time in seconds (allows for clock skew)
pub const TSIG_FUDGE_TIME_SECS: u64 = 300;

/// Default TSIG algorithm when none is configured
pub const DEFAULT_TSIG_ALGORITHM: &str = "hmac-sha256";

/// Suffix of the IPv4 reverse tree
pub const IPV4_REVERSE_SUFFIX: &str = "in-addr.arpa";

/// Suffix of the IPv6 reverse tree
pub const IPV6_REVERSE_SUFFIX: &str = "ip6.arpa";

/// Maximum length of one DNS label, in octets (RFC 1035)
pub const MAX_DNS_LABEL_LEN: usize = 63;

/// Owner name used when a machine name sanitizes to nothing
pub const PLACEHOLDER_HOSTNAME: &str = "machine";

// ============================================================================
// Reverse Zone Constants
// ============================================================================

/// Legal IPv4 reverse zone boundaries, in bits
pub const IPV4_BOUNDARY_SIZES: [u8; 3] = [8, 16, 24];

/// Legal IPv6 reverse zone boundaries, in bits
pub const IPV6_BOUNDARY_SIZES: [u8; 3] = [32, 48, 64];

/// Default IPv4 reverse zone boundary
pub const DEFAULT_IPV4_BOUNDARY: u8 = 16;

/// Default IPv6 reverse zone boundary
pub const DEFAULT_IPV6_BOUNDARY: u8 = 64;

/// Default IPv4 validation subnet (the Tailscale CGNAT range)
pub const DEFAULT_IPV4_PTR_SUBNET: &str = "100.64.0.0/10";

// ============================================================================
// Scheduling Constants
// ============================================================================

/// Default interval between Tailscale roster fetches
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default interval between dynamic update attempts
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Default per-request timeout for dynamic updates
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the SOA connectivity pre-check
pub const CONNECTIVITY_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Overall timeout for the `test` command
pub const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the roster and record-set channels
pub const PIPELINE_CHANNEL_CAPACITY: usize = 10;

// ============================================================================
// Tailscale API Constants
// ============================================================================

/// Public Tailscale control plane API
pub const DEFAULT_TAILSCALE_API_URL: &str = "https://api.tailscale.com";

/// OAuth scope needed to list devices
pub const TAILSCALE_DEVICES_SCOPE: &str = "devices:core:read";

/// Refresh OAuth tokens this long before they expire
pub const OAUTH_TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// HTTP timeout for Tailscale API calls
pub const TAILSCALE_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Configuration Constants
// ============================================================================

/// Config file name searched in the default locations
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Per-user config directory under `$HOME`
pub const USER_CONFIG_DIR: &str = ".tailscale-bind-ddns";
