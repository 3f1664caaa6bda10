// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the synchronization engine.
//!
//! Errors fall into four kinds, and callers branch on the kind rather than on
//! message text:
//! - **Configuration** - detected before the engine starts; fatal
//! - **Classification** - a single address or reverse name could not be placed
//!   in a zone; the record is skipped and processing continues
//! - **Transport** - a network failure or a rejected update; that zone's batch
//!   is abandoned for the current cycle
//! - **Fatal startup** - the connectivity pre-check failed or the TSIG key is
//!   unusable; the run aborts
//!
//! Each variant carries the structured context (address, zone, server, ...)
//! needed to log it next to the failing operation.

use thiserror::Error;

/// Address family of an address or reverse zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressFamily {
    /// IPv4 (`in-addr.arpa`)
    V4,
    /// IPv6 (`ip6.arpa`)
    V6,
}

impl AddressFamily {
    /// Short label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V4 => "ipv4",
            Self::V6 => "ipv6",
        }
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors found while validating configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting was not supplied by any source
    #[error("Missing required configuration '{field}'")]
    MissingField {
        /// Dotted config key (e.g., `bind.server`)
        field: String,
    },

    /// A setting was supplied but its value is not acceptable
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Dotted config key
        field: String,
        /// Explanation of what is invalid
        reason: String,
    },
}

/// Errors placing an address or reverse name into a reverse zone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    /// The address does not parse, or belongs to the other family
    #[error("Invalid {family} address '{address}'")]
    InvalidAddress {
        /// The offending address or reverse name
        address: String,
        /// The family that was requested
        family: AddressFamily,
    },

    /// The boundary size is not one of the legal values for the family
    #[error("Unsupported {family} subnet boundary /{size}")]
    UnsupportedBoundary {
        /// The family the boundary was requested for
        family: AddressFamily,
        /// The requested boundary, in bits
        size: u8,
    },

    /// The address lies outside the subnet reverse records are published for
    #[error("Address {address} is outside reverse subnet {subnet}")]
    OutsideSubnet {
        /// The address that was checked
        address: String,
        /// The configured validation subnet
        subnet: String,
    },
}

/// Errors talking to the Tailscale API or to the authoritative server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The nameserver's own hostname could not be resolved
    #[error("Failed to resolve DNS server '{server}': {reason}")]
    ServerResolution {
        /// Configured server name
        server: String,
        /// Resolver error text
        reason: String,
    },

    /// The request could not be delivered or no answer arrived in time
    #[error("DNS exchange with {server} for zone '{zone}' failed: {reason}")]
    Exchange {
        /// Resolved server address (IP:port)
        server: String,
        /// Zone the request was addressed to
        zone: String,
        /// Client error text
        reason: String,
    },

    /// The server answered with a non-success response code
    #[error("DNS update for zone '{zone}' rejected by {server} with {code}")]
    Rejected {
        /// Resolved server address (IP:port)
        server: String,
        /// Zone the update targeted
        zone: String,
        /// Response code mnemonic (e.g., `REFUSED`, `NOTAUTH`)
        code: String,
    },

    /// A record or zone name could not be encoded as a DNS name
    #[error("Invalid DNS name '{name}' in zone '{zone}': {reason}")]
    InvalidName {
        /// The offending name
        name: String,
        /// Zone the name belongs to
        zone: String,
        /// Parser error text
        reason: String,
    },

    /// The Tailscale API call failed
    #[error("Tailscale API request to {url} failed: {reason}")]
    Discovery {
        /// Request URL
        url: String,
        /// Error text or HTTP status
        reason: String,
    },
}

/// Errors that abort the run before the pipeline starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartupError {
    /// The SOA query for the forward zone did not succeed
    #[error("Connectivity check against {server} for zone '{zone}' failed: {reason}")]
    ConnectivityCheck {
        /// Server that was queried
        server: String,
        /// Forward zone whose SOA was requested
        zone: String,
        /// Underlying failure
        reason: String,
    },

    /// The TSIG algorithm is not one of the supported HMAC names
    #[error("Unsupported TSIG algorithm '{algorithm}'. Supported algorithms: hmac-md5, hmac-sha1, hmac-sha256, hmac-sha384, hmac-sha512")]
    UnsupportedAlgorithm {
        /// The rejected algorithm name
        algorithm: String,
    },

    /// The TSIG key name or secret cannot be used for signing
    #[error("Invalid TSIG key '{key_name}': {reason}")]
    InvalidKey {
        /// TSIG key name
        key_name: String,
        /// Explanation of what is invalid
        reason: String,
    },
}

/// Broad category of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing configuration
    Configuration,
    /// Per-record classification problem
    Classification,
    /// Per-zone network or server problem
    Transport,
    /// The run cannot start
    FatalStartup,
}

/// Composite error type returned by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Address/zone classification error
    #[error(transparent)]
    Classification(#[from] ClassificationError),

    /// Network or server error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Startup error
    #[error(transparent)]
    Startup(#[from] StartupError),
}

impl SyncError {
    /// The category this error belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Classification(_) => ErrorKind::Classification,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Startup(_) => ErrorKind::FatalStartup,
        }
    }

    /// Returns true if this error must abort the run.
    ///
    /// Classification and transport errors are confined to one record or one
    /// zone and are retried naturally by the next cycle.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Configuration | ErrorKind::FatalStartup
        )
    }

    /// Stable reason code, used as a metrics label.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        match self {
            Self::Config(ConfigError::MissingField { .. }) => "MissingField",
            Self::Config(ConfigError::InvalidValue { .. }) => "InvalidValue",

            Self::Classification(ClassificationError::InvalidAddress { .. }) => "InvalidAddress",
            Self::Classification(ClassificationError::UnsupportedBoundary { .. }) => {
                "UnsupportedBoundary"
            }
            Self::Classification(ClassificationError::OutsideSubnet { .. }) => "OutsideSubnet",

            Self::Transport(TransportError::ServerResolution { .. }) => "ServerResolution",
            Self::Transport(TransportError::Exchange { .. }) => "ExchangeFailed",
            Self::Transport(TransportError::Rejected { .. }) => "UpdateRejected",
            Self::Transport(TransportError::InvalidName { .. }) => "InvalidName",
            Self::Transport(TransportError::Discovery { .. }) => "DiscoveryFailed",

            Self::Startup(StartupError::ConnectivityCheck { .. }) => "ConnectivityCheckFailed",
            Self::Startup(StartupError::UnsupportedAlgorithm { .. }) => "UnsupportedAlgorithm",
            Self::Startup(StartupError::InvalidKey { .. }) => "InvalidTsigKey",
        }
    }
}

#[cfg(test)]
#[path = "dns_errors_tests.rs"]
mod dns_errors_tests;
