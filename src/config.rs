// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration loading and validation.
//!
//! Settings come from four layers, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. A YAML file (`./config.yaml`, `./config/config.yaml` or
//!    `$HOME/.tailscale-bind-ddns/config.yaml`, unless `--config` names one)
//! 3. `TSBD_*` environment variables
//! 4. Command-line flags
//!
//! Layers 3 and 4 are resolved by clap and arrive here as another
//! [`FileConfig`], overlaid on the file with [`FileConfig::overlay`].
//! [`Config::from_file_config`] then validates the merged result once; the
//! engine only ever sees the validated [`SyncConfig`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_DNS_RECORD_TTL_SECS, DEFAULT_IPV4_BOUNDARY, DEFAULT_IPV4_PTR_SUBNET,
    DEFAULT_IPV6_BOUNDARY, DEFAULT_POLL_INTERVAL, DEFAULT_TAILSCALE_API_URL,
    DEFAULT_TRANSPORT_TIMEOUT, DEFAULT_TSIG_ALGORITHM, DEFAULT_UPDATE_INTERVAL, DNS_PORT,
    USER_CONFIG_DIR,
};
use crate::discovery::TailscaleAuth;
use crate::dns::reverse::validate_boundary;
use crate::dns::subnet::{Subnet, SubnetParseError};
use crate::dns::transport::ServerTarget;
use crate::dns::tsig::{Credential, TsigAlgorithmName};
use crate::dns_errors::{AddressFamily, ConfigError};
use crate::duration::deserialize_optional;

/// Accepted values of `general.log_level`.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Accepted values of `general.log_format`.
const LOG_FORMATS: [&str; 2] = ["text", "json"];

// ============================================================================
// Raw (unvalidated) configuration
// ============================================================================

/// Configuration as written in the YAML file, before validation.
///
/// Every field is optional so that layers can be overlaid; `None` means "not
/// set by this layer".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Tailscale API settings
    pub tailscale: TailscaleFileConfig,
    /// Nameserver settings
    pub bind: BindFileConfig,
    /// Process settings
    pub general: GeneralFileConfig,
}

/// `tailscale:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TailscaleFileConfig {
    /// API key (alternative to OAuth)
    pub api_key: Option<String>,
    /// OAuth client id
    pub client_id: Option<String>,
    /// OAuth client secret
    pub client_secret: Option<String>,
    /// Tailnet name (e.g., `example.com`)
    pub tailnet: Option<String>,
    /// Interval between roster fetches
    #[serde(deserialize_with = "deserialize_optional")]
    pub poll_interval: Option<Duration>,
    /// Control plane base URL
    pub api_base_url: Option<String>,
}

/// `bind:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BindFileConfig {
    /// Nameserver hostname or IP
    pub server: Option<String>,
    /// Nameserver port
    pub port: Option<u16>,
    /// Forward zone
    pub zone: Option<String>,
    /// TSIG key name
    pub key_name: Option<String>,
    /// TSIG secret, base64
    pub key_secret: Option<String>,
    /// TSIG algorithm
    pub algorithm: Option<String>,
    /// Record TTL
    #[serde(deserialize_with = "deserialize_optional")]
    pub ttl: Option<Duration>,
    /// Interval between update attempts
    #[serde(deserialize_with = "deserialize_optional")]
    pub update_interval: Option<Duration>,
    /// Per-request update timeout
    #[serde(deserialize_with = "deserialize_optional")]
    pub timeout: Option<Duration>,
    /// Reverse records
    pub ptr: PtrFileConfig,
}

/// `bind.ptr:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PtrFileConfig {
    /// Publish IPv4 PTR records
    pub enabled: Option<bool>,
    /// IPv4 reverse zone
    pub ipv4_zone: Option<String>,
    /// IPv4 validation subnet (CIDR)
    pub ipv4_subnet: Option<String>,
    /// IPv4 boundary size: 8, 16 or 24
    pub ipv4_subnet_size: Option<u8>,
    /// Publish IPv6 PTR records as well
    pub ipv6_enabled: Option<bool>,
    /// IPv6 reverse zone
    pub ipv6_zone: Option<String>,
    /// IPv6 validation subnet (CIDR)
    pub ipv6_subnet: Option<String>,
    /// IPv6 boundary size: 32, 48 or 64
    pub ipv6_subnet_size: Option<u8>,
}

/// `general:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GeneralFileConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub log_level: Option<String>,
    /// `text` or `json`
    pub log_format: Option<String>,
    /// Compute and log updates without sending them
    pub dry_run: Option<bool>,
    /// Listen address of the Prometheus endpoint
    pub metrics_addr: Option<String>,
}

/// Take `upper` when it is set, else keep `lower`.
fn pick<T>(lower: Option<T>, upper: Option<T>) -> Option<T> {
    upper.or(lower)
}

impl FileConfig {
    /// Parse a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or a value has the wrong type.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse configuration YAML")
    }

    /// Read and parse a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&yaml)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Load the file named by `explicit`, or the first file found in
    /// [`default_search_paths`]. No file at all yields an empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if `explicit` does not exist, or if a file exists but
    /// cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "Loading config file");
            return Self::from_path(path);
        }

        let home = std::env::var_os("HOME").map(PathBuf::from);
        for path in default_search_paths(home.as_deref()) {
            if path.is_file() {
                debug!(path = %path.display(), "Loading config file");
                return Self::from_path(&path);
            }
        }

        debug!("No config file found, using defaults and environment");
        Ok(Self::default())
    }

    /// Overlay `upper` on `self`: every value set in `upper` wins.
    #[must_use]
    pub fn overlay(self, upper: FileConfig) -> FileConfig {
        let (ts, up_ts) = (self.tailscale, upper.tailscale);
        let (bind, up_bind) = (self.bind, upper.bind);
        let (ptr, up_ptr) = (bind.ptr, up_bind.ptr);
        let (general, up_general) = (self.general, upper.general);

        FileConfig {
            tailscale: TailscaleFileConfig {
                api_key: pick(ts.api_key, up_ts.api_key),
                client_id: pick(ts.client_id, up_ts.client_id),
                client_secret: pick(ts.client_secret, up_ts.client_secret),
                tailnet: pick(ts.tailnet, up_ts.tailnet),
                poll_interval: pick(ts.poll_interval, up_ts.poll_interval),
                api_base_url: pick(ts.api_base_url, up_ts.api_base_url),
            },
            bind: BindFileConfig {
                server: pick(bind.server, up_bind.server),
                port: pick(bind.port, up_bind.port),
                zone: pick(bind.zone, up_bind.zone),
                key_name: pick(bind.key_name, up_bind.key_name),
                key_secret: pick(bind.key_secret, up_bind.key_secret),
                algorithm: pick(bind.algorithm, up_bind.algorithm),
                ttl: pick(bind.ttl, up_bind.ttl),
                update_interval: pick(bind.update_interval, up_bind.update_interval),
                timeout: pick(bind.timeout, up_bind.timeout),
                ptr: PtrFileConfig {
                    enabled: pick(ptr.enabled, up_ptr.enabled),
                    ipv4_zone: pick(ptr.ipv4_zone, up_ptr.ipv4_zone),
                    ipv4_subnet: pick(ptr.ipv4_subnet, up_ptr.ipv4_subnet),
                    ipv4_subnet_size: pick(ptr.ipv4_subnet_size, up_ptr.ipv4_subnet_size),
                    ipv6_enabled: pick(ptr.ipv6_enabled, up_ptr.ipv6_enabled),
                    ipv6_zone: pick(ptr.ipv6_zone, up_ptr.ipv6_zone),
                    ipv6_subnet: pick(ptr.ipv6_subnet, up_ptr.ipv6_subnet),
                    ipv6_subnet_size: pick(ptr.ipv6_subnet_size, up_ptr.ipv6_subnet_size),
                },
            },
            general: GeneralFileConfig {
                log_level: pick(general.log_level, up_general.log_level),
                log_format: pick(general.log_format, up_general.log_format),
                dry_run: pick(general.dry_run, up_general.dry_run),
                metrics_addr: pick(general.metrics_addr, up_general.metrics_addr),
            },
        }
    }
}

/// Config file locations searched when `--config` is not given, in order.
#[must_use]
pub fn default_search_paths(home: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from(CONFIG_FILE_NAME),
        Path::new("config").join(CONFIG_FILE_NAME),
    ];
    if let Some(home) = home {
        paths.push(home.join(USER_CONFIG_DIR).join(CONFIG_FILE_NAME));
    }
    paths
}

// ============================================================================
// Validated configuration
// ============================================================================

/// Reverse record settings for one address family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseZoneConfig {
    /// Publish PTR records for this family
    pub enabled: bool,
    /// Only addresses inside this subnet get PTR records
    pub subnet: Option<Subnet>,
    /// Zone boundary in bits (8/16/24 or 32/48/64)
    pub boundary: u8,
    /// Configured reverse zone, used for display and startup checks
    pub zone: Option<String>,
}

/// Reverse record settings for both families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseConfig {
    /// `in-addr.arpa` settings
    pub ipv4: ReverseZoneConfig,
    /// `ip6.arpa` settings
    pub ipv6: ReverseZoneConfig,
}

impl ReverseConfig {
    /// No reverse records for either family.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            ipv4: ReverseZoneConfig {
                enabled: false,
                subnet: None,
                boundary: DEFAULT_IPV4_BOUNDARY,
                zone: None,
            },
            ipv6: ReverseZoneConfig {
                enabled: false,
                subnet: None,
                boundary: DEFAULT_IPV6_BOUNDARY,
                zone: None,
            },
        }
    }

    /// Settings for `family`.
    #[must_use]
    pub fn for_family(&self, family: AddressFamily) -> &ReverseZoneConfig {
        match family {
            AddressFamily::V4 => &self.ipv4,
            AddressFamily::V6 => &self.ipv6,
        }
    }

    /// Returns true if either family publishes PTR records.
    #[must_use]
    pub fn any_enabled(&self) -> bool {
        self.ipv4.enabled || self.ipv6.enabled
    }
}

/// Everything the synchronization engine needs, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Forward zone, without trailing dot
    pub forward_zone: String,
    /// TTL of every record, in seconds
    pub ttl: u32,
    /// Interval between roster fetches
    pub poll_interval: Duration,
    /// Interval between transmission attempts
    pub update_interval: Duration,
    /// TSIG credential
    pub credential: Credential,
    /// Log instead of sending
    pub dry_run: bool,
    /// PTR settings
    pub reverse: ReverseConfig,
    /// Nameserver
    pub target: ServerTarget,
    /// Per-request update timeout
    pub timeout: Duration,
}

/// Tailscale API settings, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailscaleSettings {
    /// How to authenticate
    pub auth: TailscaleAuth,
    /// Tailnet to read
    pub tailnet: String,
    /// Control plane base URL
    pub api_base_url: String,
}

/// Process-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralSettings {
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
    /// `text` or `json`
    pub log_format: String,
    /// Prometheus endpoint, if enabled
    pub metrics_addr: Option<SocketAddr>,
}

/// Fully validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Discovery settings
    pub tailscale: TailscaleSettings,
    /// Engine settings
    pub sync: SyncConfig,
    /// Process settings
    pub general: GeneralSettings,
}

/// `Some(s)` only for non-blank strings.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn require(value: Option<String>, field: &str) -> Result<String, ConfigError> {
    non_empty(value).ok_or_else(|| ConfigError::MissingField {
        field: field.to_string(),
    })
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn non_zero(value: Option<Duration>, default: Duration, field: &str) -> Result<Duration, ConfigError> {
    let value = value.unwrap_or(default);
    if value.is_zero() {
        return Err(invalid(field, "must be greater than zero"));
    }
    Ok(value)
}

impl Config {
    /// Validate a merged [`FileConfig`].
    ///
    /// # Errors
    ///
    /// Returns `MissingField` for an absent required setting and
    /// `InvalidValue` for a setting that is present but unusable.
    pub fn from_file_config(raw: FileConfig) -> Result<Self, ConfigError> {
        let tailscale = validate_tailscale(raw.tailscale.clone())?;
        let poll_interval = non_zero(
            raw.tailscale.poll_interval,
            DEFAULT_POLL_INTERVAL,
            "tailscale.poll_interval",
        )?;
        let general = validate_general(raw.general.clone())?;
        let sync = validate_bind(
            raw.bind,
            poll_interval,
            raw.general.dry_run.unwrap_or(false),
        )?;

        Ok(Self {
            tailscale,
            sync,
            general,
        })
    }
}

fn validate_tailscale(raw: TailscaleFileConfig) -> Result<TailscaleSettings, ConfigError> {
    let auth = match non_empty(raw.api_key) {
        Some(key) => TailscaleAuth::ApiKey(key),
        None => TailscaleAuth::OAuth {
            client_id: require(raw.client_id, "tailscale.client_id")?,
            client_secret: require(raw.client_secret, "tailscale.client_secret")?,
        },
    };
    let tailnet = require(raw.tailnet, "tailscale.tailnet")?;
    let api_base_url =
        non_empty(raw.api_base_url).unwrap_or_else(|| DEFAULT_TAILSCALE_API_URL.to_string());

    Ok(TailscaleSettings {
        auth,
        tailnet,
        api_base_url,
    })
}

fn validate_bind(
    raw: BindFileConfig,
    poll_interval: Duration,
    dry_run: bool,
) -> Result<SyncConfig, ConfigError> {
    let server = require(raw.server, "bind.server")?;
    let forward_zone = require(raw.zone, "bind.zone")?
        .trim_end_matches('.')
        .to_string();
    let key_name = require(raw.key_name, "bind.key_name")?;
    let key_secret = require(raw.key_secret, "bind.key_secret")?;

    let algorithm =
        non_empty(raw.algorithm).unwrap_or_else(|| DEFAULT_TSIG_ALGORITHM.to_string());
    algorithm
        .parse::<TsigAlgorithmName>()
        .map_err(|e| invalid("bind.algorithm", e.to_string()))?;

    let credential = Credential {
        key_name,
        secret: key_secret,
        algorithm,
    };
    credential
        .decoded_secret()
        .map_err(|e| invalid("bind.key_secret", e.to_string()))?;

    let ttl = raw
        .ttl
        .unwrap_or(Duration::from_secs(u64::from(DEFAULT_DNS_RECORD_TTL_SECS)));
    let ttl = u32::try_from(ttl.as_secs())
        .map_err(|_| invalid("bind.ttl", format!("{}s does not fit in 32 bits", ttl.as_secs())))?;

    let update_interval = non_zero(raw.update_interval, DEFAULT_UPDATE_INTERVAL, "bind.update_interval")?;
    let timeout = non_zero(raw.timeout, DEFAULT_TRANSPORT_TIMEOUT, "bind.timeout")?;
    let reverse = validate_ptr(raw.ptr)?;

    Ok(SyncConfig {
        forward_zone,
        ttl,
        poll_interval,
        update_interval,
        credential,
        dry_run,
        reverse,
        target: ServerTarget {
            server,
            port: raw.port.unwrap_or(DNS_PORT),
        },
        timeout,
    })
}

fn validate_ptr(raw: PtrFileConfig) -> Result<ReverseConfig, ConfigError> {
    let ipv4_enabled = raw.enabled.unwrap_or(false);
    let ipv6_enabled = ipv4_enabled && raw.ipv6_enabled.unwrap_or(false);

    let ipv4_subnet =
        non_empty(raw.ipv4_subnet).unwrap_or_else(|| DEFAULT_IPV4_PTR_SUBNET.to_string());
    let ipv4 = ReverseZoneConfig {
        enabled: ipv4_enabled,
        subnet: None,
        boundary: raw.ipv4_subnet_size.unwrap_or(DEFAULT_IPV4_BOUNDARY),
        zone: non_empty(raw.ipv4_zone),
    };
    let ipv6 = ReverseZoneConfig {
        enabled: ipv6_enabled,
        subnet: None,
        boundary: raw.ipv6_subnet_size.unwrap_or(DEFAULT_IPV6_BOUNDARY),
        zone: non_empty(raw.ipv6_zone),
    };

    let ipv4 = if ipv4.enabled {
        validate_family(ipv4, Some(ipv4_subnet), AddressFamily::V4, "bind.ptr.ipv4")?
    } else {
        ipv4
    };
    let ipv6 = if ipv6.enabled {
        validate_family(ipv6, non_empty(raw.ipv6_subnet), AddressFamily::V6, "bind.ptr.ipv6")?
    } else {
        ipv6
    };

    Ok(ReverseConfig { ipv4, ipv6 })
}

/// Check an enabled family: zone and subnet present, subnet of the right
/// family, boundary legal.
fn validate_family(
    mut config: ReverseZoneConfig,
    subnet: Option<String>,
    family: AddressFamily,
    prefix: &str,
) -> Result<ReverseZoneConfig, ConfigError> {
    let zone_field = format!("{prefix}_zone");
    let subnet_field = format!("{prefix}_subnet");
    let size_field = format!("{prefix}_subnet_size");

    if config.zone.is_none() {
        return Err(ConfigError::MissingField { field: zone_field });
    }

    let subnet = require(subnet, &subnet_field)?;
    let subnet: Subnet = subnet
        .parse()
        .map_err(|e: SubnetParseError| invalid(&subnet_field, e.to_string()))?;
    if subnet.family() != family {
        return Err(invalid(
            &subnet_field,
            format!("{subnet} is not an {family} subnet"),
        ));
    }

    validate_boundary(family, config.boundary).map_err(|e| invalid(&size_field, e.to_string()))?;

    config.subnet = Some(subnet);
    Ok(config)
}

fn validate_general(raw: GeneralFileConfig) -> Result<GeneralSettings, ConfigError> {
    let log_level = non_empty(raw.log_level)
        .unwrap_or_else(|| "info".to_string())
        .to_ascii_lowercase();
    if !LOG_LEVELS.contains(&log_level.as_str()) {
        return Err(invalid(
            "general.log_level",
            format!("'{log_level}' is not one of {}", LOG_LEVELS.join(", ")),
        ));
    }

    let log_format = non_empty(raw.log_format)
        .unwrap_or_else(|| "text".to_string())
        .to_ascii_lowercase();
    if !LOG_FORMATS.contains(&log_format.as_str()) {
        return Err(invalid(
            "general.log_format",
            format!("'{log_format}' is not one of {}", LOG_FORMATS.join(", ")),
        ));
    }

    let metrics_addr = non_empty(raw.metrics_addr)
        .map(|addr| {
            addr.parse::<SocketAddr>()
                .map_err(|e| invalid("general.metrics_addr", format!("'{addr}': {e}")))
        })
        .transpose()?;

    Ok(GeneralSettings {
        log_level,
        log_format,
        metrics_addr,
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
