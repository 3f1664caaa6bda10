// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line interface.
//!
//! Every setting can be given as a flag or as a `TSBD_*` environment variable;
//! both override the config file. Flags are global, so they may appear before
//! or after the subcommand.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{
    BindFileConfig, Config, FileConfig, GeneralFileConfig, PtrFileConfig, TailscaleFileConfig,
};
use crate::duration::parse_setting;

/// Synchronize Tailscale machines into BIND9 using RFC 2136 dynamic updates.
#[derive(Parser, Debug)]
#[command(name = "tailscale-bind-ddns", version, about)]
#[command(long_about = r"
Connects to a Tailscale tailnet, lists the online machines and keeps A, AAAA
and optional PTR records for them in a BIND9 server using TSIG-signed RFC 2136
dynamic updates.

Settings are read from (lowest to highest precedence) built-in defaults, a YAML
config file, TSBD_* environment variables and command-line flags.

Examples:
  tailscale-bind-ddns run --tailscale-api-key KEY --bind-server ns1.example.com
  tailscale-bind-ddns run --config config.yaml
  TSBD_TAILSCALE_API_KEY=KEY tailscale-bind-ddns run
")]
pub struct Cli {
    /// Config file (default: ./config.yaml, ./config/config.yaml, ~/.tailscale-bind-ddns/config.yaml)
    #[arg(long, global = true, env = "TSBD_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Settings overriding the config file
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Continuously sync Tailscale machines to DNS records until interrupted
    Run,

    /// Show the effective configuration
    Status {
        /// Output format
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Test the connections to the Tailscale API and the DNS server
    Test,

    /// Print shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Output format of the `status` command
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON document
    Json,
}

/// Same forms as the config file: `90s`, `1h30m` or bare seconds (`600`).
fn duration_arg(value: &str) -> Result<Duration, String> {
    parse_setting(value).map_err(|e| e.to_string())
}

/// Flags and environment variables mirroring the config file.
#[derive(clap::Args, Debug, Default, Clone, PartialEq, Eq)]
pub struct SettingsArgs {
    /// Tailscale API key
    #[arg(long, global = true, env = "TSBD_TAILSCALE_API_KEY", hide_env_values = true)]
    pub tailscale_api_key: Option<String>,

    /// Tailscale OAuth client ID
    #[arg(long, global = true, env = "TSBD_TAILSCALE_CLIENT_ID")]
    pub tailscale_client_id: Option<String>,

    /// Tailscale OAuth client secret
    #[arg(long, global = true, env = "TSBD_TAILSCALE_CLIENT_SECRET", hide_env_values = true)]
    pub tailscale_client_secret: Option<String>,

    /// Tailscale tailnet name
    #[arg(long, global = true, env = "TSBD_TAILSCALE_TAILNET")]
    pub tailscale_tailnet: Option<String>,

    /// Tailscale polling interval (e.g. 30s)
    #[arg(long, global = true, env = "TSBD_TAILSCALE_POLL_INTERVAL", value_parser = duration_arg)]
    pub tailscale_poll_interval: Option<Duration>,

    /// Tailscale API base URL
    #[arg(long, global = true, env = "TSBD_TAILSCALE_API_BASE_URL")]
    pub tailscale_api_base_url: Option<String>,

    /// BIND DNS server address
    #[arg(long, global = true, env = "TSBD_BIND_SERVER")]
    pub bind_server: Option<String>,

    /// BIND DNS server port
    #[arg(long, global = true, env = "TSBD_BIND_PORT")]
    pub bind_port: Option<u16>,

    /// DNS zone to update
    #[arg(long, global = true, env = "TSBD_BIND_ZONE")]
    pub bind_zone: Option<String>,

    /// TSIG key name
    #[arg(long, global = true, env = "TSBD_BIND_KEY_NAME")]
    pub bind_key_name: Option<String>,

    /// TSIG key secret (base64)
    #[arg(long, global = true, env = "TSBD_BIND_KEY_SECRET", hide_env_values = true)]
    pub bind_key_secret: Option<String>,

    /// TSIG algorithm
    #[arg(long, global = true, env = "TSBD_BIND_ALGORITHM")]
    pub bind_algorithm: Option<String>,

    /// DNS record TTL (e.g. 300s)
    #[arg(long, global = true, env = "TSBD_BIND_TTL", value_parser = duration_arg)]
    pub bind_ttl: Option<Duration>,

    /// DNS update interval (e.g. 60s)
    #[arg(long, global = true, env = "TSBD_BIND_UPDATE_INTERVAL", value_parser = duration_arg)]
    pub bind_update_interval: Option<Duration>,

    /// Per-request DNS update timeout
    #[arg(long, global = true, env = "TSBD_BIND_TIMEOUT", value_parser = duration_arg)]
    pub bind_timeout: Option<Duration>,

    /// Publish IPv4 PTR records
    #[arg(long, global = true, env = "TSBD_PTR_ENABLED", num_args = 0..=1, default_missing_value = "true")]
    pub ptr_enabled: Option<bool>,

    /// IPv4 reverse zone
    #[arg(long, global = true, env = "TSBD_PTR_IPV4_ZONE")]
    pub ptr_ipv4_zone: Option<String>,

    /// Only IPv4 addresses in this CIDR get PTR records
    #[arg(long, global = true, env = "TSBD_PTR_IPV4_SUBNET")]
    pub ptr_ipv4_subnet: Option<String>,

    /// IPv4 reverse zone boundary: 8, 16 or 24
    #[arg(long, global = true, env = "TSBD_PTR_IPV4_SUBNET_SIZE")]
    pub ptr_ipv4_subnet_size: Option<u8>,

    /// Publish IPv6 PTR records as well
    #[arg(long, global = true, env = "TSBD_PTR_IPV6_ENABLED", num_args = 0..=1, default_missing_value = "true")]
    pub ptr_ipv6_enabled: Option<bool>,

    /// IPv6 reverse zone
    #[arg(long, global = true, env = "TSBD_PTR_IPV6_ZONE")]
    pub ptr_ipv6_zone: Option<String>,

    /// Only IPv6 addresses in this CIDR get PTR records
    #[arg(long, global = true, env = "TSBD_PTR_IPV6_SUBNET")]
    pub ptr_ipv6_subnet: Option<String>,

    /// IPv6 reverse zone boundary: 32, 48 or 64
    #[arg(long, global = true, env = "TSBD_PTR_IPV6_SUBNET_SIZE")]
    pub ptr_ipv6_subnet_size: Option<u8>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TSBD_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format (text, json)
    #[arg(long, global = true, env = "TSBD_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Log updates instead of sending them
    #[arg(long, global = true, env = "TSBD_DRY_RUN", num_args = 0..=1, default_missing_value = "true")]
    pub dry_run: Option<bool>,

    /// Serve Prometheus metrics on this address (e.g. 0.0.0.0:9090)
    #[arg(long, global = true, env = "TSBD_METRICS_ADDR")]
    pub metrics_addr: Option<String>,
}

impl SettingsArgs {
    /// The settings as a config layer.
    #[must_use]
    pub fn to_file_config(&self) -> FileConfig {
        let s = self.clone();
        FileConfig {
            tailscale: TailscaleFileConfig {
                api_key: s.tailscale_api_key,
                client_id: s.tailscale_client_id,
                client_secret: s.tailscale_client_secret,
                tailnet: s.tailscale_tailnet,
                poll_interval: s.tailscale_poll_interval,
                api_base_url: s.tailscale_api_base_url,
            },
            bind: BindFileConfig {
                server: s.bind_server,
                port: s.bind_port,
                zone: s.bind_zone,
                key_name: s.bind_key_name,
                key_secret: s.bind_key_secret,
                algorithm: s.bind_algorithm,
                ttl: s.bind_ttl,
                update_interval: s.bind_update_interval,
                timeout: s.bind_timeout,
                ptr: PtrFileConfig {
                    enabled: s.ptr_enabled,
                    ipv4_zone: s.ptr_ipv4_zone,
                    ipv4_subnet: s.ptr_ipv4_subnet,
                    ipv4_subnet_size: s.ptr_ipv4_subnet_size,
                    ipv6_enabled: s.ptr_ipv6_enabled,
                    ipv6_zone: s.ptr_ipv6_zone,
                    ipv6_subnet: s.ptr_ipv6_subnet,
                    ipv6_subnet_size: s.ptr_ipv6_subnet_size,
                },
            },
            general: GeneralFileConfig {
                log_level: s.log_level,
                log_format: s.log_format,
                dry_run: s.dry_run,
                metrics_addr: s.metrics_addr,
            },
        }
    }
}

impl Cli {
    /// Load the config file, overlay flags and environment, and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if the
    /// merged configuration is invalid.
    pub fn load_config(&self) -> Result<Config> {
        let file = FileConfig::load(self.config.as_deref())?;
        let merged = file.overlay(self.settings.to_file_config());
        Config::from_file_config(merged).context("Invalid configuration")
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod cli_tests;
