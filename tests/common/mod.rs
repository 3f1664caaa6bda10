// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fakes for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tailscale_bind_ddns::config::{Config, FileConfig};
use tailscale_bind_ddns::discovery::{Endpoint, EndpointSource};
use tailscale_bind_ddns::dns::{UpdateTransaction, ZoneUpdater};
use tailscale_bind_ddns::dns_errors::{SyncError, TransportError};

/// Base config used by the tests, with PTR records for both families.
pub const CONFIG_YAML: &str = r"
tailscale:
  api_key: tskey-api-test
  tailnet: example.com
  poll_interval: 1h
bind:
  server: 127.0.0.1
  zone: ts.example.com
  key_name: ddns-key
  key_secret: c2VjcmV0LWtleS1ieXRlcw==
  update_interval: 1h
  ptr:
    enabled: true
    ipv4_zone: 64.100.in-addr.arpa
    ipv6_enabled: true
    ipv6_zone: 0.0.0.0.0.e.1.a.c.5.1.1.a.7.d.f.ip6.arpa
    ipv6_subnet: fd7a:115c:a1e0::/48
";

/// Parse and validate [`CONFIG_YAML`].
pub fn test_config() -> Config {
    Config::from_file_config(FileConfig::from_yaml(CONFIG_YAML).unwrap()).unwrap()
}

/// An online endpoint with a fully-qualified MagicDNS name.
pub fn endpoint(name: &str, ipv4: &str, ipv6: Option<&str>) -> Endpoint {
    Endpoint {
        id: format!("id-{name}"),
        name: format!("{name}.tail1234.ts.net"),
        ipv4: Some(ipv4.parse().unwrap()),
        ipv6: ipv6.map(|a| a.parse().unwrap()),
        online: true,
        last_seen: None,
    }
}

/// Always returns the same roster.
pub struct StaticSource {
    pub roster: Vec<Endpoint>,
}

#[async_trait]
impl EndpointSource for StaticSource {
    async fn list_online_endpoints(&mut self) -> Result<Vec<Endpoint>, SyncError> {
        Ok(self.roster.iter().filter(|e| e.online).cloned().collect())
    }
}

/// Records transactions; rejects zones listed in `refused`.
#[derive(Clone, Default)]
pub struct MemoryUpdater {
    pub sent: Arc<Mutex<Vec<UpdateTransaction>>>,
    pub refused: Vec<String>,
}

impl MemoryUpdater {
    pub fn sent(&self) -> Vec<UpdateTransaction> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ZoneUpdater for MemoryUpdater {
    async fn validate_connection(&self) -> Result<(), SyncError> {
        Ok(())
    }

    async fn send(&self, transaction: &UpdateTransaction) -> Result<(), SyncError> {
        self.sent.lock().unwrap().push(transaction.clone());
        if self.refused.contains(&transaction.zone) {
            return Err(TransportError::Rejected {
                server: "127.0.0.1:53".to_string(),
                zone: transaction.zone.clone(),
                code: "REFUSED".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Poll `check` until it holds or five seconds pass.
pub async fn wait_for(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
