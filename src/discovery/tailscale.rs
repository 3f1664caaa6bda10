// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tailscale control plane client.
//!
//! Lists the devices of a tailnet through `GET /api/v2/tailnet/{tailnet}/devices`.
//! Requests authenticate with either an API key or an OAuth client; OAuth
//! access tokens are cached until shortly before they expire.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Deserializer};
use std::net::IpAddr;
use tracing::{debug, error, info};
use url::Url;

use super::{Endpoint, EndpointSource};
use crate::constants::{
    OAUTH_TOKEN_REFRESH_MARGIN_SECS, TAILSCALE_DEVICES_SCOPE, TAILSCALE_HTTP_TIMEOUT,
};
use crate::dns_errors::{ConfigError, SyncError, TransportError};
use crate::metrics;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// How requests to the Tailscale API authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum TailscaleAuth {
    /// Personal or tagged API key, sent as a bearer token
    ApiKey(String),
    /// OAuth client credentials, exchanged for short-lived access tokens
    OAuth {
        /// OAuth client id
        client_id: String,
        /// OAuth client secret
        client_secret: String,
    },
}

impl std::fmt::Debug for TailscaleAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Self::OAuth { client_id, .. } => f
                .debug_struct("OAuth")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
        }
    }
}

impl TailscaleAuth {
    /// Short label for logs.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::ApiKey(_) => "api-key",
            Self::OAuth { .. } => "oauth",
        }
    }
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Device {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    addresses: Vec<String>,
    #[serde(default)]
    authorized: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    last_seen: Option<DateTime<Utc>>,
}

/// Accept missing, empty or malformed timestamps as "unknown".
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }))
}

impl From<Device> for Endpoint {
    fn from(device: Device) -> Self {
        let parsed: Vec<IpAddr> = device
            .addresses
            .iter()
            .filter_map(|a| a.parse().ok())
            .collect();

        let ipv4 = parsed.iter().find_map(|ip| match ip {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        });
        let ipv6 = parsed.iter().find_map(|ip| match ip {
            IpAddr::V6(v6) => Some(*v6),
            IpAddr::V4(_) => None,
        });

        Self {
            id: device.id,
            name: device.name,
            ipv4,
            ipv6,
            // Authorization stands in for liveness.
            online: device.authorized,
            last_seen: device.last_seen,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(OAUTH_TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Client for the Tailscale devices API.
#[derive(Debug)]
pub struct TailscaleClient {
    http: HttpClient,
    tailnet: String,
    devices_url: Url,
    token_url: Url,
    auth: TailscaleAuth,
    token: Option<CachedToken>,
}

impl TailscaleClient {
    /// Create a client for `tailnet` against the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `base_url` is not an absolute URL, or
    /// a transport error if the HTTP client cannot be built.
    pub fn new(base_url: &str, tailnet: &str, auth: TailscaleAuth) -> Result<Self, SyncError> {
        let devices_url = api_url(base_url, &["tailnet", tailnet, "devices"])?;
        let token_url = api_url(base_url, &["oauth", "token"])?;

        let http = HttpClient::builder()
            .timeout(TAILSCALE_HTTP_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Discovery {
                url: base_url.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            tailnet: tailnet.to_string(),
            devices_url,
            token_url,
            auth,
            token: None,
        })
    }

    /// Fetch every device of the tailnet, online or not.
    ///
    /// # Errors
    ///
    /// Returns `Discovery` if authentication or the request fails.
    pub async fn list_endpoints(&mut self) -> Result<Vec<Endpoint>, SyncError> {
        let result = self.fetch_devices().await;
        metrics::record_roster_fetch(result.is_ok());
        result
    }

    async fn fetch_devices(&mut self) -> Result<Vec<Endpoint>, SyncError> {
        let token = self.bearer_token().await?;
        let url = self.devices_url.clone();

        debug!(
            tailnet = %self.tailnet,
            url = %url,
            auth = self.auth.method(),
            "Fetching devices from Tailscale"
        );

        let response = self
            .http
            .get(url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| discovery_error(&url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(url = %url, status = %status, error = %body, "Tailscale API request failed");

            // A rejected OAuth token is dropped so the next call fetches a new one.
            if status == StatusCode::UNAUTHORIZED {
                self.token = None;
            }
            return Err(discovery_error(&url, format!("HTTP {status}: {body}")).into());
        }

        let devices: DevicesResponse = response
            .json()
            .await
            .map_err(|e| discovery_error(&url, format!("failed to parse response: {e}")))?;

        let endpoints: Vec<Endpoint> = devices.devices.into_iter().map(Endpoint::from).collect();
        debug!(tailnet = %self.tailnet, count = endpoints.len(), "Found machines");
        Ok(endpoints)
    }

    async fn bearer_token(&mut self) -> Result<String, SyncError> {
        let (client_id, client_secret) = match &self.auth {
            TailscaleAuth::ApiKey(key) => return Ok(key.clone()),
            TailscaleAuth::OAuth {
                client_id,
                client_secret,
            } => (client_id.clone(), client_secret.clone()),
        };

        if let Some(token) = &self.token {
            if token.is_fresh(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.fetch_oauth_token(&client_id, &client_secret).await?;
        let access_token = token.access_token.clone();
        self.token = Some(token);
        Ok(access_token)
    }

    async fn fetch_oauth_token(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<CachedToken, TransportError> {
        let url = &self.token_url;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", client_id)
            .append_pair("client_secret", client_secret)
            .append_pair("grant_type", "client_credentials")
            .append_pair("scope", TAILSCALE_DEVICES_SCOPE)
            .finish();

        debug!(url = %url, "Requesting Tailscale OAuth token");

        let response = self
            .http
            .post(url.clone())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| discovery_error(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(discovery_error(
                url,
                format!("OAuth token request failed with HTTP {status}: {body}"),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| discovery_error(url, format!("failed to parse token response: {e}")))?;

        let lifetime = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        info!(expires_in = lifetime, "Obtained Tailscale OAuth token");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
        })
    }
}

#[async_trait]
impl EndpointSource for TailscaleClient {
    async fn list_online_endpoints(&mut self) -> Result<Vec<Endpoint>, SyncError> {
        let endpoints = self.list_endpoints().await?;
        let total = endpoints.len();

        let online: Vec<Endpoint> = endpoints.into_iter().filter(|e| e.online).collect();
        metrics::set_online_endpoints(online.len());

        debug!(total, online = online.len(), "Found online machines");
        Ok(online)
    }
}

/// `{base}/api/v2/{segments...}`, with each segment percent-encoded.
fn api_url(base_url: &str, segments: &[&str]) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        field: "tailscale.api_base_url".to_string(),
        reason,
    };

    let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("URL cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(["api", "v2"])
        .extend(segments);
    Ok(url)
}

fn discovery_error(url: &Url, reason: String) -> TransportError {
    TransportError::Discovery {
        url: url.to_string(),
        reason,
    }
}

#[cfg(test)]
#[path = "tailscale_tests.rs"]
mod tailscale_tests;
