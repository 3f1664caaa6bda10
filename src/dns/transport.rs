// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Delivery of signed updates to the authoritative server.
//!
//! hickory-client's synchronous client does the exchange inside
//! `spawn_blocking`. Updates travel over [`SignedUdpConnection`], which hands
//! every stream the credential's [`UpdateSigner`] so the reply is verified
//! against the request MAC. A failure is reported once and never retried here; the
//! next transmission cycle asserts the full record set again.

use async_trait::async_trait;
use hickory_client::client::{Client, ClientConnection, Signer, SyncClient};
use hickory_client::op::ResponseCode;
use hickory_client::proto::udp::{UdpClientConnect, UdpClientStream};
use hickory_client::proto::xfer::{DnsRequest, DnsRequestOptions};
use hickory_client::rr::{DNSClass, Name, RecordType};
use hickory_client::udp::UdpClientConnection;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::constants::CONNECTIVITY_CHECK_TIMEOUT;
use crate::dns::records::absolute;
use crate::dns::transaction::UpdateTransaction;
use crate::dns::tsig::{create_tsig_signer, Credential, UpdateSigner};
use crate::dns_errors::{StartupError, SyncError, TransportError};
use crate::metrics;

/// Something that can apply update transactions to a nameserver.
#[async_trait]
pub trait ZoneUpdater: Send + Sync {
    /// One-shot check that updates can be signed and the server answers for
    /// the forward zone.
    ///
    /// # Errors
    ///
    /// Returns a fatal startup error if the check fails.
    async fn validate_connection(&self) -> Result<(), SyncError>;

    /// Sign and send one transaction.
    ///
    /// # Errors
    ///
    /// Returns a transport error for network failures and rejected updates,
    /// or a startup error if the credential cannot sign.
    async fn send(&self, transaction: &UpdateTransaction) -> Result<(), SyncError>;
}

/// Nameserver host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    /// Hostname or IP address
    pub server: String,
    /// UDP port
    pub port: u16,
}

impl ServerTarget {
    /// Resolve the server name to a socket address.
    ///
    /// # Errors
    ///
    /// Returns `ServerResolution` if the lookup fails or yields nothing.
    pub async fn resolve(&self) -> Result<SocketAddr, TransportError> {
        let resolution_error = |reason: String| TransportError::ServerResolution {
            server: self.server.clone(),
            reason,
        };

        let mut addrs = tokio::net::lookup_host((self.server.as_str(), self.port))
            .await
            .map_err(|e| resolution_error(e.to_string()))?;

        addrs
            .next()
            .ok_or_else(|| resolution_error("no addresses returned".to_string()))
    }
}

impl std::fmt::Display for ServerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.server, self.port)
    }
}

/// UDP connection whose streams sign with an [`UpdateSigner`].
///
/// hickory's own `UdpClientConnection` only accepts its `Signer` enum, which
/// cannot carry the HMAC-MD5 and HMAC-SHA1 signer.
#[derive(Clone)]
pub struct SignedUdpConnection {
    name_server: SocketAddr,
    timeout: Duration,
    signer: Arc<UpdateSigner>,
}

impl SignedUdpConnection {
    /// Connection to `name_server` signing every update with `signer`.
    #[must_use]
    pub fn new(name_server: SocketAddr, timeout: Duration, signer: UpdateSigner) -> Self {
        Self {
            name_server,
            timeout,
            signer: Arc::new(signer),
        }
    }
}

impl ClientConnection for SignedUdpConnection {
    type Sender = UdpClientStream<tokio::net::UdpSocket, UpdateSigner>;
    type SenderFuture = UdpClientConnect<tokio::net::UdpSocket, UpdateSigner>;

    // The client's signer is always `None` here; ours is fixed at construction.
    fn new_stream(&self, _signer: Option<Arc<Signer>>) -> Self::SenderFuture {
        UdpClientStream::with_timeout_and_signer(
            self.name_server,
            self.timeout,
            Some(Arc::clone(&self.signer)),
        )
    }
}

/// Query the SOA record of `zone` and require a NOERROR answer.
///
/// The query is unsigned; it only proves the server is reachable and serves
/// the zone.
///
/// # Errors
///
/// Returns `ConnectivityCheck` for any resolution, network or rcode failure.
pub async fn check_connectivity(
    target: &ServerTarget,
    zone: &str,
    timeout: Duration,
) -> Result<(), SyncError> {
    let check_failed = |reason: String| StartupError::ConnectivityCheck {
        server: target.to_string(),
        zone: zone.to_string(),
        reason,
    };

    debug!(server = %target, zone = %zone, "Validating connection to DNS server");

    let addr = target
        .resolve()
        .await
        .map_err(|e| check_failed(e.to_string()))?;
    let zone_name = Name::from_str(&absolute(zone))
        .map_err(|e| check_failed(format!("invalid zone name: {e}")))?;

    let code = tokio::task::spawn_blocking(move || {
        let conn = UdpClientConnection::with_timeout(addr, timeout)
            .map_err(|e| format!("failed to create UDP connection: {e}"))?;
        let client = SyncClient::new(conn);
        let response = client
            .query(&zone_name, DNSClass::IN, RecordType::SOA)
            .map_err(|e| e.to_string())?;
        Ok::<_, String>(response.response_code())
    })
    .await
    .map_err(|e| check_failed(format!("query task failed: {e}")))?
    .map_err(check_failed)?;

    if code != ResponseCode::NoError {
        return Err(check_failed(format!("server answered {code}")).into());
    }

    info!(server = %target, zone = %zone, "Successfully validated connection to DNS server");
    Ok(())
}

/// Sign `transaction` with `credential` and send it to `target`.
///
/// The credential is turned into a signer before the server name is resolved,
/// so an unsupported algorithm never causes network activity.
///
/// # Errors
///
/// - `UnsupportedAlgorithm` / `InvalidKey` if the credential cannot sign
/// - `InvalidName` if the transaction cannot be encoded
/// - `ServerResolution`, `Exchange` or `Rejected` for delivery failures
pub async fn send_update(
    transaction: &UpdateTransaction,
    credential: &Credential,
    target: &ServerTarget,
    timeout: Duration,
) -> Result<(), SyncError> {
    let signer = create_tsig_signer(credential)?;
    let message = transaction.to_message()?;
    let addr = target.resolve().await?;

    let zone = transaction.zone.clone();
    let exchange_error = |reason: String| TransportError::Exchange {
        server: addr.to_string(),
        zone: zone.clone(),
        reason,
    };

    trace!(
        zone = %zone,
        server = %addr,
        key = %signer.key_name(),
        algorithm = %signer.algorithm(),
        fudge = signer.fudge(),
        "Sending update:\n{}",
        transaction.to_nsupdate()
    );

    let code = tokio::task::spawn_blocking(move || {
        let client = SyncClient::new(SignedUdpConnection::new(addr, timeout, signer));

        let request = DnsRequest::new(message, DnsRequestOptions::default());
        let response = client
            .send(request)
            .into_iter()
            .next()
            .ok_or_else(|| "no response received".to_string())?
            .map_err(|e| e.to_string())?;
        Ok::<_, String>(response.response_code())
    })
    .await
    .map_err(|e| exchange_error(format!("update task failed: {e}")))?
    .map_err(exchange_error)?;

    check_response_code(code, &addr.to_string(), &zone)
}

/// Map a response code to success or `Rejected`.
///
/// # Errors
///
/// Returns `Rejected` for every code other than NOERROR.
pub fn check_response_code(
    code: ResponseCode,
    server: &str,
    zone: &str,
) -> Result<(), SyncError> {
    if code == ResponseCode::NoError {
        Ok(())
    } else {
        Err(TransportError::Rejected {
            server: server.to_string(),
            zone: zone.to_string(),
            code: code.to_string(),
        }
        .into())
    }
}

/// [`ZoneUpdater`] backed by a real nameserver.
#[derive(Debug, Clone)]
pub struct DnsUpdater {
    target: ServerTarget,
    credential: Credential,
    forward_zone: String,
    timeout: Duration,
}

impl DnsUpdater {
    /// Create an updater for `target`, signing with `credential`.
    #[must_use]
    pub fn new(
        target: ServerTarget,
        credential: Credential,
        forward_zone: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            target,
            credential,
            forward_zone: forward_zone.into(),
            timeout,
        }
    }

    /// Server this updater talks to.
    #[must_use]
    pub fn target(&self) -> &ServerTarget {
        &self.target
    }
}

#[async_trait]
impl ZoneUpdater for DnsUpdater {
    async fn validate_connection(&self) -> Result<(), SyncError> {
        // An unusable key would fail every update, so it fails the run instead.
        create_tsig_signer(&self.credential)?;
        check_connectivity(&self.target, &self.forward_zone, CONNECTIVITY_CHECK_TIMEOUT).await
    }

    async fn send(&self, transaction: &UpdateTransaction) -> Result<(), SyncError> {
        let start = Instant::now();
        let result = send_update(transaction, &self.credential, &self.target, self.timeout).await;
        metrics::record_zone_update(&transaction.zone, &result, start.elapsed());

        if result.is_ok() {
            debug!(
                zone = %transaction.zone,
                records = transaction.record_count(),
                server = %self.target,
                "Zone update accepted"
            );
        }
        result
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod transport_tests;
